//! Raw MIDI primitives for the Ostinato routing core.
//!
//! This crate carries the pieces shared by the router and the control surface:
//!
//! - **Event helpers**: status-byte classification and the 3-byte wire forms
//!   used by every injection path ([`event`]).
//! - **Event rings**: single-producer / single-consumer byte rings carrying
//!   length-framed MIDI events, used for synthetic injection into the router
//!   and for direct write-through outputs ([`ring`]).
//! - **UI snapshot queue**: the bounded queue of compact 4-byte event
//!   snapshots flowing from the router up to the user interface ([`ui`]).
//! - **Shared controller values**: the last-seen CC value table shared between
//!   the router and the switch engine ([`ctrl_values`]).
//!
//! Everything here is real-time safe after construction: no allocation, no
//! locks, no blocking on the hot paths.

pub mod error;
pub use error::{Error, Result};

pub mod event;
pub use event::{ChannelClass, EventKind, UiSnapshot};

pub mod ring;
pub use ring::{midi_ring, MidiRingReader, MidiRingWriter};

pub mod ui;
pub use ui::{ui_channel, UiConsumer, UiProducer};

pub mod ctrl_values;
pub use ctrl_values::CtrlValues;
