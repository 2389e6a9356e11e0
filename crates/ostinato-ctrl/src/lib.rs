//! Physical control input for the Ostinato routing core.
//!
//! Rotary encoders and switches arrive as pin-change events, usually batched
//! through an I/O expander read. This crate turns those changes into MIDI:
//!
//! - [`encoder`]: the quadrature state machine with interval-based
//!   acceleration.
//! - [`switch`]: the debouncer with press/release timestamping, long-press
//!   detection and per-switch MIDI bindings.
//! - [`expander`]: the pin-action table that demultiplexes one batched
//!   expander read into switch and encoder updates.
//! - [`surface`]: the owning [`ControlSurface`], which wires decoded input
//!   into the router's synthetic internal input and the UI snapshot queue.
//! - [`dial`]: encoder-to-controller bindings with a clamped absolute value.
//! - [`gpio`] / [`bus`]: the hardware seams (pin and analog reads, shared
//!   bus serialisation).
//! - [`poller`]: background polling loops with a cooperative shutdown flag.

pub mod error;
pub use error::{Error, Result};

pub mod clock;
pub use clock::Clock;

pub mod encoder;
pub use encoder::{RotaryDecoder, StepMode};

pub mod switch;
pub use switch::{Switch, SwitchBinding, SwitchEdge};

pub mod expander;
pub use expander::{Expander, PinAction};

pub mod dial;
pub use dial::DialBinding;

pub mod surface;
pub use surface::ControlSurface;

pub mod gpio;
pub use gpio::Gpio;

pub mod bus;
pub use bus::SharedBus;

pub mod poller;
pub use poller::Poller;
