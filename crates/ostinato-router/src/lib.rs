//! The per-period MIDI routing engine.
//!
//! Once per audio period the [`Router`] consumes every pending event from
//! every input port, transforms it (filter table, CC swap, relative-CC
//! auto-detection, master-channel capture) and fans it out in strict
//! timestamp order to every output port whose routing mask permits it,
//! applying per-output channel translation, drop policies, note range and
//! transpose, and tuning pitch-bend injection. Direct-output rings are
//! drained into their host buffers at the end of the period.
//!
//! The router is handed to the audio callback by reference and must never
//! block, allocate, lock or wait there. Configuration is methods on the
//! router, called from the control thread between periods.

pub mod error;
pub use error::{Error, Result};

pub use ostinato_midi::ChannelClass;

pub mod filter;
pub use filter::{EventAction, FilterMap};

pub mod swap;
pub use swap::{SwapEntry, SwapKind, SwapMap};

pub mod host;
pub use host::MidiHost;

pub mod inject;
pub use inject::EventInjector;

pub mod input;
pub use input::{CtrlMode, InputCategory, InputFlags, InputPort};

pub mod output;
pub use output::{NoteRange, OutputCategory, OutputFlags, OutputPort};

pub mod router;
pub use router::{Router, RouterConfig, RouterHandles};

/// Stable input port indices. The port list is fixed at router start-up.
pub mod input_id {
    /// First hardware device input; devices occupy `DEV0 .. DEV0 + NUM_DEVICES`.
    pub const DEV0: usize = 0;
    pub const NUM_DEVICES: usize = 16;
    /// Internal sequencer (MIDI player).
    pub const SEQ: usize = 16;
    /// Step sequencer.
    pub const STEP: usize = 17;
    /// Control-surface feedback return.
    pub const CTRL_FB: usize = 18;
    /// Synthetic input fed by physical controls (no host buffer).
    pub const INTERNAL: usize = 19;
    /// Synthetic input fed by the UI (no host buffer).
    pub const UI: usize = 20;
    pub const COUNT: usize = 21;
}

/// Stable output port indices.
pub mod output_id {
    /// First synthesis-chain output; chains occupy `CHAIN0 .. CHAIN0 + NUM_CHAINS`.
    pub const CHAIN0: usize = 0;
    pub const NUM_CHAINS: usize = 16;
    /// MOD-host output (all channels).
    pub const MOD: usize = 16;
    /// Step-sequencer output.
    pub const STEP: usize = 17;
    /// Controller-feedback output (direct).
    pub const CTRL_FB: usize = 18;
    /// First device-echo output (direct); echoes occupy `DEV0 .. DEV0 + NUM_DEVICES`.
    pub const DEV0: usize = 19;
    pub const NUM_DEVICES: usize = 16;
    pub const COUNT: usize = 35;
}
