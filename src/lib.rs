//! Ostinato: the real-time MIDI routing and control-input core of an
//! embedded instrument.
//!
//! The core sits between MIDI sources (hardware devices, sequencers, the
//! UI, physical controls) and MIDI sinks (one per synthesis chain, plus
//! mod, step, control-feedback and device-echo outputs). Once per audio
//! period the [`Router`] consumes every pending event, transforms it per
//! source and per sink, and deposits it in timestamp order into the right
//! output buffers; the [`ControlSurface`] decodes rotary encoders and
//! switches into events on the router's synthetic internal input.
//!
//! ```no_run
//! use ostinato::CoreBuilder;
//!
//! let mut core = CoreBuilder::new().build();
//! core.router.set_master_channel(Some(15))?;
//!
//! // Audio thread, once per period:
//! // core.router.process(nframes, &mut host);
//! # Ok::<(), ostinato::RouterError>(())
//! ```
//!
//! The router half never blocks, allocates or locks on the audio thread;
//! everything crossing threads goes through pre-allocated lock-free queues.

mod builder;
pub use builder::{Core, CoreBuilder};

pub use ostinato_midi::{
    event, ui_channel, ChannelClass, CtrlValues, EventKind, MidiRingReader, MidiRingWriter,
    UiConsumer, UiProducer, UiSnapshot,
};

pub use ostinato_router::{
    input_id, output_id, EventAction, EventInjector, FilterMap, InputCategory, InputFlags,
    MidiHost, NoteRange, OutputCategory, OutputFlags, Router, RouterConfig, RouterHandles,
    SwapMap,
};
pub use ostinato_router::Error as RouterError;

pub use ostinato_ctrl::{
    Clock, ControlSurface, DialBinding, Expander, Gpio, PinAction, Poller, RotaryDecoder,
    SharedBus, StepMode, Switch, SwitchBinding,
};
pub use ostinato_ctrl::Error as CtrlError;
