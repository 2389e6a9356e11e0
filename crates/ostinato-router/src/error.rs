//! Error types for the routing engine.
//!
//! Configuration mistakes refuse the mutation and report; nothing here ever
//! aborts the audio thread.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("bad input port index {0}")]
    BadInput(usize),

    #[error("bad output port index {0}")]
    BadOutput(usize),

    #[error("bad MIDI channel {0}")]
    BadChannel(u8),

    #[error("bad controller/note number {0}")]
    BadNumber(u8),

    #[error("bad chain index {0}")]
    BadChain(usize),

    #[error("tuning frequency {0} Hz out of range")]
    TuningOutOfRange(f64),

    #[error("swap mapping rejected: {0}")]
    SwapRejected(&'static str),

    #[error("swap path not closed")]
    SwapPathBroken,

    #[error(transparent)]
    Queue(#[from] ostinato_midi::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
