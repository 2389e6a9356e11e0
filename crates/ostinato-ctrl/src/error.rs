//! Error types for control input.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid control index {0}")]
    BadIndex(usize),

    #[error("pin {0} is not on a registered expander")]
    UnmappedPin(u16),

    #[error("encoder pins {0} and {1} must share one expander bank")]
    SplitEncoderPins(u16, u16),

    #[error("bus fault: {0}")]
    Bus(String),
}

pub type Result<T> = std::result::Result<T, Error>;
