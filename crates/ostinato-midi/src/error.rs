//! Error types for the MIDI primitives.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("malformed MIDI event ({len} bytes)")]
    MalformedEvent { len: usize },

    #[error("event ring full ({needed} bytes needed, {free} free)")]
    RingFull { needed: usize, free: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
