//! The hardware seam.
//!
//! Concrete pin drivers (expander registers, ADCs) live outside the core;
//! everything here consumes this trait.

use crate::error::Result;

pub trait Gpio {
    /// Digital level of `pin`.
    fn read_pin(&mut self, pin: u16) -> Result<bool>;

    /// Drive `pin`.
    fn write_pin(&mut self, pin: u16, level: bool) -> Result<()>;

    /// Raw reading of analog `channel`.
    fn analog_read(&mut self, channel: u8) -> Result<i16>;
}
