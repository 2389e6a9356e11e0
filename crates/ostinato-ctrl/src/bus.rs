//! Shared-bus serialisation.
//!
//! The expander interrupt worker and the analog polling thread share one
//! I2C bus. The mutex is held only around a single transaction, never
//! across an audio-period boundary.

use crate::error::Result;
use crate::gpio::Gpio;
use parking_lot::Mutex;
use std::sync::Arc;

pub struct SharedBus<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> SharedBus<T> {
    pub fn new(bus: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(bus)),
        }
    }

    /// Run one transaction with the bus locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }
}

impl<T> Clone for SharedBus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Gpio> Gpio for SharedBus<T> {
    fn read_pin(&mut self, pin: u16) -> Result<bool> {
        self.with(|bus| bus.read_pin(pin))
    }

    fn write_pin(&mut self, pin: u16, level: bool) -> Result<()> {
        self.with(|bus| bus.write_pin(pin, level))
    }

    fn analog_read(&mut self, channel: u8) -> Result<i16> {
        self.with(|bus| bus.analog_read(channel))
    }
}
