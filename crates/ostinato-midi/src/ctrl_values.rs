//! Shared last-value table for MIDI controllers.
//!
//! One table per input port records the last value seen for every
//! (channel, controller) pair. The router updates it on the audio thread; the
//! switch engine reads the internal input's table from a worker thread to
//! toggle latched controls. Relaxed atomics -- a stale read at worst misfires
//! one toggle, which the concurrency model accepts.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const SLOTS: usize = 16 * 128;

#[derive(Clone)]
pub struct CtrlValues {
    values: Arc<[AtomicU8]>,
}

impl CtrlValues {
    pub fn new() -> Self {
        let values: Vec<AtomicU8> = (0..SLOTS).map(|_| AtomicU8::new(0)).collect();
        Self {
            values: values.into(),
        }
    }

    #[inline]
    fn slot(channel: u8, controller: u8) -> usize {
        ((channel & 0x0F) as usize) * 128 + ((controller & 0x7F) as usize)
    }

    #[inline]
    pub fn get(&self, channel: u8, controller: u8) -> u8 {
        self.values[Self::slot(channel, controller)].load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set(&self, channel: u8, controller: u8, value: u8) {
        self.values[Self::slot(channel, controller)].store(value, Ordering::Relaxed);
    }
}

impl Default for CtrlValues {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CtrlValues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CtrlValues").finish_non_exhaustive()
    }
}
