//! Encoder-to-controller bindings.
//!
//! A dial gives an encoder an absolute value inside a configured range and
//! emits it as a control change on the internal input whenever the encoder
//! ticks. The UI can write the value back when the same controller moves
//! from elsewhere.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialBinding {
    pub chan: u8,
    pub controller: u8,
    min: i32,
    max: i32,
    value: i32,
}

impl DialBinding {
    pub fn new(chan: u8, controller: u8, min: i32, max: i32, value: i32) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            chan: chan & 0x0F,
            controller: controller & 0x7F,
            min,
            max,
            value: value.clamp(min, max),
        }
    }

    /// A standard 0..127 controller dial.
    pub fn controller_range(chan: u8, controller: u8, value: u8) -> Self {
        Self::new(chan, controller, 0, 127, value as i32)
    }

    #[inline]
    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn set_value(&mut self, value: i32) {
        self.value = value.clamp(self.min, self.max);
    }

    /// Apply an encoder delta; returns the controller value to emit.
    pub(crate) fn apply(&mut self, delta: i32) -> u8 {
        self.value = (self.value + delta).clamp(self.min, self.max);
        self.value.clamp(0, 127) as u8
    }
}
