//! Switch debouncing and press bookkeeping.
//!
//! A switch records its level, the press timestamp (microseconds, 0 when
//! released) and the duration of the last completed press. Edges closer than
//! 1000 us to the press are ignored as contact bounce. Long presses can be
//! reported while the switch is still held, cancelling the eventual release
//! report.

use serde::{Deserialize, Serialize};

/// Edges closer than this to the press are contact bounce.
pub const DEBOUNCE_US: u64 = 1000;

/// MIDI emitted when a bound switch changes state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchBinding {
    None,
    /// Press sends `value`, release sends 0.
    ControlChange { chan: u8, controller: u8, value: u8 },
    /// Press toggles between 0 and 127 based on the last value seen for
    /// this controller on the internal input.
    LatchedControl { chan: u8, controller: u8 },
    /// Press sends note-on, release note-off.
    Note { chan: u8, note: u8, velocity: u8 },
    /// Press only.
    ProgramChange { chan: u8, program: u8 },
    /// Press only: a system real-time status (clock, transport).
    Realtime { status: u8 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwitchEdge {
    Press,
    Release,
}

#[derive(Debug)]
pub struct Switch {
    pin: u16,
    /// Level that reads as "released".
    off_level: bool,
    level: bool,
    /// Set on a clean press, cleared by `was_pressed`.
    pressed: bool,
    /// Microseconds of the press in flight, 0 when released.
    press_time_us: u64,
    /// Duration of the last completed press, 0 once reported.
    release_duration_us: u64,
    binding: SwitchBinding,
}

impl Switch {
    pub fn new(pin: u16, off_level: bool) -> Self {
        Self {
            pin,
            off_level,
            level: off_level,
            pressed: false,
            press_time_us: 0,
            release_duration_us: 0,
            binding: SwitchBinding::None,
        }
    }

    #[inline]
    pub fn pin(&self) -> u16 {
        self.pin
    }

    #[inline]
    pub fn binding(&self) -> SwitchBinding {
        self.binding
    }

    pub fn bind(&mut self, binding: SwitchBinding) {
        self.binding = binding;
    }

    /// Feed a level reading. Returns the debounced edge, if any.
    pub fn update(&mut self, level: bool, now_us: u64) -> Option<SwitchEdge> {
        if level == self.level {
            return None;
        }
        self.level = level;

        if self.press_time_us > 0 {
            let dt = now_us.saturating_sub(self.press_time_us);
            if dt < DEBOUNCE_US {
                return None;
            }
            if level == self.off_level {
                self.press_time_us = 0;
                self.release_duration_us = dt;
            }
        } else if level != self.off_level {
            self.pressed = true;
            self.press_time_us = now_us;
        }

        Some(if level != self.off_level {
            SwitchEdge::Press
        } else {
            SwitchEdge::Release
        })
    }

    /// "Yes, just pressed" exactly once per press.
    pub fn was_pressed(&mut self) -> bool {
        std::mem::take(&mut self.pressed)
    }

    #[inline]
    pub fn is_held(&self) -> bool {
        self.press_time_us > 0
    }

    /// Whether a press completion or an in-flight press is waiting to be
    /// reported.
    #[inline]
    pub fn has_pending(&self) -> bool {
        self.press_time_us > 0 || self.release_duration_us > 0
    }

    /// Report press durations.
    ///
    /// A completed press returns its duration once. A press still in flight
    /// past `long_threshold_us` returns the elapsed time and cancels the
    /// press, so the release reports nothing further.
    pub fn dwell_time(&mut self, long_threshold_us: u64, now_us: u64) -> Option<u64> {
        if self.release_duration_us > 0 {
            return Some(std::mem::take(&mut self.release_duration_us));
        }
        if self.press_time_us > 0 {
            let dt = now_us.saturating_sub(self.press_time_us);
            if dt > long_threshold_us {
                self.press_time_us = 0;
                return Some(dt);
            }
        }
        None
    }
}
