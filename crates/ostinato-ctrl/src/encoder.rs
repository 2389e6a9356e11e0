//! Quadrature decoding for detented rotary encoders.
//!
//! Each (A, B) sample extends a 4-bit short history (previous and current
//! reading, inverted). Only the 8 Gray-code transitions in which exactly one
//! line toggled are accepted; accepted transitions accumulate in a 16-bit
//! long history. A detent tick is reported when the last two transitions
//! form the rest-detent marker: `0xD4` clockwise, `0xE8` counter-clockwise.
//! Bounce and skate produce invalid or non-marker patterns and decode to
//! nothing.

use serde::{Deserialize, Serialize};

/// Transitions of the inverted 2-bit quadrature signal in which exactly one
/// line changed.
const VALID_TRANSITIONS: [bool; 16] = [
    false, true, true, false, true, false, false, true, true, false, false, true, false, true,
    true, false,
];

/// Low byte of the long history at the final CW transition before rest.
const DETENT_CW: u8 = 0xD4;
/// Low byte of the long history at the final CCW transition before rest.
const DETENT_CCW: u8 = 0xE8;

/// Milliseconds below which successive detents accelerate.
const ACCEL_WINDOW_MS: u64 = 40;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepMode {
    /// Ticks scale with rotation speed.
    Accelerated,
    /// One detent, one step.
    Fixed,
}

#[derive(Debug)]
pub struct RotaryDecoder {
    short_history: u8,
    long_history: u16,
    last_tick_ms: u64,
    delta: i32,
    mode: StepMode,
}

impl RotaryDecoder {
    pub fn new(mode: StepMode) -> Self {
        Self {
            short_history: 0,
            long_history: 0,
            last_tick_ms: 0,
            delta: 0,
            mode,
        }
    }

    /// Feed one (A, B) reading. Returns the tick delta this sample produced
    /// (±1, scaled by acceleration) or 0; deltas also accumulate for
    /// [`take_delta`](Self::take_delta).
    pub fn update(&mut self, a: bool, b: bool, now_ms: u64) -> i32 {
        self.short_history <<= 2;
        if !a {
            self.short_history |= 0x02;
        }
        if !b {
            self.short_history |= 0x01;
        }
        self.short_history &= 0x0F;

        if !VALID_TRANSITIONS[self.short_history as usize] {
            return 0;
        }
        self.long_history = (self.long_history << 4) | self.short_history as u16;

        let mut delta: i32 = match (self.long_history & 0xFF) as u8 {
            DETENT_CW => 1,
            DETENT_CCW => -1,
            _ => return 0,
        };

        if self.mode == StepMode::Accelerated {
            let dt = now_ms.saturating_sub(self.last_tick_ms);
            if dt < ACCEL_WINDOW_MS {
                delta *= ((ACCEL_WINDOW_MS - dt) as i32 / 10) + 1;
            }
            self.last_tick_ms = now_ms;
        }

        self.delta += delta;
        delta
    }

    /// Accumulated delta since the last take, reset on read.
    pub fn take_delta(&mut self) -> i32 {
        std::mem::take(&mut self.delta)
    }

    pub fn mode(&self) -> StepMode {
        self.mode
    }

    /// Switching modes clears history and accumulator.
    pub fn set_mode(&mut self, mode: StepMode) {
        self.mode = mode;
        self.reset();
    }

    pub fn reset(&mut self) {
        self.short_history = 0;
        self.long_history = 0;
        self.last_tick_ms = 0;
        self.delta = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One full CW detent from rest: (1,1) -> (0,1) -> (0,0) -> (1,0) -> (1,1).
    const CW_DETENT: [(bool, bool); 5] =
        [(true, true), (false, true), (false, false), (true, false), (true, true)];
    /// The same detent rotated the other way.
    const CCW_DETENT: [(bool, bool); 5] =
        [(true, true), (true, false), (false, false), (false, true), (true, true)];

    fn feed(dec: &mut RotaryDecoder, seq: &[(bool, bool)], now_ms: u64) -> i32 {
        let mut total = 0;
        for &(a, b) in seq {
            total += dec.update(a, b, now_ms);
        }
        total
    }

    #[test]
    fn test_cw_detent_is_one_tick() {
        let mut dec = RotaryDecoder::new(StepMode::Fixed);
        assert_eq!(feed(&mut dec, &CW_DETENT, 1000), 1);
        assert_eq!(dec.take_delta(), 1);
    }

    #[test]
    fn test_ccw_detent_is_minus_one() {
        let mut dec = RotaryDecoder::new(StepMode::Fixed);
        assert_eq!(feed(&mut dec, &CCW_DETENT, 1000), -1);
    }

    #[test]
    fn test_repeated_detents_tick_once_each() {
        let mut dec = RotaryDecoder::new(StepMode::Fixed);
        for i in 0..5 {
            assert_eq!(feed(&mut dec, &CW_DETENT, 1000 + i * 100), 1, "detent {i}");
        }
        assert_eq!(dec.take_delta(), 5);
    }

    #[test]
    fn test_bounce_decodes_to_nothing() {
        let mut dec = RotaryDecoder::new(StepMode::Fixed);
        // A contact repeating the same level is not a valid transition.
        assert_eq!(dec.update(true, true, 0), 0);
        assert_eq!(dec.update(true, true, 0), 0);
        // Both lines flipping at once is not a legal Gray-code move.
        assert_eq!(dec.update(false, false, 0), 0);
        assert_eq!(dec.take_delta(), 0);
    }

    #[test]
    fn test_half_detent_is_silent() {
        let mut dec = RotaryDecoder::new(StepMode::Fixed);
        assert_eq!(
            feed(&mut dec, &[(true, true), (false, true), (false, false)], 0),
            0
        );
    }

    #[test]
    fn test_acceleration_table() {
        // delta = ((40 - dt) / 10) + 1 for dt < 40 ms, integer floor.
        let cases = [(0u64, 5), (9, 4), (10, 4), (19, 3), (25, 2), (39, 1), (40, 1), (100, 1)];
        for (dt, expected) in cases {
            let mut dec = RotaryDecoder::new(StepMode::Accelerated);
            assert_eq!(feed(&mut dec, &CW_DETENT, 1000), 1, "first detent unaccelerated");
            assert_eq!(
                feed(&mut dec, &CW_DETENT, 1000 + dt),
                expected,
                "dt = {dt} ms"
            );
        }
    }

    #[test]
    fn test_fixed_mode_never_accelerates() {
        let mut dec = RotaryDecoder::new(StepMode::Fixed);
        assert_eq!(feed(&mut dec, &CW_DETENT, 1000), 1);
        assert_eq!(feed(&mut dec, &CW_DETENT, 1001), 1);
    }
}
