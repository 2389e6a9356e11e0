//! The control surface.
//!
//! Owns the switches, encoders, dials and expanders of the instrument panel,
//! and turns decoded input into MIDI on the router's synthetic internal
//! input (plus UI snapshots, so the interface tracks what the hands do).
//! The expander interrupt worker drives [`expander_interrupt`]; the UI polls
//! the query methods.
//!
//! [`expander_interrupt`]: ControlSurface::expander_interrupt

use crate::clock::Clock;
use crate::dial::DialBinding;
use crate::encoder::{RotaryDecoder, StepMode};
use crate::error::{Error, Result};
use crate::expander::{Expander, PinAction};
use crate::gpio::Gpio;
use crate::switch::{Switch, SwitchBinding, SwitchEdge};
use ostinato_midi::{CtrlValues, UiProducer, UiSnapshot};
use ostinato_router::EventInjector;

pub type EncoderCallback = Box<dyn FnMut(u8, i32) + Send>;

struct EncoderSlot {
    decoder: RotaryDecoder,
    pin_a: u16,
    pin_b: u16,
    dial: Option<DialBinding>,
}

pub struct ControlSurface {
    switches: Vec<Switch>,
    encoders: Vec<EncoderSlot>,
    expanders: Vec<Expander>,
    injector: EventInjector,
    ui: UiProducer,
    /// Last CC values on the internal input, for latched toggling.
    latch: CtrlValues,
    clock: Clock,
    encoder_callback: Option<EncoderCallback>,
}

impl ControlSurface {
    /// Wire a surface to the router's internal input. `internal_ctrl_values`
    /// is the shared table from the router handles.
    pub fn new(
        internal_in: EventInjector,
        ui: UiProducer,
        internal_ctrl_values: CtrlValues,
    ) -> Self {
        Self {
            switches: Vec::new(),
            encoders: Vec::new(),
            expanders: Vec::new(),
            injector: internal_in,
            ui,
            latch: internal_ctrl_values,
            clock: Clock::new(),
            encoder_callback: None,
        }
    }

    // -- registration -------------------------------------------------------

    pub fn add_expander(&mut self, base_pin: u16) -> usize {
        self.expanders.push(Expander::new(base_pin));
        tracing::debug!(base_pin, "expander registered");
        self.expanders.len() - 1
    }

    fn expander_for(&self, pin: u16) -> Result<usize> {
        self.expanders
            .iter()
            .position(|e| e.owns(pin))
            .ok_or(Error::UnmappedPin(pin))
    }

    /// Register a switch on an expander pin. `off_level` is the level that
    /// reads as released.
    pub fn add_switch(&mut self, pin: u16, off_level: bool) -> Result<usize> {
        let exp = self.expander_for(pin)?;
        let index = self.switches.len();
        if index > u8::MAX as usize {
            return Err(Error::BadIndex(index));
        }
        self.expanders[exp].bind(pin, PinAction::Switch(index as u8));
        self.switches.push(Switch::new(pin, off_level));
        Ok(index)
    }

    /// Register an encoder on two pins of the same expander bank.
    pub fn add_encoder(&mut self, pin_a: u16, pin_b: u16, mode: StepMode) -> Result<usize> {
        if pin_a == pin_b {
            return Err(Error::SplitEncoderPins(pin_a, pin_b));
        }
        let exp_a = self.expander_for(pin_a)?;
        let exp_b = self.expander_for(pin_b)?;
        let bank_a = self.expanders[exp_a].locate(pin_a).map(|(bank, _)| bank);
        let bank_b = self.expanders[exp_b].locate(pin_b).map(|(bank, _)| bank);
        if exp_a != exp_b || bank_a != bank_b {
            tracing::warn!(pin_a, pin_b, "encoder pins must share one expander bank");
            return Err(Error::SplitEncoderPins(pin_a, pin_b));
        }
        let index = self.encoders.len();
        if index > u8::MAX as usize {
            return Err(Error::BadIndex(index));
        }
        self.expanders[exp_a].bind(pin_a, PinAction::Encoder(index as u8));
        self.expanders[exp_a].bind(pin_b, PinAction::Encoder(index as u8));
        self.encoders.push(EncoderSlot {
            decoder: RotaryDecoder::new(mode),
            pin_a,
            pin_b,
            dial: None,
        });
        Ok(index)
    }

    pub fn bind_switch_midi(&mut self, switch: usize, binding: SwitchBinding) -> Result<()> {
        self.switches
            .get_mut(switch)
            .ok_or(Error::BadIndex(switch))?
            .bind(binding);
        Ok(())
    }

    pub fn bind_dial(&mut self, encoder: usize, dial: DialBinding) -> Result<()> {
        self.encoders
            .get_mut(encoder)
            .ok_or(Error::BadIndex(encoder))?
            .dial = Some(dial);
        Ok(())
    }

    pub fn set_step_mode(&mut self, encoder: usize, mode: StepMode) -> Result<()> {
        self.encoders
            .get_mut(encoder)
            .ok_or(Error::BadIndex(encoder))?
            .decoder
            .set_mode(mode);
        Ok(())
    }

    /// Deliver `(encoder, delta)` on every tick instead of accumulating.
    pub fn set_encoder_callback(&mut self, callback: impl FnMut(u8, i32) + Send + 'static) {
        self.encoder_callback = Some(Box::new(callback));
    }

    pub fn clear_encoder_callback(&mut self) {
        self.encoder_callback = None;
    }

    pub fn switch_count(&self) -> usize {
        self.switches.len()
    }

    pub fn encoder_count(&self) -> usize {
        self.encoders.len()
    }

    // -- interrupt path -----------------------------------------------------

    /// Dispatch one batched expander read (8 pin levels of one bank).
    pub fn expander_interrupt(&mut self, expander: usize, bank: usize, levels: u8) {
        let now_us = self.clock.now_us();
        self.expander_interrupt_at(expander, bank, levels, now_us);
    }

    /// As [`expander_interrupt`](Self::expander_interrupt), with the caller's
    /// timestamp.
    pub fn expander_interrupt_at(
        &mut self,
        expander: usize,
        bank: usize,
        levels: u8,
        now_us: u64,
    ) {
        if expander >= self.expanders.len() {
            tracing::warn!(expander, "interrupt for unknown expander");
            return;
        }
        if bank > 1 {
            tracing::warn!(bank, "interrupt for invalid expander bank");
            return;
        }
        let (mut diff, bank_base) = {
            let exp = &mut self.expanders[expander];
            (
                exp.diff_bank(bank, levels),
                exp.base_pin() + bank as u16 * 8,
            )
        };

        let mut bit: u8 = 0;
        while diff != 0 {
            if diff & 1 != 0 {
                match self.expanders[expander].action_at(bank, bit) {
                    PinAction::None => {}
                    PinAction::Switch(k) => {
                        let level = (levels >> bit) & 1 != 0;
                        self.switch_input(k as usize, level, now_us);
                    }
                    PinAction::Encoder(k) => {
                        if let Some(slot) = self.encoders.get(k as usize) {
                            let bit_a = (slot.pin_a - bank_base) as u8;
                            let bit_b = (slot.pin_b - bank_base) as u8;
                            let a = (levels >> bit_a) & 1 != 0;
                            let b = (levels >> bit_b) & 1 != 0;
                            // Both pins came from this read; take the partner
                            // out of the mask so the step is processed once.
                            diff &= !((((1u16 << bit_a) | (1u16 << bit_b)) >> bit) as u8);
                            self.encoder_input(k as usize, a, b, now_us / 1000);
                        }
                    }
                }
            }
            diff >>= 1;
            bit += 1;
        }
    }

    /// Feed one switch level directly (non-expander wiring, tests).
    pub fn switch_input(&mut self, index: usize, level: bool, now_us: u64) {
        let Some(sw) = self.switches.get_mut(index) else {
            return;
        };
        if let Some(edge) = sw.update(level, now_us) {
            let binding = sw.binding();
            self.emit_switch_midi(binding, edge);
        }
    }

    /// Feed one encoder (A, B) sample directly.
    pub fn encoder_input(&mut self, index: usize, a: bool, b: bool, now_ms: u64) {
        let Some(slot) = self.encoders.get_mut(index) else {
            return;
        };
        if slot.decoder.update(a, b, now_ms) == 0 {
            return;
        }
        if slot.dial.is_none() && self.encoder_callback.is_none() {
            return; // leave the delta for polling
        }
        let delta = slot.decoder.take_delta();
        if let Some(dial) = slot.dial.as_mut() {
            let value = dial.apply(delta);
            // Ring failures are reported by the writer itself.
            let _ = self
                .injector
                .send_control_change(dial.chan, dial.controller, value);
        }
        if let Some(callback) = self.encoder_callback.as_mut() {
            callback(index as u8, delta);
        }
    }

    fn emit_switch_midi(&mut self, binding: SwitchBinding, edge: SwitchEdge) {
        let press = edge == SwitchEdge::Press;
        match binding {
            SwitchBinding::None => {}
            SwitchBinding::ControlChange {
                chan,
                controller,
                value,
            } => {
                let val = if press { value } else { 0 };
                let _ = self.injector.send_control_change(chan, controller, val);
                self.ui
                    .push(UiSnapshot::from_bytes(0xB0 | (chan & 0x0F), controller, val));
            }
            SwitchBinding::LatchedControl { chan, controller } => {
                if press {
                    let val = if self.latch.get(chan, controller) >= 64 {
                        0
                    } else {
                        127
                    };
                    let _ = self.injector.send_control_change(chan, controller, val);
                    self.ui
                        .push(UiSnapshot::from_bytes(0xB0 | (chan & 0x0F), controller, val));
                }
            }
            SwitchBinding::Note {
                chan,
                note,
                velocity,
            } => {
                if press {
                    let _ = self.injector.send_note_on(chan, note, velocity);
                    self.ui
                        .push(UiSnapshot::from_bytes(0x90 | (chan & 0x0F), note, velocity));
                } else {
                    let _ = self.injector.send_note_off(chan, note, 0);
                    self.ui
                        .push(UiSnapshot::from_bytes(0x80 | (chan & 0x0F), note, 0));
                }
            }
            SwitchBinding::ProgramChange { chan, program } => {
                if press {
                    let _ = self.injector.send_program_change(chan, program);
                    self.ui
                        .push(UiSnapshot::from_bytes(0xC0 | (chan & 0x0F), program, 0));
                }
            }
            SwitchBinding::Realtime { status } => {
                if press {
                    let _ = self.injector.send_realtime(status);
                    self.ui.push(UiSnapshot::from_bytes(status, 0, 0));
                }
            }
        }
    }

    // -- polled queries -----------------------------------------------------

    /// "Yes, just pressed" exactly once per press.
    pub fn was_pressed(&mut self, switch: usize) -> Result<bool> {
        Ok(self
            .switches
            .get_mut(switch)
            .ok_or(Error::BadIndex(switch))?
            .was_pressed())
    }

    /// Completed or long-press durations, per the switch contract.
    pub fn switch_dwell(&mut self, switch: usize, long_threshold_us: u64) -> Result<Option<u64>> {
        let now_us = self.clock.now_us();
        self.switch_dwell_at(switch, long_threshold_us, now_us)
    }

    pub fn switch_dwell_at(
        &mut self,
        switch: usize,
        long_threshold_us: u64,
        now_us: u64,
    ) -> Result<Option<u64>> {
        Ok(self
            .switches
            .get_mut(switch)
            .ok_or(Error::BadIndex(switch))?
            .dwell_time(long_threshold_us, now_us))
    }

    /// Smallest switch index at or after `start` with something to report.
    pub fn next_pending_switch(&self, start: usize) -> Option<usize> {
        (start..self.switches.len()).find(|&i| self.switches[i].has_pending())
    }

    /// Accumulated encoder delta since the last take (polling mode).
    pub fn take_encoder_delta(&mut self, encoder: usize) -> Result<i32> {
        Ok(self
            .encoders
            .get_mut(encoder)
            .ok_or(Error::BadIndex(encoder))?
            .decoder
            .take_delta())
    }

    pub fn dial_value(&self, encoder: usize) -> Result<Option<i32>> {
        Ok(self
            .encoders
            .get(encoder)
            .ok_or(Error::BadIndex(encoder))?
            .dial
            .as_ref()
            .map(DialBinding::value))
    }

    /// Write a controller value back into any dial bound to it (the UI or a
    /// device moved the same control).
    pub fn sync_dial_from_midi(&mut self, chan: u8, controller: u8, value: u8) {
        for slot in &mut self.encoders {
            if let Some(dial) = slot.dial.as_mut() {
                if dial.chan == chan && dial.controller == controller {
                    dial.set_value(value as i32);
                }
            }
        }
    }

    // -- start-up -----------------------------------------------------------

    /// Read every registered pin once so baselines and levels reflect the
    /// hardware before the first interrupt.
    pub fn prime(&mut self, gpio: &mut impl Gpio) -> Result<()> {
        for exp in 0..self.expanders.len() {
            for bank in 0..2usize {
                let mut levels = 0u8;
                for bit in 0..8u16 {
                    let pin = self.expanders[exp].base_pin() + bank as u16 * 8 + bit;
                    if gpio.read_pin(pin)? {
                        levels |= 1 << bit;
                    }
                }
                self.expanders[exp].set_baseline(bank, levels);
            }
        }
        let now_us = self.clock.now_us();
        for i in 0..self.switches.len() {
            let pin = self.switches[i].pin();
            let level = gpio.read_pin(pin)?;
            self.switch_input(i, level, now_us);
        }
        for i in 0..self.encoders.len() {
            let (pin_a, pin_b) = {
                let slot = &self.encoders[i];
                (slot.pin_a, slot.pin_b)
            };
            let a = gpio.read_pin(pin_a)?;
            let b = gpio.read_pin(pin_b)?;
            self.encoder_input(i, a, b, now_us / 1000);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ostinato_midi::UiConsumer;
    use ostinato_router::{Router, RouterConfig, RouterHandles};

    struct Rig {
        surface: ControlSurface,
        ui_events: UiConsumer,
        latch: CtrlValues,
        _router: Router,
    }

    fn rig() -> Rig {
        let (router, handles) = Router::new(RouterConfig::default());
        let RouterHandles {
            ui_events,
            ui_tap,
            internal_in,
            internal_ctrl_values,
            ..
        } = handles;
        let surface = ControlSurface::new(internal_in, ui_tap, internal_ctrl_values.clone());
        Rig {
            surface,
            ui_events,
            latch: internal_ctrl_values,
            _router: router,
        }
    }

    #[test]
    fn test_switch_press_emits_cc_and_snapshot() {
        let Rig {
            mut surface,
            ui_events,
            ..
        } = rig();
        surface.add_expander(100);
        let sw = surface.add_switch(102, false).unwrap();
        surface
            .bind_switch_midi(
                sw,
                SwitchBinding::ControlChange {
                    chan: 0,
                    controller: 80,
                    value: 127,
                },
            )
            .unwrap();

        // Pin 102 (bank 0, bit 2) goes high, then low.
        surface.expander_interrupt_at(0, 0, 0b0000_0100, 10_000);
        surface.expander_interrupt_at(0, 0, 0b0000_0000, 80_000);

        let press = ui_events.pop().expect("press snapshot");
        assert_eq!((press.status(), press.data1(), press.data2()), (0xB0, 80, 127));
        let release = ui_events.pop().expect("release snapshot");
        assert_eq!((release.status(), release.data1(), release.data2()), (0xB0, 80, 0));

        assert!(surface.was_pressed(sw).unwrap());
        assert_eq!(
            surface.switch_dwell_at(sw, 1_000_000, 90_000).unwrap(),
            Some(70_000)
        );
    }

    #[test]
    fn test_latched_switch_toggles_on_observed_value() {
        let Rig {
            mut surface,
            ui_events,
            latch,
            ..
        } = rig();
        surface.add_expander(100);
        let sw = surface.add_switch(100, false).unwrap();
        surface
            .bind_switch_midi(sw, SwitchBinding::LatchedControl { chan: 0, controller: 64 })
            .unwrap();

        surface.expander_interrupt_at(0, 0, 0b0000_0001, 10_000);
        let on = ui_events.pop().expect("toggle on");
        assert_eq!(on.data2(), 127);

        // Release emits nothing for a latched control.
        surface.expander_interrupt_at(0, 0, 0b0000_0000, 50_000);
        assert_eq!(ui_events.pop(), None);

        // Once the router has seen 127 for this controller, the next press
        // toggles off.
        latch.set(0, 64, 127);
        surface.expander_interrupt_at(0, 0, 0b0000_0001, 2_000_000);
        let off = ui_events.pop().expect("toggle off");
        assert_eq!(off.data2(), 0);
    }

    #[test]
    fn test_expander_encoder_demux_single_step() {
        let Rig { mut surface, .. } = rig();
        surface.add_expander(100);
        let enc = surface.add_encoder(100, 101, StepMode::Fixed).unwrap();

        // One CW detent: (1,1) -> (0,1) -> (0,0) -> (1,0) -> (1,1), pins
        // A = bit 0, B = bit 1.
        let readings = [0b11u8, 0b10, 0b00, 0b01, 0b11];
        let mut t = 0;
        for levels in readings {
            surface.expander_interrupt_at(0, 0, levels, t);
            t += 100_000;
        }
        assert_eq!(surface.take_encoder_delta(enc).unwrap(), 1);
        assert_eq!(surface.take_encoder_delta(enc).unwrap(), 0);
    }

    #[test]
    fn test_dial_tracks_encoder_and_writeback() {
        let Rig { mut surface, .. } = rig();
        surface.add_expander(100);
        let enc = surface.add_encoder(100, 101, StepMode::Fixed).unwrap();
        surface
            .bind_dial(enc, DialBinding::controller_range(0, 7, 64))
            .unwrap();

        let readings = [0b11u8, 0b10, 0b00, 0b01, 0b11];
        let mut t = 0;
        for levels in readings {
            surface.expander_interrupt_at(0, 0, levels, t);
            t += 100_000;
        }
        assert_eq!(surface.dial_value(enc).unwrap(), Some(65));

        surface.sync_dial_from_midi(0, 7, 10);
        assert_eq!(surface.dial_value(enc).unwrap(), Some(10));
    }

    #[test]
    fn test_encoder_registration_validation() {
        let Rig { mut surface, .. } = rig();
        surface.add_expander(100);
        // Pins on different banks are refused.
        assert!(matches!(
            surface.add_encoder(107, 108, StepMode::Fixed),
            Err(Error::SplitEncoderPins(107, 108))
        ));
        // Unmapped pins are refused.
        assert!(matches!(
            surface.add_switch(40, false),
            Err(Error::UnmappedPin(40))
        ));
    }

    #[test]
    fn test_next_pending_switch_scans_forward() {
        let Rig { mut surface, .. } = rig();
        surface.add_expander(100);
        let first = surface.add_switch(100, false).unwrap();
        let second = surface.add_switch(101, false).unwrap();
        assert_eq!(surface.next_pending_switch(0), None);

        surface.switch_input(second, true, 10_000);
        assert_eq!(surface.next_pending_switch(0), Some(second));
        assert_eq!(surface.next_pending_switch(second + 1), None);
        let _ = first;
    }
}
