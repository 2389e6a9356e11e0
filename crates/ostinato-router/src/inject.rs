//! Direct event injection.
//!
//! An [`EventInjector`] is the writer half of a direct port's ring: synthetic
//! inputs (UI, physical controls) and direct outputs (controller feedback,
//! device echo) each hand exactly one of these to their producing thread.
//! Writes are all-or-nothing and never block; a full ring drops the event
//! and reports the failure.

use crate::error::Result;
use ostinato_midi::{event, MidiRingWriter};

pub struct EventInjector {
    writer: MidiRingWriter,
}

impl EventInjector {
    pub(crate) fn new(writer: MidiRingWriter) -> Self {
        Self { writer }
    }

    /// Deposit a raw framed event (3 bytes, or complete SysEx).
    pub fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write(bytes)?;
        Ok(())
    }

    pub fn send_note_off(&mut self, chan: u8, note: u8, vel: u8) -> Result<()> {
        self.send(&event::note_off(chan, note, vel))
    }

    pub fn send_note_on(&mut self, chan: u8, note: u8, vel: u8) -> Result<()> {
        self.send(&event::note_on(chan, note, vel))
    }

    pub fn send_control_change(&mut self, chan: u8, controller: u8, val: u8) -> Result<()> {
        self.send(&event::control_change(chan, controller, val))
    }

    pub fn send_program_change(&mut self, chan: u8, program: u8) -> Result<()> {
        self.send(&event::program_change(chan, program))
    }

    pub fn send_channel_pressure(&mut self, chan: u8, val: u8) -> Result<()> {
        self.send(&event::channel_pressure(chan, val))
    }

    pub fn send_pitch_bend(&mut self, chan: u8, value: u16) -> Result<()> {
        self.send(&event::pitch_bend(chan, value))
    }

    /// System real-time message (clock, transport).
    pub fn send_realtime(&mut self, status: u8) -> Result<()> {
        self.send(&event::realtime(status))
    }

    #[inline]
    pub fn free_space(&self) -> usize {
        self.writer.free_space()
    }
}
