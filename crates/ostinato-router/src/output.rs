//! MIDI output ports.
//!
//! An output port owns everything the fan-out stage consults: the channel
//! translation map and primary channel, the routing mask over inputs, the
//! per-note on-state used for hanging-note recovery, note range and
//! transpose, per-channel last pitch-bend for tuning injection, policy
//! flags, and the connection count that lets the router skip silent ports.
//! Direct outputs additionally own the reader half of a write-through ring.

use crate::input_id;
use bitflags::bitflags;
use ostinato_midi::{event::PB_CENTER, midi_ring, MidiRingReader, MidiRingWriter};
use serde::{Deserialize, Serialize};

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct OutputFlags: u32 {
        /// Drop program-change events (except from the UI input).
        const DROP_PC = 1;
        /// Drop control-change events from external inputs.
        const DROP_CC = 2;
        /// Drop system events above SysEx (except from the UI input).
        const DROP_SYS = 4;
        /// Drop note on/off events (except from the UI input).
        const DROP_NOTE = 8;
        /// Inject tuning pitch-bend ahead of note-ons.
        const TUNING = 16;
        /// Apply note range and transpose.
        const NOTE_RANGE = 32;
        /// Translate/filter channels against the map and primary channel.
        const CHAN_TRANSFILTER = 64;
        /// Drop SysEx events.
        const DROP_SYSEX = 128;
        /// Fed through an owned ring, drained once per period.
        const DIRECT_OUT = 256;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputCategory {
    Chain,
    Mod,
    Step,
    ControlFeedback,
    DeviceEcho,
}

/// Playable note window plus transpose, per output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRange {
    pub low: u8,
    pub high: u8,
    pub octave: i8,
    pub semitone: i8,
}

impl NoteRange {
    #[inline]
    pub fn transpose(&self) -> i16 {
        self.octave as i16 * 12 + self.semitone as i16
    }
}

impl Default for NoteRange {
    fn default() -> Self {
        Self {
            low: 0,
            high: 127,
            octave: 0,
            semitone: 0,
        }
    }
}

pub struct OutputPort {
    category: OutputCategory,
    flags: OutputFlags,
    /// Per-channel translation; `None` drops the channel.
    pub(crate) channel_map: [Option<u8>; 16],
    /// The channel active-chain traffic is translated to.
    pub(crate) primary_channel: Option<u8>,
    /// Which inputs may reach this output.
    pub(crate) routes: [bool; input_id::COUNT],
    /// Last non-zero note-on velocity per note, 0 when the note is off.
    pub(crate) note_state: [u8; 128],
    pub(crate) note_range: NoteRange,
    /// Last raw pitch-bend per channel, for tuning injection.
    pub(crate) last_pb: [u16; 16],
    pub(crate) connections: u32,
    ring: Option<MidiRingReader>,
    pub(crate) drain_buf: Vec<u8>,
}

impl OutputPort {
    pub(crate) fn host(category: OutputCategory, flags: OutputFlags) -> Self {
        Self::build(category, flags, None)
    }

    /// A direct output; returns the writer half for the producing thread.
    pub(crate) fn direct(
        category: OutputCategory,
        flags: OutputFlags,
        capacity: usize,
    ) -> (Self, MidiRingWriter) {
        let (writer, reader) = midi_ring(capacity);
        (
            Self::build(category, flags | OutputFlags::DIRECT_OUT, Some(reader)),
            writer,
        )
    }

    fn build(category: OutputCategory, flags: OutputFlags, ring: Option<MidiRingReader>) -> Self {
        let mut port = Self {
            category,
            flags,
            channel_map: [None; 16],
            primary_channel: None,
            routes: [false; input_id::COUNT],
            note_state: [0; 128],
            note_range: NoteRange::default(),
            last_pb: [PB_CENTER; 16],
            connections: 0,
            ring,
            drain_buf: vec![0; super::input::EVENT_BUFFER_SIZE],
        };
        port.reset_channels();
        port
    }

    #[inline]
    pub fn category(&self) -> OutputCategory {
        self.category
    }

    #[inline]
    pub fn flags(&self) -> OutputFlags {
        self.flags
    }

    pub(crate) fn set_flags(&mut self, flags: OutputFlags) {
        let direct = self.flags & OutputFlags::DIRECT_OUT;
        self.flags = (flags - OutputFlags::DIRECT_OUT) | direct;
    }

    pub(crate) fn set_flag(&mut self, flag: OutputFlags, enable: bool) {
        let mut flags = self.flags;
        flags.set(flag, enable);
        self.set_flags(flags);
    }

    #[inline]
    pub fn connections(&self) -> u32 {
        self.connections
    }

    #[inline]
    pub fn primary_channel(&self) -> Option<u8> {
        self.primary_channel
    }

    /// Translation target for `chan`, `None` when the channel is dropped.
    #[inline]
    pub fn channel_for(&self, chan: u8) -> Option<u8> {
        self.channel_map[(chan & 0x0F) as usize]
    }

    #[inline]
    pub fn route_from(&self, input: usize) -> bool {
        self.routes.get(input).copied().unwrap_or(false)
    }

    /// Velocity of the last note-on dispatched for `note`, 0 when off.
    #[inline]
    pub fn note_state(&self, note: u8) -> u8 {
        self.note_state[(note & 0x7F) as usize]
    }

    #[inline]
    pub fn note_range(&self) -> NoteRange {
        self.note_range
    }

    /// Last raw pitch-bend seen on `chan`, used by tuning injection.
    #[inline]
    pub fn last_pb(&self, chan: u8) -> u16 {
        self.last_pb[(chan & 0x0F) as usize]
    }

    /// Pull the next write-through event into `drain_buf`.
    pub(crate) fn drain_next(&mut self) -> Option<usize> {
        let ring = self.ring.as_mut()?;
        ring.read_event(&mut self.drain_buf)
    }

    // -- channel-map configuration ------------------------------------------

    /// Clear the map and primary channel; the transfilter comes back on.
    pub(crate) fn reset_channels(&mut self) {
        self.channel_map = [None; 16];
        self.primary_channel = None;
        self.flags |= OutputFlags::CHAN_TRANSFILTER;
    }

    /// Listen on a single channel, emitting on the same channel.
    pub(crate) fn set_primary_channel(&mut self, chan: u8) {
        self.channel_map = [None; 16];
        self.channel_map[(chan & 0x0F) as usize] = Some(chan & 0x0F);
        self.primary_channel = Some(chan & 0x0F);
        self.flags |= OutputFlags::CHAN_TRANSFILTER;
    }

    /// Listen on a single channel, emitting on another.
    pub(crate) fn set_primary_translated(&mut self, chan: u8, emit_on: u8) {
        self.channel_map = [None; 16];
        self.channel_map[(chan & 0x0F) as usize] = Some(emit_on & 0x0F);
        self.primary_channel = Some(chan & 0x0F);
        self.flags |= OutputFlags::CHAN_TRANSFILTER;
    }

    /// Pass every channel untranslated; the transfilter goes off.
    pub(crate) fn set_channel_all(&mut self) {
        for (i, slot) in self.channel_map.iter_mut().enumerate() {
            *slot = Some(i as u8);
        }
        self.primary_channel = None;
        self.flags -= OutputFlags::CHAN_TRANSFILTER;
    }

    /// Funnel every channel onto one; the transfilter goes off.
    pub(crate) fn set_channel_all_to(&mut self, chan: u8) {
        self.channel_map = [Some(chan & 0x0F); 16];
        self.primary_channel = None;
        self.flags -= OutputFlags::CHAN_TRANSFILTER;
    }

    /// Point one translation slot somewhere (or drop it with `None`).
    pub(crate) fn set_channel_to(&mut self, from: u8, to: Option<u8>) {
        let to = to.filter(|&c| c < 16);
        self.channel_map[(from & 0x0F) as usize] = to;
    }

    // -- note range ---------------------------------------------------------

    pub(crate) fn set_note_range(&mut self, range: NoteRange) {
        self.note_range = range;
    }

    pub(crate) fn reset_note_range(&mut self) {
        self.note_range = NoteRange::default();
    }
}
