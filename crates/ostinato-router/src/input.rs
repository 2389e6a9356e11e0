//! MIDI input ports.
//!
//! An input port wraps either a host-provided buffer or a direct-injection
//! ring and exposes a one-event lookahead with a non-decreasing timestamp.
//! It also owns the per-(channel, controller) state behind the relative-CC
//! auto-detector: a control mode, a trial counter, and the last value seen
//! (the latter shared with the switch engine for the internal input).

use crate::host::MidiHost;
use bitflags::bitflags;
use ostinato_midi::{midi_ring, CtrlValues, MidiRingReader, MidiRingWriter};
use serde::{Deserialize, Serialize};

/// Scratch size per port; bounds the largest deliverable event (SysEx included).
pub(crate) const EVENT_BUFFER_SIZE: usize = 4096;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct InputFlags: u32 {
        /// Events from this input are snapshotted to the UI queue.
        const UI = 1;
        /// Apply the controller swap layer.
        const CC_SWAP = 2;
        /// Apply the event filter table.
        const FILTER = 4;
        /// Route through the active chain with channel translation.
        const ACTIVE_CHAIN = 8;
        /// Run the relative-CC auto-detector.
        const CC_AUTO_MODE = 16;
        /// Fed by a direct-injection ring instead of a host buffer.
        const DIRECT_IN = 32;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputCategory {
    Device,
    Sequencer,
    StepSequencer,
    ControlFeedback,
    Internal,
    Ui,
}

/// Detected protocol of one controller, per the auto-mode detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CtrlMode {
    /// Values are absolute positions.
    Absolute,
    /// A rel-mode mark (64) was seen; watching for the confirming second mark.
    RelativeTrial,
    /// Two marks seen; values are signed offsets around 64.
    RelativeConfirmed,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Pending {
    pub time: u32,
    pub len: usize,
}

pub struct InputPort {
    category: InputCategory,
    flags: InputFlags,
    host_bound: bool,
    ring: Option<MidiRingReader>,
    /// Current event, owned: host events are copied in, ring events framed in.
    pub(crate) scratch: Vec<u8>,
    pub(crate) pending: Option<Pending>,
    cursor: u32,
    event_count: u32,
    ctrl_mode: Box<[CtrlMode]>,
    relmode_count: Box<[u8]>,
    pub(crate) ctrl_values: CtrlValues,
}

impl InputPort {
    /// A port backed by a host buffer.
    pub(crate) fn host(category: InputCategory, flags: InputFlags) -> Self {
        Self::build(category, flags, true, None)
    }

    /// A synthetic port backed by an owned ring; returns the writer half for
    /// the injecting thread.
    pub(crate) fn direct(
        category: InputCategory,
        flags: InputFlags,
        capacity: usize,
    ) -> (Self, MidiRingWriter) {
        let (writer, reader) = midi_ring(capacity);
        (
            Self::build(category, flags | InputFlags::DIRECT_IN, false, Some(reader)),
            writer,
        )
    }

    fn build(
        category: InputCategory,
        flags: InputFlags,
        host_bound: bool,
        ring: Option<MidiRingReader>,
    ) -> Self {
        Self {
            category,
            flags,
            host_bound,
            ring,
            scratch: vec![0; EVENT_BUFFER_SIZE],
            pending: None,
            cursor: 0,
            event_count: 0,
            ctrl_mode: vec![CtrlMode::Absolute; 16 * 128].into_boxed_slice(),
            relmode_count: vec![0; 16 * 128].into_boxed_slice(),
            ctrl_values: CtrlValues::new(),
        }
    }

    #[inline]
    pub fn category(&self) -> InputCategory {
        self.category
    }

    #[inline]
    pub fn flags(&self) -> InputFlags {
        self.flags
    }

    pub(crate) fn set_flags(&mut self, flags: InputFlags) {
        // DIRECT_IN is structural; configuration cannot toggle it.
        let direct = self.flags & InputFlags::DIRECT_IN;
        self.flags = (flags - InputFlags::DIRECT_IN) | direct;
    }

    pub(crate) fn set_flag(&mut self, flag: InputFlags, enable: bool) {
        let mut flags = self.flags;
        flags.set(flag, enable);
        self.set_flags(flags);
    }

    /// Last value seen for `(chan, controller)` on this input.
    #[inline]
    pub fn last_ctrl_value(&self, chan: u8, controller: u8) -> u8 {
        self.ctrl_values.get(chan, controller)
    }

    #[inline]
    pub fn ctrl_mode(&self, chan: u8, controller: u8) -> CtrlMode {
        self.ctrl_mode[Self::slot(chan, controller)]
    }

    #[inline]
    fn slot(chan: u8, controller: u8) -> usize {
        ((chan & 0x0F) as usize) * 128 + ((controller & 0x7F) as usize)
    }

    // -- period-loop side ---------------------------------------------------

    /// Reset the cursor and position the lookahead on the first event.
    pub(crate) fn begin_period<H: MidiHost>(&mut self, host: &mut H, index: usize) {
        if self.host_bound {
            self.event_count = host.input_event_count(index);
            self.cursor = 0;
        }
        self.pending = None;
        self.advance(host, index);
    }

    /// Replace the lookahead with the next event, or mark the port drained.
    pub(crate) fn advance<H: MidiHost>(&mut self, host: &mut H, index: usize) {
        self.pending = None;
        if self.host_bound {
            while self.cursor < self.event_count {
                let n = self.cursor;
                self.cursor += 1;
                if let Some((time, len)) = host.input_event(index, n, &mut self.scratch) {
                    if len > 0 {
                        self.pending = Some(Pending { time, len });
                        return;
                    }
                }
            }
        } else if let Some(ring) = self.ring.as_mut() {
            if let Some(len) = ring.read_event(&mut self.scratch) {
                // Synthetic events sort before host events.
                self.pending = Some(Pending { time: 0, len });
            }
        }
    }

    /// Drop the lookahead without reading further (used while a port is
    /// excluded from the period, e.g. control feedback during MIDI learn).
    pub(crate) fn skip_period(&mut self) {
        self.pending = None;
        self.event_count = 0;
        self.cursor = 0;
    }

    #[inline]
    pub(crate) fn pending_time(&self) -> Option<u32> {
        self.pending.map(|p| p.time)
    }

    /// Run one control-change value through the relative-mode auto-detector.
    ///
    /// Returns the value to forward (possibly rewritten from a relative
    /// offset to an absolute position), or `None` when the event is a
    /// rel-mode mark to be swallowed.
    ///
    /// A controller starts out `Absolute`. The first 64 tentatively enters
    /// `RelativeTrial` (dropping the event if it would be a jump of more than
    /// 4 from the last value); the confirming second mark enters
    /// `RelativeConfirmed`, after which values are offsets around 64. Marks
    /// keep arriving every other message in relative mode, so more than one
    /// offset since the last mark disproves the protocol and reverts to
    /// `Absolute`.
    pub(crate) fn cc_auto_mode(&mut self, chan: u8, num: u8, val: u8) -> Option<u8> {
        let slot = Self::slot(chan, num);
        match self.ctrl_mode[slot] {
            CtrlMode::Absolute => {
                if val == 64 {
                    self.ctrl_mode[slot] = CtrlMode::RelativeTrial;
                    self.relmode_count[slot] = 1;
                    let last = self.ctrl_values.get(chan, num) as i16;
                    if (last - 64).abs() > 4 {
                        return None;
                    }
                }
                Some(val)
            }
            CtrlMode::RelativeTrial | CtrlMode::RelativeConfirmed => {
                if self.relmode_count[slot] > 1 {
                    self.ctrl_mode[slot] = CtrlMode::Absolute;
                    Some(val)
                } else if val == 64 {
                    if self.relmode_count[slot] == 1 {
                        self.relmode_count[slot] = 0;
                        self.ctrl_mode[slot] = CtrlMode::RelativeConfirmed;
                        None
                    } else {
                        self.ctrl_mode[slot] = CtrlMode::Absolute;
                        Some(val)
                    }
                } else {
                    let last = self.ctrl_values.get(chan, num) as i16;
                    let new_val = (last + val as i16 - 64).clamp(0, 127) as u8;
                    self.relmode_count[slot] += 1;
                    Some(new_val)
                }
            }
        }
    }

    /// Forget detector state for one controller.
    pub(crate) fn reset_ctrl_mode(&mut self, chan: u8, num: u8) {
        let slot = Self::slot(chan, num);
        self.ctrl_mode[slot] = CtrlMode::Absolute;
        self.relmode_count[slot] = 0;
    }
}
