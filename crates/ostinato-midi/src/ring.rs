//! Lock-free SPSC event rings with MIDI framing.
//!
//! Each ring carries length-framed MIDI events as raw bytes: plain events are
//! exactly 3 bytes, SysEx runs from `F0` to `F7`. The writer validates framing
//! and either deposits a whole event or nothing; the reader re-frames on the
//! way out. One writer, one reader -- the pair is created together and the
//! halves are moved to their owning threads.

use crate::error::{Error, Result};
use crate::event::{is_well_formed, SYSEX_END, SYSEX_START};
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};

/// Create an event ring holding up to `capacity` bytes.
pub fn midi_ring(capacity: usize) -> (MidiRingWriter, MidiRingReader) {
    let rb = HeapRb::new(capacity);
    let (producer, consumer) = rb.split();
    (
        MidiRingWriter { producer },
        MidiRingReader {
            consumer,
            sysex: Vec::with_capacity(capacity),
        },
    )
}

/// Producer half -- push whole events from any single non-RT thread.
pub struct MidiRingWriter {
    producer: HeapProd<u8>,
}

impl MidiRingWriter {
    /// Deposit one framed event. All-or-nothing: on a full ring the event is
    /// dropped and the failure reported to the caller.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if !is_well_formed(bytes) {
            tracing::warn!(len = bytes.len(), "rejecting malformed MIDI event");
            return Err(Error::MalformedEvent { len: bytes.len() });
        }
        let free = self.producer.vacant_len();
        if free < bytes.len() {
            tracing::warn!(needed = bytes.len(), free, "event ring full, dropping");
            return Err(Error::RingFull {
                needed: bytes.len(),
                free,
            });
        }
        let written = self.producer.push_slice(bytes);
        debug_assert_eq!(written, bytes.len());
        Ok(())
    }

    #[inline]
    pub fn free_space(&self) -> usize {
        self.producer.vacant_len()
    }
}

/// Consumer half -- drained by the router once per period.
pub struct MidiRingReader {
    consumer: HeapCons<u8>,
    /// Body of a SysEx whose terminator has not arrived yet. The ring counts
    /// as drained while this is non-empty; the event completes on a later
    /// drain once the remaining bytes show up.
    sysex: Vec<u8>,
}

impl MidiRingReader {
    /// Read the next framed event into `buf`, returning its length.
    ///
    /// The first 3 bytes are consumed together; if they start a SysEx, bytes
    /// follow one at a time until `F7`. Synthetic events carry time 0 by
    /// convention, so they sort before host-buffer events.
    pub fn read_event(&mut self, buf: &mut [u8]) -> Option<usize> {
        if !self.sysex.is_empty() {
            return self.continue_sysex(buf);
        }
        if self.consumer.occupied_len() < 3 {
            return None;
        }
        let mut head = [0u8; 3];
        let got = self.consumer.pop_slice(&mut head);
        debug_assert_eq!(got, 3);

        if head[0] != SYSEX_START {
            buf[..3].copy_from_slice(&head);
            return Some(3);
        }
        // Writers guarantee F7 appears only as the terminator, so a complete
        // 3-byte SysEx is recognisable from the head alone.
        if head[2] == SYSEX_END {
            buf[..3].copy_from_slice(&head);
            return Some(3);
        }
        self.sysex.extend_from_slice(&head);
        self.continue_sysex(buf)
    }

    fn continue_sysex(&mut self, buf: &mut [u8]) -> Option<usize> {
        while let Some(byte) = self.consumer.try_pop() {
            self.sysex.push(byte);
            if byte == SYSEX_END {
                let len = self.sysex.len();
                if len > buf.len() {
                    tracing::warn!(len, "SysEx larger than reader buffer, dropping");
                    self.sysex.clear();
                    return None;
                }
                buf[..len].copy_from_slice(&self.sysex);
                self.sysex.clear();
                return Some(len);
            }
        }
        None
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty() && self.sysex.is_empty()
    }

    #[inline]
    pub fn pending_bytes(&self) -> usize {
        self.consumer.occupied_len() + self.sysex.len()
    }
}
