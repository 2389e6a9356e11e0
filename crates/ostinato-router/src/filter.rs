//! The event filter table.
//!
//! A 3-dimensional mapping `(class, channel, number) -> action` applied to
//! channel messages on inputs that carry the `FILTER` flag. Actions are
//! pass-through, ignore, or remap to another `(class, channel, number)`.
//! Pitch-bend and channel-pressure use the table slot at `number == 0`.
//! Lookup is a flat O(1) index; the default action everywhere is `Thru`.

use crate::error::{Error, Result};
use ostinato_midi::ChannelClass;
use serde::{Deserialize, Serialize};

const CLASSES: usize = 7;
const SLOTS: usize = CLASSES * 16 * 128;

/// What to do with a matching event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventAction {
    /// Pass unchanged.
    Thru,
    /// Drop the event.
    Ignore,
    /// Rewrite the event to this class/channel/number.
    Map {
        class: ChannelClass,
        chan: u8,
        num: u8,
    },
}

#[derive(Clone, PartialEq, Eq)]
pub struct FilterMap {
    actions: Box<[EventAction]>,
}

impl FilterMap {
    pub fn new() -> Self {
        Self {
            actions: vec![EventAction::Thru; SLOTS].into_boxed_slice(),
        }
    }

    #[inline]
    fn index(class: ChannelClass, chan: u8, num: u8) -> usize {
        class.table_index() * 16 * 128 + (chan as usize) * 128 + num as usize
    }

    fn validate(chan: u8, num: u8) -> Result<()> {
        if chan > 15 {
            tracing::warn!(chan, "filter table: channel out of range");
            return Err(Error::BadChannel(chan));
        }
        if num > 127 {
            tracing::warn!(num, "filter table: number out of range");
            return Err(Error::BadNumber(num));
        }
        Ok(())
    }

    /// Install a remap rule.
    pub fn set_map(
        &mut self,
        from: (ChannelClass, u8, u8),
        to: (ChannelClass, u8, u8),
    ) -> Result<()> {
        Self::validate(from.1, from.2)?;
        Self::validate(to.1, to.2)?;
        self.actions[Self::index(from.0, from.1, from.2)] = EventAction::Map {
            class: to.0,
            chan: to.1,
            num: to.2,
        };
        Ok(())
    }

    /// Drop matching events.
    pub fn set_ignore(&mut self, class: ChannelClass, chan: u8, num: u8) -> Result<()> {
        Self::validate(chan, num)?;
        self.actions[Self::index(class, chan, num)] = EventAction::Ignore;
        Ok(())
    }

    /// Restore the default pass-through for one slot.
    pub fn clear(&mut self, class: ChannelClass, chan: u8, num: u8) -> Result<()> {
        Self::validate(chan, num)?;
        self.actions[Self::index(class, chan, num)] = EventAction::Thru;
        Ok(())
    }

    #[inline]
    pub fn action_for(&self, class: ChannelClass, chan: u8, num: u8) -> EventAction {
        self.actions[Self::index(class, chan & 0x0F, num & 0x7F)]
    }

    /// Restore the default table: everything passes.
    pub fn reset(&mut self) {
        self.actions.fill(EventAction::Thru);
    }

    // Controller-mapping convenience layer.

    pub fn set_cc_map(&mut self, chan_from: u8, cc_from: u8, chan_to: u8, cc_to: u8) -> Result<()> {
        self.set_map(
            (ChannelClass::ControlChange, chan_from, cc_from),
            (ChannelClass::ControlChange, chan_to, cc_to),
        )
    }

    pub fn set_cc_ignore(&mut self, chan: u8, cc: u8) -> Result<()> {
        self.set_ignore(ChannelClass::ControlChange, chan, cc)
    }

    pub fn clear_cc_map(&mut self, chan: u8, cc: u8) -> Result<()> {
        self.clear(ChannelClass::ControlChange, chan, cc)
    }

    pub fn reset_cc_maps(&mut self) {
        for chan in 0..16 {
            for cc in 0..128 {
                self.actions[Self::index(ChannelClass::ControlChange, chan, cc)] =
                    EventAction::Thru;
            }
        }
    }

    /// Number a controller currently maps to (itself when unmapped).
    pub fn cc_map_for(&self, chan: u8, cc: u8) -> u8 {
        match self.action_for(ChannelClass::ControlChange, chan, cc) {
            EventAction::Map { num, .. } => num,
            _ => cc & 0x7F,
        }
    }
}

impl Default for FilterMap {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FilterMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mapped = self
            .actions
            .iter()
            .filter(|a| !matches!(a, EventAction::Thru))
            .count();
        f.debug_struct("FilterMap").field("mapped", &mapped).finish()
    }
}
