//! Controller swap layer.
//!
//! A second mapping stage for control-change events, applied right after the
//! main filter table on inputs carrying the `CC_SWAP` flag (no input carries
//! it by default). Unlike the filter table, swap mappings are exchanges: the
//! 16x128 controller slots form a graph in which every node emits exactly one
//! arrow and receives exactly one arrow, and every path is closed. Installing
//! a mapping from A to B therefore also installs the return arrow that keeps
//! the cycle closed; removing one unwinds it.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

const SLOTS: usize = 16 * 128;

/// How long a path we are willing to follow before declaring it broken.
const MAX_HOPS: usize = 128;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapKind {
    /// Identity arrow (node maps to itself).
    Thru,
    /// Helper arrow inserted to keep a cycle closed.
    Swap,
    /// An arrow installed explicitly by configuration.
    Mapped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapEntry {
    pub kind: SwapKind,
    pub chan: u8,
    pub num: u8,
}

#[derive(Clone, Copy, Debug)]
struct Arrow {
    chan_from: u8,
    num_from: u8,
    chan_to: u8,
    num_to: u8,
    kind: SwapKind,
}

#[derive(Clone, PartialEq, Eq)]
pub struct SwapMap {
    entries: Box<[SwapEntry]>,
}

impl SwapMap {
    pub fn new() -> Self {
        let mut entries = vec![
            SwapEntry {
                kind: SwapKind::Thru,
                chan: 0,
                num: 0
            };
            SLOTS
        ]
        .into_boxed_slice();
        for chan in 0..16u8 {
            for num in 0..128u8 {
                entries[Self::index(chan, num)] = SwapEntry {
                    kind: SwapKind::Thru,
                    chan,
                    num,
                };
            }
        }
        Self { entries }
    }

    #[inline]
    fn index(chan: u8, num: u8) -> usize {
        ((chan & 0x0F) as usize) * 128 + ((num & 0x7F) as usize)
    }

    fn validate(chan: u8, num: u8) -> Result<()> {
        if chan > 15 {
            tracing::warn!(chan, "swap map: channel out of range");
            return Err(Error::BadChannel(chan));
        }
        if num > 127 {
            tracing::warn!(num, "swap map: number out of range");
            return Err(Error::BadNumber(num));
        }
        Ok(())
    }

    /// Where `(chan, num)` currently points.
    #[inline]
    pub fn entry(&self, chan: u8, num: u8) -> SwapEntry {
        self.entries[Self::index(chan, num)]
    }

    fn put(&mut self, chan_from: u8, num_from: u8, kind: SwapKind, chan_to: u8, num_to: u8) {
        self.entries[Self::index(chan_from, num_from)] = SwapEntry {
            kind,
            chan: chan_to,
            num: num_to,
        };
    }

    fn put_identity(&mut self, chan: u8, num: u8) {
        self.put(chan, num, SwapKind::Thru, chan, num);
    }

    fn arrow_from(&self, chan: u8, num: u8) -> Arrow {
        let to = self.entry(chan, num);
        Arrow {
            chan_from: chan,
            num_from: num,
            chan_to: to.chan,
            num_to: to.num,
            kind: to.kind,
        }
    }

    /// Follow the cycle from `(chan, num)` until the arrow pointing back at
    /// it is found. Every path is closed, so a walk longer than the node
    /// count means corrupted state.
    fn arrow_to(&self, chan: u8, num: u8) -> Result<Arrow> {
        let mut arrow = self.arrow_from(chan, num);
        for _ in 0..MAX_HOPS {
            if arrow.chan_to == chan && arrow.num_to == num {
                return Ok(arrow);
            }
            arrow = self.arrow_from(arrow.chan_to, arrow.num_to);
        }
        tracing::error!(chan, num, "swap path not closed");
        Err(Error::SwapPathBroken)
    }

    /// Install an exchange mapping `(chan_from, num_from) -> (chan_to, num_to)`.
    ///
    /// Neither end may already be the origin or the destination of another
    /// explicit mapping; remove that one first.
    pub fn set(&mut self, chan_from: u8, num_from: u8, chan_to: u8, num_to: u8) -> Result<()> {
        Self::validate(chan_from, num_from)?;
        Self::validate(chan_to, num_to)?;

        let arrow_from = self.arrow_from(chan_from, num_from);
        let arrow_to = self.arrow_to(chan_to, num_to)?;

        if arrow_from.kind == SwapKind::Mapped {
            tracing::warn!(
                chan_from,
                num_from,
                "swap map: origin already carries a mapping"
            );
            return Err(Error::SwapRejected("origin already mapped"));
        }
        if arrow_to.kind == SwapKind::Mapped {
            tracing::warn!(chan_to, num_to, "swap map: destination already mapped to");
            return Err(Error::SwapRejected("destination already mapped to"));
        }

        self.put(chan_from, num_from, SwapKind::Mapped, chan_to, num_to);

        // Close the cycle: whatever used to reach the destination now feeds
        // whatever the origin used to feed.
        let kind = if arrow_from.chan_to == arrow_to.chan_from
            && arrow_from.num_to == arrow_to.num_from
        {
            SwapKind::Thru
        } else {
            SwapKind::Swap
        };
        self.put(
            arrow_to.chan_from,
            arrow_to.num_from,
            kind,
            arrow_from.chan_to,
            arrow_from.num_to,
        );
        Ok(())
    }

    /// Remove the mapping leaving `(chan, num)`, unwinding helper arrows.
    pub fn remove(&mut self, chan: u8, num: u8) -> Result<()> {
        Self::validate(chan, num)?;

        let arrow = self.arrow_from(chan, num);
        let arrow_to = self.arrow_to(chan, num)?;
        let arrow_from = self.arrow_from(arrow.chan_to, arrow.num_to);

        if arrow_to.kind != SwapKind::Swap && arrow_from.kind != SwapKind::Swap {
            // Lone exchange: the mapping decays into a helper arrow.
            self.put(
                arrow.chan_from,
                arrow.num_from,
                SwapKind::Swap,
                arrow.chan_to,
                arrow.num_to,
            );
            return Ok(());
        }

        if arrow_to.kind == SwapKind::Swap {
            self.put_identity(arrow.chan_from, arrow.num_from);
        } else {
            self.put(
                arrow.chan_from,
                arrow.num_from,
                SwapKind::Swap,
                arrow_from.chan_to,
                arrow_from.num_to,
            );
        }
        if arrow_from.kind == SwapKind::Swap {
            self.put_identity(arrow.chan_to, arrow.num_to);
        } else {
            self.put(
                arrow_to.chan_from,
                arrow_to.num_from,
                SwapKind::Swap,
                arrow.chan_to,
                arrow.num_to,
            );
        }
        Ok(())
    }

    /// The controller currently feeding `(chan, num)`.
    pub fn source_of(&self, chan: u8, num: u8) -> Result<(u8, u8)> {
        let arrow = self.arrow_to(chan, num)?;
        Ok((arrow.chan_from, arrow.num_from))
    }

    pub fn reset(&mut self) {
        for chan in 0..16u8 {
            for num in 0..128u8 {
                self.put_identity(chan, num);
            }
        }
    }
}

impl Default for SwapMap {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SwapMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mapped = self
            .entries
            .iter()
            .filter(|e| e.kind == SwapKind::Mapped)
            .count();
        f.debug_struct("SwapMap").field("mapped", &mapped).finish()
    }
}
