//! Snapshot queue from the routing core up to the user interface.
//!
//! The router (audio thread) and the control surface (worker threads) both
//! deposit compact 4-byte snapshots; the UI drains them at its own pace. A
//! bounded channel keeps the producers lock-free and non-blocking; on
//! overflow the snapshot is dropped, never waited on.

use crate::event::UiSnapshot;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// Create a snapshot queue holding up to `capacity` snapshots.
pub fn ui_channel(capacity: usize) -> (UiProducer, UiConsumer) {
    let (tx, rx) = bounded(capacity);
    (UiProducer { tx }, UiConsumer { rx })
}

/// Producer side. Cloneable: the router and the control surface each hold one.
#[derive(Clone)]
pub struct UiProducer {
    tx: Sender<UiSnapshot>,
}

impl UiProducer {
    /// Returns `false` if the queue is full (the snapshot is dropped).
    #[inline]
    pub fn push(&self, snapshot: UiSnapshot) -> bool {
        match self.tx.try_send(snapshot) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::trace!("UI snapshot queue full, dropping");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Consumer side, owned by the UI thread.
pub struct UiConsumer {
    rx: Receiver<UiSnapshot>,
}

impl UiConsumer {
    #[inline]
    pub fn pop(&self) -> Option<UiSnapshot> {
        self.rx.try_recv().ok()
    }

    /// Drain everything currently queued, returning how many were moved.
    pub fn drain_into(&self, out: &mut Vec<UiSnapshot>) -> usize {
        let mut n = 0;
        while let Ok(snapshot) = self.rx.try_recv() {
            out.push(snapshot);
            n += 1;
        }
        n
    }

    #[inline]
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}
