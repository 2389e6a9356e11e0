//! Background polling loops with cooperative shutdown.
//!
//! Analog inputs and polled peripherals run a periodic tick on a worker
//! thread. The shutdown flag is checked every iteration and `shutdown`
//! joins the worker, so nothing outlives the surface that spawned it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub struct Poller {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    /// Spawn a named worker running `tick` every `interval`.
    pub fn spawn(
        name: &str,
        interval: Duration,
        mut tick: impl FnMut() + Send + 'static,
    ) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new().name(name.to_owned()).spawn(move || {
            while !flag.load(Ordering::Acquire) {
                tick();
                thread::park_timeout(interval);
            }
        })?;
        tracing::debug!(name, ?interval, "poller started");
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Signal the worker and wait for it to finish.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
