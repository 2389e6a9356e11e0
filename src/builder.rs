//! Assembly of the routing core.
//!
//! The builder creates the router with its fixed port set, then wires a
//! control surface to the synthetic internal input. The resulting [`Core`]
//! is taken apart by the embedder: the router moves next to the audio
//! callback, the surface to the input worker, the remaining queue ends to
//! the UI and feedback threads.

use ostinato_ctrl::ControlSurface;
use ostinato_midi::UiConsumer;
use ostinato_router::{EventInjector, Router, RouterConfig, RouterHandles};

pub struct CoreBuilder {
    config: RouterConfig,
}

impl CoreBuilder {
    pub fn new() -> Self {
        Self {
            config: RouterConfig::default(),
        }
    }

    /// Byte capacity of each direct-injection and direct-output ring.
    pub fn ring_capacity(mut self, bytes: usize) -> Self {
        self.config.ring_capacity = bytes;
        self
    }

    /// Snapshot capacity of the UI queue.
    pub fn ui_capacity(mut self, snapshots: usize) -> Self {
        self.config.ui_capacity = snapshots;
        self
    }

    pub fn build(self) -> Core {
        let (router, handles) = Router::new(self.config);
        let RouterHandles {
            ui_events,
            ui_tap,
            internal_in,
            ui_in,
            ctrl_feedback_out,
            device_out,
            internal_ctrl_values,
        } = handles;
        let surface = ControlSurface::new(internal_in, ui_tap, internal_ctrl_values);
        Core {
            router,
            surface,
            ui_events,
            ui_in,
            ctrl_feedback_out,
            device_out,
        }
    }
}

impl Default for CoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The assembled core, ready to be split across threads.
pub struct Core {
    /// The per-period engine; lives with the audio callback.
    pub router: Router,
    /// Decoded physical input; lives with the interrupt worker.
    pub surface: ControlSurface,
    /// Read side of the UI snapshot queue.
    pub ui_events: UiConsumer,
    /// Injects UI-originated events into the router.
    pub ui_in: EventInjector,
    /// Write-through to the controller-feedback output.
    pub ctrl_feedback_out: EventInjector,
    /// Write-through to each device-echo output.
    pub device_out: Vec<EventInjector>,
}
