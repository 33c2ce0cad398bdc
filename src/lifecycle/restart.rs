//! Process restart requests.
//!
//! A restore replaces configuration under running components, so the process
//! restarts afterwards. The daemon shuts down gracefully and exits with
//! [`RESTART_EXIT_CODE`]; the supervisor (systemd, container runtime) starts
//! it again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::lifecycle::shutdown::Shutdown;

/// Exit status telling the supervisor to start the daemon again.
pub const RESTART_EXIT_CODE: i32 = 75;

/// Receives restart requests from components.
pub trait RestartHandle: Send + Sync {
    fn request_restart(&self, reason: &str);
}

/// Restarts the daemon by triggering graceful shutdown after a short delay.
pub struct ProcessRestarter {
    requested: AtomicBool,
    shutdown: Arc<Shutdown>,
    delay: Duration,
}

impl ProcessRestarter {
    pub fn new(shutdown: Arc<Shutdown>, delay: Duration) -> Self {
        Self {
            requested: AtomicBool::new(false),
            shutdown,
            delay,
        }
    }

    /// True once a restart has been requested.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

impl RestartHandle for ProcessRestarter {
    fn request_restart(&self, reason: &str) {
        if self.requested.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::warn!(reason = %reason, delay_ms = self.delay.as_millis() as u64, "Restart requested");

        // the delay lets the triggering response reach the client
        let shutdown = self.shutdown.clone();
        let delay = self.delay;
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            shutdown.trigger();
        });
    }
}
