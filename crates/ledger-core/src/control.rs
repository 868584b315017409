//! Shared control state for a running ledger.
//!
//! The tick loop owns the service outright; everything the outside world
//! may poke at while it runs lives here. A [`LedgerControl`] is wrapped in
//! an [`Arc`](std::sync::Arc) and shared between the loop, the signal
//! handler and whatever feeds administrative reloads.
//!
//! The stop flag is an atomic for lock-free checks, paired with a
//! [`Notify`] so the loop can `select!` on it. A pending capture update
//! sits in a single-slot mutex; the loop takes it right before each tick,
//! so a reload never takes effect mid-tick.

use std::sync::atomic::{AtomicBool, Ordering};

use ledger_types::CaptureConfig;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tracing::info;

/// Why the tick loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEndReason {
    /// The host event feed closed.
    EndOfInput,
    /// A stop was requested through [`LedgerControl::request_stop`].
    StopRequested,
}

/// Shared control state for the tick loop.
#[derive(Debug, Default)]
pub struct LedgerControl {
    /// Whether a stop has been requested.
    stop_requested: AtomicBool,

    /// Wakes every task waiting in [`stopped`](Self::stopped).
    stop_notify: Notify,

    /// Capture set to apply before the next tick, if any.
    pending_capture: Mutex<Option<CaptureConfig>>,
}

impl LedgerControl {
    /// Create control state with no stop requested and nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Stop
    // -----------------------------------------------------------------------

    /// Request a clean stop. Idempotent.
    pub fn request_stop(&self) {
        if !self.stop_requested.swap(true, Ordering::AcqRel) {
            info!("Ledger stop requested");
        }
        self.stop_notify.notify_waiters();
    }

    /// Check whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Wait until a stop has been requested.
    ///
    /// Returns immediately if one already has. Cancel safe.
    pub async fn stopped(&self) {
        loop {
            // Register before checking the flag so a concurrent request
            // cannot slip between the check and the wait.
            let notified = self.stop_notify.notified();
            if self.is_stop_requested() {
                return;
            }
            notified.await;
        }
    }

    // -----------------------------------------------------------------------
    // Capture updates
    // -----------------------------------------------------------------------

    /// Queue a capture set for the next tick. A later request replaces an
    /// earlier one that has not been applied yet.
    pub async fn request_capture_update(&self, capture: CaptureConfig) {
        let mut guard = self.pending_capture.lock().await;
        *guard = Some(capture);
    }

    /// Take the queued capture set, leaving the slot empty.
    pub async fn take_capture_update(&self) -> Option<CaptureConfig> {
        self.pending_capture.lock().await.take()
    }
}
