//! Process-wide cancellation signal bus (component H, spec §4.8).
//!
//! Supplemented from `original_source/utils/signal_manager.py` and
//! `interrupt_handler.py`: a single flag flipped by `Ctrl-C`/`SIGTERM` and
//! polled cooperatively by the Batch Runner, not a `tokio_util::sync::
//! CancellationToken` tree, because every reader in this system wants the
//! same global answer ("are we shutting down") rather than a scoped one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct SignalBus {
    tripped: Arc<AtomicBool>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self {
            tripped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flip the bus; idempotent.
    pub fn trip(&self) {
        if !self.tripped.swap(true, Ordering::SeqCst) {
            tracing::warn!("cancellation signal received, draining in-flight work");
        }
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    /// Wire up the OS `Ctrl-C` handler to trip this bus. Spawns a detached
    /// task; safe to call once per process.
    pub fn install_ctrl_c_handler(&self) {
        let bus = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                bus.trip();
            }
        });
    }

    #[cfg(test)]
    pub fn reset(&self) {
        self.tripped.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_untripped_and_trips_once() {
        let bus = SignalBus::new();
        assert!(!bus.is_tripped());
        bus.trip();
        assert!(bus.is_tripped());
        bus.trip();
        assert!(bus.is_tripped());
    }

    #[test]
    fn clones_share_state() {
        let bus = SignalBus::new();
        let clone = bus.clone();
        clone.trip();
        assert!(bus.is_tripped());
    }
}
