//! Cooperative cancellation
//!
//! A [`CancellationToken`] is a shared flag. Whoever owns the pipeline (the
//! CLI's signal handler, or an embedding service) flips it; the executor
//! polls it while the toolchain runs and kills the process group when set.
//!
//! The token also carries the process group of the running toolchain, so a
//! handler that cannot wait for the executor can still kill it.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    /// Process group id of the running toolchain, 0 when none
    active_group: Arc<AtomicI32>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; idempotent
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Record the process group of a toolchain that just started
    pub fn set_active_group(&self, pgid: i32) {
        self.active_group.store(pgid, Ordering::SeqCst);
    }

    pub fn clear_active_group(&self) {
        self.active_group.store(0, Ordering::SeqCst);
    }

    /// Process group of the running toolchain, if any
    pub fn active_group(&self) -> Option<i32> {
        match self.active_group.load(Ordering::SeqCst) {
            pgid if pgid > 0 => Some(pgid),
            _ => None,
        }
    }
}
