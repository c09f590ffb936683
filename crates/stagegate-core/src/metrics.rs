//! Process-global atomic counters for pipeline activity.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (the engine does so at the end of every run).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters; no allocations, no locking.
pub struct Metrics {
    runs_finished: AtomicU64,
    stages_executed: AtomicU64,
    stages_skipped: AtomicU64,
    approvals_requested: AtomicU64,
    approvals_timed_out: AtomicU64,
    notifications_sent: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            runs_finished: AtomicU64::new(0),
            stages_executed: AtomicU64::new(0),
            stages_skipped: AtomicU64::new(0),
            approvals_requested: AtomicU64::new(0),
            approvals_timed_out: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
        }
    }

    pub fn inc_runs_finished(&self) {
        self.runs_finished.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_stages_executed(&self) {
        self.stages_executed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "stages_executed", "counter incremented");
    }

    pub fn inc_stages_skipped(&self) {
        self.stages_skipped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "stages_skipped", "counter incremented");
    }

    pub fn inc_approvals_requested(&self) {
        self.approvals_requested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_approvals_timed_out(&self) {
        self.approvals_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_notifications_sent(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            runs_finished = self.runs_finished(),
            stages_executed = self.stages_executed(),
            stages_skipped = self.stages_skipped(),
            approvals_requested = self.approvals_requested(),
            approvals_timed_out = self.approvals_timed_out(),
            notifications_sent = self.notifications_sent(),
        );
    }

    pub fn runs_finished(&self) -> u64 {
        self.runs_finished.load(Ordering::Relaxed)
    }

    pub fn stages_executed(&self) -> u64 {
        self.stages_executed.load(Ordering::Relaxed)
    }

    pub fn stages_skipped(&self) -> u64 {
        self.stages_skipped.load(Ordering::Relaxed)
    }

    pub fn approvals_requested(&self) -> u64 {
        self.approvals_requested.load(Ordering::Relaxed)
    }

    pub fn approvals_timed_out(&self) -> u64 {
        self.approvals_timed_out.load(Ordering::Relaxed)
    }

    pub fn notifications_sent(&self) -> u64 {
        self.notifications_sent.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.runs_finished.store(0, Ordering::Relaxed);
        self.stages_executed.store(0, Ordering::Relaxed);
        self.stages_skipped.store(0, Ordering::Relaxed);
        self.approvals_requested.store(0, Ordering::Relaxed);
        self.approvals_timed_out.store(0, Ordering::Relaxed);
        self.notifications_sent.store(0, Ordering::Relaxed);
    }
}
