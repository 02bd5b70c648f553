// Process-local dispatch counters surfaced at GET /api/v1/stats.
// Best-effort: `pending` is read from the wheel's approximate size, not
// from these counters.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct DispatchMetrics {
    dispatched_total: AtomicU64,
    succeeded_total: AtomicU64,
    failed_total: AtomicU64,
    retried_total: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub dispatched_total: u64,
    pub succeeded_total: u64,
    pub failed_total: u64,
    pub retried_total: u64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&self) {
        self.dispatched_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.succeeded_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abandoned(&self) {
        self.failed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retried(&self) {
        self.retried_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            dispatched_total: self.dispatched_total.load(Ordering::Relaxed),
            succeeded_total: self.succeeded_total.load(Ordering::Relaxed),
            failed_total: self.failed_total.load(Ordering::Relaxed),
            retried_total: self.retried_total.load(Ordering::Relaxed),
        }
    }
}
