//! Service metrics (counters only)

use std::sync::atomic::{AtomicU64, Ordering};

/// Counter handle shared by the coordination service routes
#[derive(Debug, Default)]
pub struct Metrics {
    leases_granted: AtomicU64,
    records_exhausted: AtomicU64,
    updates_applied: AtomicU64,
    updates_rejected: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lease_granted(&self) {
        self.leases_granted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "leases_granted", "Metric incremented");
    }

    pub fn record_exhausted(&self) {
        self.records_exhausted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "records_exhausted", "Metric incremented");
    }

    pub fn update_applied(&self) {
        self.updates_applied.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "updates_applied", "Metric incremented");
    }

    pub fn update_rejected(&self) {
        self.updates_rejected.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "updates_rejected", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            leases_granted: self.leases_granted.load(Ordering::Relaxed),
            records_exhausted: self.records_exhausted.load(Ordering::Relaxed),
            updates_applied: self.updates_applied.load(Ordering::Relaxed),
            updates_rejected: self.updates_rejected.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub leases_granted: u64,
    pub records_exhausted: u64,
    pub updates_applied: u64,
    pub updates_rejected: u64,
}
