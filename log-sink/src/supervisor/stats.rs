//! Pipeline counters shared by every worker.

use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals across the worker pool.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pulled: AtomicU64,
    submitted: AtomicU64,
    acknowledged: AtomicU64,
    failed: AtomicU64,
    reconnects: AtomicU64,
}

/// Point-in-time copy of `PipelineStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Actions pulled from the queue, redeliveries included.
    pub pulled: u64,
    /// Actions submitted to the backend.
    pub submitted: u64,
    /// Queue entries acknowledged after a successful write.
    pub acknowledged: u64,
    /// Actions left unacknowledged for redelivery.
    pub failed: u64,
    /// Worker cycles restarted after an error.
    pub reconnects: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_pulled(&self) {
        self.pulled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_submitted(&self, count: usize) {
        self.submitted.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_acknowledged(&self, count: usize) {
        self.acknowledged.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_failed(&self, count: usize) {
        self.failed.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            pulled: self.pulled.load(Ordering::Relaxed),
            submitted: self.submitted.load(Ordering::Relaxed),
            acknowledged: self.acknowledged.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = PipelineStats::new();
        stats.record_pulled();
        stats.record_pulled();
        stats.record_submitted(2);
        stats.record_acknowledged(1);
        stats.record_failed(1);
        stats.record_reconnect();

        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                pulled: 2,
                submitted: 2,
                acknowledged: 1,
                failed: 1,
                reconnects: 1,
            }
        );
    }
}
