//! Load and write counters.
//!
//! Tracks how often records come from disk versus defaults, how well load
//! dedup and the cache absorb requests, and the outcome of every write.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by [`DataManager`](crate::DataManager).
///
/// Uses atomics for lock-free access across threads.
#[derive(Debug, Default)]
pub struct DataMetrics {
    /// Loads answered from the in-memory cache
    cache_hits: AtomicU64,

    /// Loads that joined an already running load for the same key
    dedup_hits: AtomicU64,

    /// Records decoded from persisted bytes
    disk_loads: AtomicU64,

    /// Records constructed with `Default` (missing or unreadable data)
    defaults_created: AtomicU64,

    /// Persisted records that failed to read or decode
    recovered_failures: AtomicU64,

    /// Writes handed to the storage backend
    writes_launched: AtomicU64,

    /// Writes that reached storage
    writes_completed: AtomicU64,

    /// Writes that failed
    writes_failed: AtomicU64,

    /// Writes dropped because a newer snapshot of the same key landed first
    writes_superseded: AtomicU64,

    /// Completed flush cycles
    flushes: AtomicU64,
}

impl DataMetrics {
    /// Creates a new empty metrics tracker.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dedup_hit(&self) {
        self.dedup_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_disk_load(&self) {
        self.disk_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_default(&self) {
        self.defaults_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_recovered(&self) {
        self.recovered_failures.fetch_add(1, Ordering::Relaxed);
        self.defaults_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_launched(&self) {
        self.writes_launched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_completed(&self) {
        self.writes_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_failed(&self) {
        self.writes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_superseded(&self) {
        self.writes_superseded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    /// Writes launched but not yet finished.
    pub fn writes_outstanding(&self) -> u64 {
        let launched = self.writes_launched.load(Ordering::Relaxed);
        let finished = self.writes_completed.load(Ordering::Relaxed)
            + self.writes_failed.load(Ordering::Relaxed)
            + self.writes_superseded.load(Ordering::Relaxed);
        launched.saturating_sub(finished)
    }

    /// Creates a snapshot of all counters for display/logging.
    ///
    /// Note: individual fields are read atomically but the snapshot as a whole
    /// may be inconsistent if writes are finishing concurrently.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            dedup_hits: self.dedup_hits.load(Ordering::Relaxed),
            disk_loads: self.disk_loads.load(Ordering::Relaxed),
            defaults_created: self.defaults_created.load(Ordering::Relaxed),
            recovered_failures: self.recovered_failures.load(Ordering::Relaxed),
            writes_launched: self.writes_launched.load(Ordering::Relaxed),
            writes_completed: self.writes_completed.load(Ordering::Relaxed),
            writes_failed: self.writes_failed.load(Ordering::Relaxed),
            writes_superseded: self.writes_superseded.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub cache_hits: u64,
    pub dedup_hits: u64,
    pub disk_loads: u64,
    pub defaults_created: u64,
    pub recovered_failures: u64,
    pub writes_launched: u64,
    pub writes_completed: u64,
    pub writes_failed: u64,
    pub writes_superseded: u64,
    pub flushes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outstanding_writes() {
        let metrics = DataMetrics::new();
        for _ in 0..4 {
            metrics.record_write_launched();
        }
        metrics.record_write_completed();
        metrics.record_write_failed();
        metrics.record_write_superseded();
        assert_eq!(metrics.writes_outstanding(), 1);
    }

    #[test]
    fn test_recovered_counts_as_default() {
        let metrics = DataMetrics::new();
        metrics.record_recovered();
        metrics.record_default();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.recovered_failures, 1);
        assert_eq!(snapshot.defaults_created, 2);
        assert_eq!(snapshot.disk_loads, 0);
    }
}
