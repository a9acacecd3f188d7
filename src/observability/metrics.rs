//! Cache metrics registry
//!
//! Counters only, monotonic, reset on process start. Relaxed ordering: the
//! values are reported, never used for coordination.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    snapshots_created: AtomicU64,
    batches_committed: AtomicU64,
    batches_failed: AtomicU64,
    nodes_skipped: AtomicU64,
    collections: AtomicU64,
    entries_reclaimed: AtomicU64,
    rebuilds: AtomicU64,
    rebuild_failures: AtomicU64,
    reloads: AtomicU64,
    checkpoints: AtomicU64,
    journal_bytes_written: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_snapshots(&self) {
        self.snapshots_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_batches_committed(&self) {
        self.batches_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_batches_failed(&self) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_nodes_skipped(&self, count: u64) {
        self.nodes_skipped.fetch_add(count, Ordering::Relaxed);
    }

    /// Records one collection pass and what it reclaimed.
    pub fn record_collection(&self, entries_reclaimed: u64) {
        self.collections.fetch_add(1, Ordering::Relaxed);
        self.entries_reclaimed
            .fetch_add(entries_reclaimed, Ordering::Relaxed);
    }

    pub fn increment_rebuilds(&self) {
        self.rebuilds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rebuild_failures(&self) {
        self.rebuild_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_reloads(&self) {
        self.reloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_checkpoints(&self) {
        self.checkpoints.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_journal_bytes(&self, bytes: u64) {
        self.journal_bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            snapshots_created: self.snapshots_created.load(Ordering::Relaxed),
            batches_committed: self.batches_committed.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            nodes_skipped: self.nodes_skipped.load(Ordering::Relaxed),
            collections: self.collections.load(Ordering::Relaxed),
            entries_reclaimed: self.entries_reclaimed.load(Ordering::Relaxed),
            rebuilds: self.rebuilds.load(Ordering::Relaxed),
            rebuild_failures: self.rebuild_failures.load(Ordering::Relaxed),
            reloads: self.reloads.load(Ordering::Relaxed),
            checkpoints: self.checkpoints.load(Ordering::Relaxed),
            journal_bytes_written: self.journal_bytes_written.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of every counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub snapshots_created: u64,
    pub batches_committed: u64,
    pub batches_failed: u64,
    pub nodes_skipped: u64,
    pub collections: u64,
    pub entries_reclaimed: u64,
    pub rebuilds: u64,
    pub rebuild_failures: u64,
    pub reloads: u64,
    pub checkpoints: u64,
    pub journal_bytes_written: u64,
}
