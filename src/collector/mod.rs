//! Collector
//!
//! Reclaims chain entries no reader can observe any more.
//!
//! The collection floor is the oldest pinned generation, or the live
//! generation when nothing is pinned. An entry is reclaimable iff:
//! 1. It is older than the entry valid at the floor in its chain
//! 2. Or its chain holds only a tombstone at or below the floor
//!
//! A node's latest entry is never reclaimed while the node is live. Readers
//! pinned at or above the floor resolve identically before and after a
//! collection. Collection holds the writer lock, so it never interleaves
//! with a batch.

use serde::Serialize;

use crate::observability::{Event, MetricsRegistry, Timer};
use crate::store::{ContentStore, Generation};

/// Outcome of one collection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CollectReport {
    /// Node entries dropped, tombstones of removed chains included
    pub entries_reclaimed: usize,
    /// Node chains removed because the node is gone for every reader
    pub chains_removed: usize,
    pub floor: Generation,
}

pub struct Collector;

impl Collector {
    /// Runs one collection pass over `store`.
    pub fn collect(store: &ContentStore, metrics: &MetricsRegistry) -> CollectReport {
        // Pins taken after this point are at or above the floor.
        let _writer = store.lock_writer();
        let floor = store.floor();

        let timer = Timer::new();
        crate::log_event!(
            Event::CollectBegin,
            floor = floor.value(),
            live_generation = store.live_generation().value()
        );

        let stats = store.collect_below(floor);
        metrics.record_collection(stats.entries_reclaimed as u64);

        crate::log_event!(
            Event::CollectComplete,
            floor = floor.value(),
            entries_reclaimed = stats.entries_reclaimed,
            chains_removed = stats.chains_removed,
            elapsed_ms = timer.elapsed_ms()
        );

        CollectReport {
            entries_reclaimed: stats.entries_reclaimed,
            chains_removed: stats.chains_removed,
            floor,
        }
    }
}
