//! Published snapshot service
//!
//! The entry point that ties the cache together. It owns the current
//! `ContentStore` behind a swappable `Arc`, routes change notifications to
//! the write coordinator, hands out snapshots, and runs collection, rebuild,
//! reload and journal checkpoints.
//!
//! A checkpoint writes the live generation to the cache file and resets the
//! journal. It runs when the journal outgrows `journal_checkpoint_bytes` and
//! after a reload that replayed journal batches, so the journal never grows
//! without bound between rebuilds.
//!
//! Lock order: `write_gate` before the store pointer. Rebuild and reload take
//! the gate only to swap; reads never take it.

mod status;

pub use status::{CacheStatus, StartupReport, VerifyReport};

use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache_file::{
    read_header, verify_cache_file, write_temp_file, CacheContents, CacheFileInfo,
};
use crate::collector::{CollectReport, Collector};
use crate::config::CacheConfig;
use crate::errors::{CacheError, CacheResult};
use crate::log_event;
use crate::observability::{Event, MetricsRegistry, MetricsSnapshot, Timer};
use crate::rebuild::{
    build_store_from_source, load_store_from_cache, CacheState, RebuildReport, ReloadReport,
    StateCell,
};
use crate::snapshot::PublishedSnapshot;
use crate::source::ContentSource;
use crate::store::{ContentStore, Generation};
use crate::writer::{ChangeJournal, ContentChange, WriteCoordinator, WriteReport};

#[derive(Debug, Default)]
struct Health {
    failure: Option<String>,
    last_rebuild: Option<DateTime<Utc>>,
    last_reload: Option<DateTime<Utc>>,
}

pub struct PublishedSnapshotService {
    config: CacheConfig,
    source: Arc<dyn ContentSource>,
    writer: WriteCoordinator,
    metrics: Arc<MetricsRegistry>,
    store: RwLock<Arc<ContentStore>>,
    state: StateCell,
    /// Serializes write batches against store swaps
    write_gate: Mutex<()>,
    /// Change batches received while a rebuild is running
    backlog: Mutex<Vec<Vec<ContentChange>>>,
    /// Highest generation ever published by any store of this service
    observed: AtomicU64,
    health: RwLock<Health>,
    collecting: Arc<AtomicBool>,
}

impl PublishedSnapshotService {
    /// Creates a service over an empty store. Call
    /// [`load_on_startup`](Self::load_on_startup) to populate it.
    pub fn new(
        config: CacheConfig,
        source: Arc<dyn ContentSource>,
        journal: Arc<dyn ChangeJournal>,
    ) -> Self {
        let metrics = Arc::new(MetricsRegistry::new());
        Self {
            writer: WriteCoordinator::new(Arc::clone(&source), journal, Arc::clone(&metrics)),
            config,
            source,
            metrics,
            store: RwLock::new(Arc::new(ContentStore::new())),
            state: StateCell::default(),
            write_gate: Mutex::new(()),
            backlog: Mutex::new(Vec::new()),
            observed: AtomicU64::new(0),
            health: RwLock::new(Health::default()),
            collecting: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// The store currently serving snapshots.
    pub fn store(&self) -> Arc<ContentStore> {
        Arc::clone(&self.store.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn swap_store(&self, store: Arc<ContentStore>) {
        self.observe(store.live_generation());
        *self.store.write().unwrap_or_else(PoisonError::into_inner) = store;
    }

    fn lock_gate(&self) -> MutexGuard<'_, ()> {
        self.write_gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_backlog(&self) -> MutexGuard<'_, Vec<Vec<ContentChange>>> {
        self.backlog.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observe(&self, generation: Generation) {
        self.observed.fetch_max(generation.value(), Ordering::AcqRel);
    }

    /// Highest generation any reader may have seen.
    fn observed_generation(&self) -> Generation {
        Generation::new(self.observed.load(Ordering::Acquire)).max(self.store().live_generation())
    }

    fn set_health(&self, update: impl FnOnce(&mut Health)) {
        update(&mut self.health.write().unwrap_or_else(PoisonError::into_inner));
    }

    // ==================
    // Reads
    // ==================

    /// Pins the live generation of the current store.
    ///
    /// May start a background collection when the live generation has run
    /// far enough ahead of the last collection floor.
    pub fn create_snapshot(&self, preview: bool) -> PublishedSnapshot {
        let store = self.store();
        let snapshot = PublishedSnapshot::new(Arc::clone(&store), preview);
        self.metrics.increment_snapshots();
        self.maybe_collect_in_background(store);
        snapshot
    }

    fn maybe_collect_in_background(&self, store: Arc<ContentStore>) {
        if !self.config.auto_collect {
            return;
        }
        let delta = store
            .live_generation()
            .value()
            .saturating_sub(store.last_floor().value());
        if delta <= self.config.collect_min_gen_delta {
            return;
        }
        // Collection is scheduled on the blocking pool; without a runtime it
        // is left to explicit `collect` calls.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        if self
            .collecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let metrics = Arc::clone(&self.metrics);
        let collecting = Arc::clone(&self.collecting);
        runtime.spawn_blocking(move || {
            Collector::collect(&store, &metrics);
            collecting.store(false, Ordering::Release);
        });
    }

    // ==================
    // Writes
    // ==================

    /// Applies one batch of change notifications.
    ///
    /// While a rebuild runs the changes are applied to the current store and
    /// also queued for replay onto the rebuilt one.
    pub fn notify(&self, changes: &[ContentChange]) -> CacheResult<WriteReport> {
        let _gate = self.lock_gate();
        if self.state.current() == CacheState::Rebuilding {
            self.lock_backlog().push(changes.to_vec());
            log_event!(Event::ChangesQueued, changes = changes.len());
        }

        let store = self.store();
        let report = self.writer.apply(&store, changes)?;
        self.observe(report.generation);

        if report.committed && self.journal_needs_checkpoint() {
            // The batch is durable in the journal; a failed checkpoint only
            // leaves the journal long.
            if let Err(err) = self.write_checkpoint() {
                log_event!(Event::CheckpointFailed, code = err.code(), reason = %err);
            }
        }
        Ok(report)
    }

    fn journal_needs_checkpoint(&self) -> bool {
        let limit = self.config.journal_checkpoint_bytes;
        limit > 0
            && !self.config.ignore_local_db
            && self.state.current() == CacheState::Idle
            && self.writer.journal().size_bytes() > limit
    }

    /// Writes the live generation to the cache file and resets the journal.
    ///
    /// # Errors
    ///
    /// - `RebuildInProgress` if a rebuild or reload is running
    /// - `CacheFileMissing` if the local cache file is disabled
    pub fn checkpoint(&self) -> CacheResult<CacheFileInfo> {
        let _gate = self.lock_gate();
        if self.state.current() != CacheState::Idle {
            return Err(CacheError::RebuildInProgress);
        }
        self.write_checkpoint()
    }

    /// Caller holds the write gate and no rebuild is writing the file.
    fn write_checkpoint(&self) -> CacheResult<CacheFileInfo> {
        let path = self.config.cache_file_path();
        if self.config.ignore_local_db {
            return Err(CacheError::CacheFileMissing {
                path: path.display().to_string(),
            });
        }

        let store = self.store();
        let generation = store.live_generation();
        let journal_bytes = self.writer.journal().size_bytes();
        let info = write_temp_file(&path, generation, &CacheContents::of(&store, generation))?
            .commit()?;
        // Every journaled batch is at or below `generation`, so all of it is
        // in the file now.
        self.writer
            .journal()
            .reset()
            .map_err(|e| CacheError::io("reset journal", e))?;

        self.metrics.increment_checkpoints();
        log_event!(
            Event::CheckpointWritten,
            generation = info.generation,
            nodes = info.node_count,
            journal_bytes,
            checksum = %info.checksum
        );
        Ok(info)
    }

    // ==================
    // Maintenance
    // ==================

    /// Runs one collection pass on the current store.
    pub fn collect(&self) -> CollectReport {
        Collector::collect(&self.store(), &self.metrics)
    }

    /// Reports the cache's state. Never waits on a rebuild.
    pub fn status(&self) -> CacheStatus {
        let store = self.store();
        let live = store.live_generation();
        let health = self.health.read().unwrap_or_else(PoisonError::into_inner);

        CacheStatus {
            generation_count: store.registry().pinned_generations(),
            snapshot_count: store.registry().pin_count(),
            live_generation: live,
            last_floor: store.last_floor(),
            node_count: store.node_count(live),
            entry_count: store.entry_count(),
            last_rebuild: health.last_rebuild,
            last_reload: health.last_reload,
            state: self.state.current(),
            is_healthy: health.failure.is_none(),
            reason: health.failure.clone(),
        }
    }

    /// Checks the in-memory store and the cache file. Mutates nothing.
    pub fn verify(&self) -> VerifyReport {
        let timer = Timer::new();
        log_event!(Event::VerifyBegin);

        let store = self.store();
        let live = store.live_generation();
        let store_problems = store.check_consistency();

        let (cache_file, cache_file_error) = if self.config.ignore_local_db {
            (None, None)
        } else {
            match verify_cache_file(&self.config.cache_file_path()) {
                Ok(info) => (Some(info), None),
                Err(e) => (None, Some(format!("{}: {}", e.code(), e))),
            }
        };

        let is_consistent = store_problems.is_empty() && cache_file_error.is_none();
        log_event!(
            Event::VerifyComplete,
            consistent = is_consistent,
            store_problems = store_problems.len(),
            elapsed_ms = timer.elapsed_ms()
        );

        VerifyReport {
            live_generation: live,
            node_count: store.node_count(live),
            store_problems,
            cache_file,
            cache_file_error,
            is_consistent,
        }
    }

    // ==================
    // Rebuild and reload
    // ==================

    /// Rebuilds the cache from the content source and swaps it in.
    ///
    /// # Errors
    ///
    /// - `RebuildInProgress` if a rebuild or reload is running
    /// - `RebuildCancelled` if `cancel` fired; nothing changes
    /// - `RebuildFailed` otherwise; the previous store stays live and the
    ///   service reports unhealthy
    pub fn rebuild_db_cache(&self, cancel: &CancellationToken) -> CacheResult<RebuildReport> {
        let timer = Timer::new();
        let _state = {
            let _gate = self.lock_gate();
            self.state.enter(CacheState::Rebuilding)?
        };

        log_event!(
            Event::RebuildBegin,
            base_generation = self.observed_generation().value(),
            group_size = self.config.rebuild_group_size
        );

        let result = self.run_rebuild(cancel, &timer);
        // Queued changes were either replayed or belong to a store that
        // stays live; either way they are done.
        self.lock_backlog().clear();

        match result {
            Ok(report) => {
                self.metrics.increment_rebuilds();
                self.set_health(|h| {
                    h.failure = None;
                    h.last_rebuild = Some(Utc::now());
                });
                log_event!(
                    Event::RebuildComplete,
                    generation = report.generation.value(),
                    nodes = report.node_count,
                    skipped = report.nodes_skipped,
                    replayed_changes = report.replayed_changes,
                    elapsed_ms = report.elapsed_ms
                );
                Ok(report)
            }
            Err(CacheError::RebuildCancelled) => {
                log_event!(Event::RebuildCancelled, elapsed_ms = timer.elapsed_ms());
                Err(CacheError::RebuildCancelled)
            }
            Err(err) => {
                let err = match err {
                    CacheError::RebuildFailed { .. } => err,
                    other => CacheError::rebuild_failed(other),
                };
                self.metrics.increment_rebuild_failures();
                self.set_health(|h| h.failure = Some(err.to_string()));
                log_event!(Event::RebuildFailed, reason = %err);
                Err(err)
            }
        }
    }

    fn run_rebuild(&self, cancel: &CancellationToken, timer: &Timer) -> CacheResult<RebuildReport> {
        let build = build_store_from_source(
            &*self.source,
            self.observed_generation(),
            self.config.rebuild_group_size,
            cancel,
        )?;
        let store = Arc::new(build.store);

        let pending = if self.config.ignore_local_db {
            None
        } else {
            let generation = store.live_generation();
            let contents = CacheContents::of(&store, generation);
            Some(
                write_temp_file(&self.config.cache_file_path(), generation, &contents)
                    .map_err(|e| CacheError::rebuild_failed(format!("write cache file: {}", e)))?,
            )
        };
        if cancel.is_cancelled() {
            return Err(CacheError::RebuildCancelled);
        }

        let _gate = self.lock_gate();
        let cache_file = match pending {
            Some(pending) => {
                let info = pending.commit()?;
                log_event!(
                    Event::CacheFileWritten,
                    path = %info.path,
                    generation = info.generation,
                    nodes = info.node_count,
                    checksum = %info.checksum
                );
                Some(info)
            }
            None => None,
        };
        self.writer
            .journal()
            .reset()
            .map_err(|e| CacheError::io("reset journal", e))?;

        // Writes committed to the old store while this rebuild ran may have
        // been observed; the new store must start above them.
        let observed = self.observed_generation();
        if store.live_generation() <= observed {
            store
                .begin_write()
                .commit_as(observed.next())
                .map_err(CacheError::rebuild_failed)?;
        }

        let backlog = mem::take(&mut *self.lock_backlog());
        for changes in &backlog {
            self.writer.apply(&store, changes)?;
        }

        let generation = store.live_generation();
        let node_count = store.node_count(generation);
        self.swap_store(store);

        Ok(RebuildReport {
            generation,
            node_count,
            nodes_skipped: build.nodes_skipped,
            replayed_changes: backlog.len(),
            cache_file,
            elapsed_ms: timer.elapsed_ms(),
        })
    }

    /// Runs [`rebuild_db_cache`](Self::rebuild_db_cache) on the Tokio
    /// blocking pool.
    pub fn rebuild_db_cache_in_background(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> JoinHandle<CacheResult<RebuildReport>> {
        let service = Arc::clone(self);
        tokio::task::spawn_blocking(move || service.rebuild_db_cache(&cancel))
    }

    /// Replaces the current store with the cache file plus journal.
    ///
    /// Change notifications wait until the reload finishes.
    pub fn reload_cache(&self) -> CacheResult<ReloadReport> {
        let _gate = self.lock_gate();
        let _state = self.state.enter(CacheState::Reloading)?;
        let path = self.config.cache_file_path();
        log_event!(Event::ReloadBegin, path = %path.display());

        if self.config.ignore_local_db {
            return Err(CacheError::CacheFileMissing {
                path: path.display().to_string(),
            });
        }

        match load_store_from_cache(&path, &**self.writer.journal(), self.observed_generation()) {
            Ok(load) => {
                self.swap_store(Arc::new(load.store));
                self.metrics.increment_reloads();
                self.set_health(|h| {
                    h.failure = None;
                    h.last_reload = Some(Utc::now());
                });
                let mut report = load.report;
                if report.journal_batches > 0 || report.journal_torn_tail {
                    match self.write_checkpoint() {
                        Ok(info) => report.checkpoint = Some(info),
                        Err(err) => {
                            log_event!(Event::CheckpointFailed, code = err.code(), reason = %err)
                        }
                    }
                }
                log_event!(
                    Event::ReloadComplete,
                    generation = report.generation.value(),
                    file_generation = report.file_generation,
                    nodes = report.node_count,
                    journal_batches = report.journal_batches,
                    checkpointed = report.checkpoint.is_some(),
                    elapsed_ms = report.elapsed_ms
                );
                Ok(report)
            }
            Err(err) => {
                let event = match err {
                    CacheError::CorruptCacheFile { .. } => Event::CacheFileCorrupt,
                    CacheError::SchemaMismatch { .. } => Event::CacheSchemaMismatch,
                    _ => Event::ReloadFailed,
                };
                log_event!(event, code = err.code(), reason = %err);
                Err(err)
            }
        }
    }

    /// Brings the cache up: reload from the local cache file, falling back
    /// to a full rebuild when the file is missing, corrupt, or written by
    /// another schema.
    pub fn load_on_startup(&self) -> CacheResult<StartupReport> {
        let timer = Timer::new();
        log_event!(Event::StartupBegin, ignore_local_db = self.config.ignore_local_db);

        let report = if self.config.ignore_local_db {
            let report = self.rebuild_db_cache(&CancellationToken::new())?;
            StartupReport::Rebuilt {
                reason: "local cache file disabled".to_string(),
                report,
            }
        } else {
            match self.reload_cache() {
                Ok(report) => StartupReport::Reloaded(report),
                Err(err) if err.requires_rebuild() => {
                    // The rebuilt store must start above anything the
                    // unreadable file was at.
                    if let Ok(header) = read_header(&self.config.cache_file_path()) {
                        self.observe(Generation::new(header.generation));
                    }
                    let report = self.rebuild_db_cache(&CancellationToken::new())?;
                    StartupReport::Rebuilt {
                        reason: err.to_string(),
                        report,
                    }
                }
                Err(err) => return Err(err),
            }
        };

        log_event!(
            Event::StartupComplete,
            generation = report.generation().value(),
            rebuilt = report.was_rebuilt(),
            elapsed_ms = timer.elapsed_ms()
        );
        Ok(report)
    }
}
