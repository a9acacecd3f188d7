//! Rebuild and reload
//!
//! Both produce a complete, fresh `ContentStore` off to the side; the
//! service swaps it in once it is fully built. A failed or cancelled build
//! never touches the live store.
//!
//! # Rebuild sequence
//!
//! 1. Load the content types, then stream every node from the content source
//!    into a fresh store, checking for cancellation between groups of nodes
//! 2. Commit everything as one generation above every generation observed
//! 3. Write the new cache file to a temp file
//! 4. Rename it over the old cache file, reset the journal
//! 5. Replay changes queued during the rebuild, swap the store
//!
//! # Reload sequence
//!
//! 1. Read and validate the cache file
//! 2. Replay journal batches newer than the file; a journal that fails its
//!    checks anywhere but a torn final batch makes the load `CorruptCacheFile`
//! 3. Commit everything as one generation above every generation observed
//! 4. Swap the store

use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::cache_file::{read_cache_file, CacheFileInfo};
use crate::codec::BatchEntry;
use crate::content::ContentNode;
use crate::errors::{CacheError, CacheResult};
use crate::observability::{Event, ObservationScope, Timer};
use crate::source::ContentSource;
use crate::store::{ContentStore, Generation, StoreError, WriteBatch};
use crate::writer::{ChangeJournal, JournalError};

/// What the cache is doing besides serving reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheState {
    Idle,
    Rebuilding,
    Reloading,
}

impl CacheState {
    fn as_u8(self) -> u8 {
        match self {
            CacheState::Idle => 0,
            CacheState::Rebuilding => 1,
            CacheState::Reloading => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => CacheState::Rebuilding,
            2 => CacheState::Reloading,
            _ => CacheState::Idle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheState::Idle => "idle",
            CacheState::Rebuilding => "rebuilding",
            CacheState::Reloading => "reloading",
        }
    }
}

/// Lock-free holder of the current `CacheState`.
#[derive(Debug, Default)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn current(&self) -> CacheState {
        CacheState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves from `Idle` to `state`. Fails if a rebuild or reload is running.
    pub(crate) fn enter(&self, state: CacheState) -> CacheResult<StateGuard<'_>> {
        self.0
            .compare_exchange(
                CacheState::Idle.as_u8(),
                state.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| CacheError::RebuildInProgress)?;
        Ok(StateGuard { cell: self })
    }
}

/// Returns the state to `Idle` when dropped.
pub(crate) struct StateGuard<'a> {
    cell: &'a StateCell,
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        self.cell.0.store(CacheState::Idle.as_u8(), Ordering::Release);
    }
}

/// Outcome of a successful rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub generation: Generation,
    pub node_count: usize,
    /// Nodes dropped because their parent was missing from the source
    pub nodes_skipped: usize,
    /// Change batches queued during the rebuild and replayed onto it
    pub replayed_changes: usize,
    /// None when the local cache file is disabled
    pub cache_file: Option<CacheFileInfo>,
    pub elapsed_ms: u64,
}

/// Outcome of a successful reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReloadReport {
    pub generation: Generation,
    pub node_count: usize,
    /// Generation recorded in the cache file
    pub file_generation: u64,
    pub journal_batches: usize,
    pub journal_torn_tail: bool,
    pub cache_file: CacheFileInfo,
    /// Cache file rewritten after replaying the journal, if any
    pub checkpoint: Option<CacheFileInfo>,
    pub elapsed_ms: u64,
}

/// A store built from the content source, not yet published.
pub struct SourceBuild {
    pub store: ContentStore,
    pub node_count: usize,
    pub nodes_skipped: usize,
}

/// Loads every node of `source` into a fresh store.
///
/// The store is committed as `base + 1`, so that a swap never moves the
/// live generation backwards. Cancellation is checked before each group of
/// `group_size` nodes.
pub fn build_store_from_source(
    source: &dyn ContentSource,
    base: Generation,
    group_size: usize,
    cancel: &CancellationToken,
) -> CacheResult<SourceBuild> {
    let store = ContentStore::starting_at(base);
    let group_size = group_size.max(1);

    let span = tracing::info_span!(
        "source_load",
        base = base.value(),
        content_types = tracing::field::Empty,
        nodes = tracing::field::Empty,
        skipped = tracing::field::Empty
    );
    let scope = ObservationScope::in_span("CACHE_SOURCE_LOAD", span);
    let result = (|| -> CacheResult<usize> {
        let mut batch = store.begin_write();
        let mut skipped = 0usize;
        let content_types = source.content_types().map_err(CacheError::rebuild_failed)?;
        scope.span().record("content_types", content_types.len() as u64);
        for content_type in content_types {
            batch.set_content_type(Arc::new(content_type));
        }
        let stream = source.stream_all().map_err(CacheError::rebuild_failed)?;

        for (i, node) in stream.enumerate() {
            if i % group_size == 0 && cancel.is_cancelled() {
                return Err(CacheError::RebuildCancelled);
            }
            let node = node.map_err(CacheError::rebuild_failed)?;
            if !stage_loaded(&mut batch, Arc::new(node)) {
                skipped += 1;
            }
        }
        if cancel.is_cancelled() {
            return Err(CacheError::RebuildCancelled);
        }

        batch
            .commit_as(base.next())
            .map_err(CacheError::rebuild_failed)?;
        Ok(skipped)
    })();

    match result {
        Ok(nodes_skipped) => {
            let node_count = store.node_count(store.live_generation());
            scope.span().record("nodes", node_count as u64);
            scope.span().record("skipped", nodes_skipped as u64);
            scope.complete();
            Ok(SourceBuild {
                store,
                node_count,
                nodes_skipped,
            })
        }
        Err(err) => {
            scope.fail(&err.to_string());
            Err(err)
        }
    }
}

/// Stages a node read from the source or a cache file. Returns false if it
/// was skipped for a missing parent.
fn stage_loaded(batch: &mut WriteBatch<'_>, node: Arc<ContentNode>) -> bool {
    match batch.set(node) {
        Ok(()) => true,
        Err(StoreError::ParentNotFound { node, parent }) => {
            crate::log_event!(Event::NodeSkipped, node_id = node.value(), parent_id = parent.value());
            false
        }
        Err(_) => false,
    }
}

/// A store loaded from the cache file and journal, not yet published.
pub struct CacheLoad {
    pub store: ContentStore,
    pub report: ReloadReport,
}

/// Loads the cache file at `path` plus newer journal batches into a fresh
/// store committed above `observed`.
///
/// # Errors
///
/// - `SchemaMismatch` if the file was written by another schema
/// - `CorruptCacheFile` if any check of the file or the journal fails
/// - `CacheFileMissing` if there is no file
pub fn load_store_from_cache(
    path: &Path,
    journal: &dyn ChangeJournal,
    observed: Generation,
) -> CacheResult<CacheLoad> {
    let timer = Timer::new();
    let loaded = read_cache_file(path)?;
    let replay = journal.replay().map_err(|e| match e {
        JournalError::Corrupt { .. } => CacheError::CorruptCacheFile {
            reason: format!("journal: {}", e),
        },
        JournalError::Io(err) => CacheError::io("replay journal", err),
    })?;

    let file_generation = loaded.header.generation;
    let store = ContentStore::new();
    let mut journal_batches = 0usize;
    let mut last = Generation::new(file_generation);
    {
        let mut batch = store.begin_write();
        for content_type in loaded.content_types {
            batch.set_content_type(Arc::new(content_type));
        }
        for node in loaded.nodes {
            stage_loaded(&mut batch, Arc::new(node));
        }

        for journaled in replay.batches {
            // Batches at or below the file generation are already in it.
            if journaled.generation <= file_generation {
                continue;
            }
            journal_batches += 1;
            last = last.max(Generation::new(journaled.generation));
            for entry in journaled.entries {
                match entry {
                    BatchEntry::Set(node) => {
                        stage_loaded(&mut batch, node);
                    }
                    BatchEntry::Remove(id) => {
                        batch.remove(id);
                    }
                    BatchEntry::SetContentType(content_type) => {
                        batch.set_content_type(content_type);
                    }
                    BatchEntry::RemoveContentType(id) => {
                        batch.remove_content_type(id);
                    }
                }
            }
        }

        let target = last.max(observed.next());
        batch.commit_as(target).map_err(|e| CacheError::CorruptCacheFile {
            reason: e.to_string(),
        })?;
    }

    if journal_batches > 0 || replay.torn_tail {
        crate::log_event!(
            Event::JournalReplayed,
            batches = journal_batches,
            torn_tail = replay.torn_tail
        );
    }

    let generation = store.live_generation();
    let report = ReloadReport {
        generation,
        node_count: store.node_count(generation),
        file_generation,
        journal_batches,
        journal_torn_tail: replay.torn_tail,
        cache_file: loaded.info,
        checkpoint: None,
        elapsed_ms: timer.elapsed_ms(),
    };
    Ok(CacheLoad { store, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use uuid::Uuid;

    use std::fs;

    use crate::cache_file::{write_cache_file, CacheContents};
    use crate::codec::encode_batch;
    use crate::content::{ContentType, NodeId};
    use crate::source::MemoryContentSource;
    use crate::writer::{FileJournal, NullJournal};

    fn node(id: i32, parent: Option<i32>) -> ContentNode {
        let mut builder = ContentNode::builder(NodeId::new(id), Uuid::from_u128(id as u128), 1);
        if let Some(parent) = parent {
            builder = builder.parent(NodeId::new(parent), vec![NodeId::new(parent)]);
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_state_cell_rejects_second_entry() {
        let cell = StateCell::default();
        let guard = cell.enter(CacheState::Rebuilding).unwrap();
        assert_eq!(cell.current(), CacheState::Rebuilding);
        assert_eq!(
            cell.enter(CacheState::Reloading).err(),
            Some(CacheError::RebuildInProgress)
        );
        drop(guard);
        assert_eq!(cell.current(), CacheState::Idle);
    }

    #[test]
    fn test_build_from_source_commits_above_base() {
        let source = MemoryContentSource::from_nodes([node(1, None), node(2, Some(1)), node(3, Some(9))]);
        let build = build_store_from_source(&source, Generation::new(10), 1, &CancellationToken::new()).unwrap();

        assert_eq!(build.store.live_generation(), Generation::new(11));
        assert_eq!(build.node_count, 2);
        assert_eq!(build.nodes_skipped, 1);
    }

    #[test]
    fn test_cancelled_build_returns_cancelled() {
        let source = MemoryContentSource::from_nodes([node(1, None)]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = build_store_from_source(&source, Generation::ZERO, 1000, &cancel);
        assert_eq!(result.err(), Some(CacheError::RebuildCancelled));
    }

    #[test]
    fn test_load_applies_newer_journal_batches() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.db");
        write_cache_file(
            &path,
            Generation::new(5),
            &CacheContents::from_nodes(vec![Arc::new(node(1, None)), Arc::new(node(2, Some(1)))]),
        )
        .unwrap();

        let journal = FileJournal::open(&dir.path().join("journal")).unwrap();
        // Already contained in the file.
        journal
            .append(&encode_batch(5, &[BatchEntry::Remove(NodeId::new(1))]).unwrap())
            .unwrap();
        journal
            .append(&encode_batch(6, &[BatchEntry::Set(Arc::new(node(3, Some(1))))]).unwrap())
            .unwrap();
        journal
            .append(&encode_batch(7, &[BatchEntry::Remove(NodeId::new(2))]).unwrap())
            .unwrap();

        let load = load_store_from_cache(&path, &journal, Generation::new(3)).unwrap();
        let live = load.store.live_generation();
        assert_eq!(live, Generation::new(7));
        assert_eq!(load.report.journal_batches, 2);
        assert!(load.store.get(NodeId::new(1), live).is_some());
        assert!(load.store.get(NodeId::new(2), live).is_none());
        assert!(load.store.get(NodeId::new(3), live).is_some());
    }

    #[test]
    fn test_load_stays_above_observed_generation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.db");
        write_cache_file(
            &path,
            Generation::new(5),
            &CacheContents::from_nodes(vec![Arc::new(node(1, None))]),
        )
        .unwrap();

        let load = load_store_from_cache(&path, &NullJournal, Generation::new(40)).unwrap();
        assert_eq!(load.store.live_generation(), Generation::new(41));
        assert_eq!(load.report.file_generation, 5);
    }

    #[test]
    fn test_load_missing_file_requires_rebuild() {
        let dir = TempDir::new().unwrap();
        let err = load_store_from_cache(&dir.path().join("absent"), &NullJournal, Generation::ZERO)
            .err()
            .unwrap();
        assert!(err.requires_rebuild());
    }

    #[test]
    fn test_build_from_source_loads_content_types() {
        let source = MemoryContentSource::from_nodes([node(1, None)]);
        source.upsert_content_type(ContentType::new(1, Uuid::from_u128(100), "page"));
        let build = build_store_from_source(&source, Generation::ZERO, 10, &CancellationToken::new()).unwrap();

        let live = build.store.live_generation();
        assert_eq!(build.store.get_content_type(1, live).unwrap().alias(), "page");
        assert_eq!(build.store.content_types(live).len(), 1);
    }

    #[test]
    fn test_load_replays_content_type_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.db");
        let contents = CacheContents {
            content_types: vec![
                Arc::new(ContentType::new(1, Uuid::from_u128(100), "page")),
                Arc::new(ContentType::new(2, Uuid::from_u128(200), "blog")),
            ],
            nodes: vec![Arc::new(node(1, None))],
        };
        write_cache_file(&path, Generation::new(5), &contents).unwrap();

        let journal = FileJournal::open(&dir.path().join("journal")).unwrap();
        let renamed = ContentType::new(1, Uuid::from_u128(100), "landingPage");
        journal
            .append(
                &encode_batch(
                    6,
                    &[
                        BatchEntry::SetContentType(Arc::new(renamed)),
                        BatchEntry::RemoveContentType(2),
                    ],
                )
                .unwrap(),
            )
            .unwrap();

        let load = load_store_from_cache(&path, &journal, Generation::ZERO).unwrap();
        let live = load.store.live_generation();
        assert_eq!(load.store.get_content_type(1, live).unwrap().alias(), "landingPage");
        assert!(load.store.get_content_type(2, live).is_none());
    }

    #[test]
    fn test_corrupt_journal_batch_makes_load_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.db");
        write_cache_file(
            &path,
            Generation::new(5),
            &CacheContents::from_nodes(vec![Arc::new(node(1, None))]),
        )
        .unwrap();

        let journal_path = dir.path().join("journal");
        let journal = FileJournal::open(&journal_path).unwrap();
        let first = encode_batch(6, &[BatchEntry::Set(Arc::new(node(2, Some(1))))]).unwrap();
        journal.append(&first).unwrap();
        journal
            .append(&encode_batch(7, &[BatchEntry::Remove(NodeId::new(2))]).unwrap())
            .unwrap();
        drop(journal);

        let mut data = fs::read(&journal_path).unwrap();
        data[first.len() / 2] ^= 0x10;
        fs::write(&journal_path, &data).unwrap();

        let journal = FileJournal::open(&journal_path).unwrap();
        let err = load_store_from_cache(&path, &journal, Generation::ZERO)
            .err()
            .unwrap();
        assert!(matches!(err, CacheError::CorruptCacheFile { .. }), "{:?}", err);
        assert!(err.requires_rebuild());
        assert_eq!(fs::read(&journal_path).unwrap(), data);
    }
}
