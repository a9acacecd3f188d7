//! Write coordinator
//!
//! Translates content change notifications into store writes. Each call to
//! [`WriteCoordinator::apply`] is one write batch: the affected nodes are
//! fetched from the content source, staged, journaled and committed as a
//! single new generation. Any failure discards the whole batch and the prior
//! generation stays current.
//!
//! | Change                              | Effect                                          |
//! |-------------------------------------|-------------------------------------------------|
//! | Save, Publish, Unpublish, Sort      | refetch node; absent in source removes its tree |
//! | Delete                              | remove node and descendants                     |
//! | Move, RefreshBranch                 | refetch branch; drop nodes no longer under it   |
//! | SchemaChange                        | refetch the content type and all of its nodes   |
//! | RefreshAll                          | refetch everything; drop what the source lacks  |
//!
//! The report says whether the published or the draft side of the tree
//! changed, so callers can skip invalidating what did not move.

mod journal;

pub use journal::{
    ChangeJournal, FileJournal, JournalError, JournalReplay, JournalResult, NullJournal,
};

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::codec::encode_batch;
use crate::content::{ContentNode, ContentType, NodeId, PublishState};
use crate::errors::{CacheError, CacheResult};
use crate::observability::{Event, MetricsRegistry};
use crate::source::{ContentSource, SourceError};
use crate::store::{ContentStore, Generation, StoreError, WriteBatch};

/// What happened to a node in the content source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Save,
    Publish,
    Unpublish,
    Delete,
    Move,
    Sort,
    RefreshBranch,
    SchemaChange { content_type_id: i32 },
    RefreshAll,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Save => "save",
            ChangeKind::Publish => "publish",
            ChangeKind::Unpublish => "unpublish",
            ChangeKind::Delete => "delete",
            ChangeKind::Move => "move",
            ChangeKind::Sort => "sort",
            ChangeKind::RefreshBranch => "refresh_branch",
            ChangeKind::SchemaChange { .. } => "schema_change",
            ChangeKind::RefreshAll => "refresh_all",
        }
    }
}

/// A change notification from the content source.
///
/// The culture is informational; a refetch always covers every culture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChange {
    pub node_id: NodeId,
    pub kind: ChangeKind,
    pub culture: Option<String>,
}

impl ContentChange {
    pub fn new(node_id: NodeId, kind: ChangeKind) -> Self {
        Self {
            node_id,
            kind,
            culture: None,
        }
    }

    pub fn for_culture(node_id: NodeId, kind: ChangeKind, culture: impl Into<String>) -> Self {
        Self {
            node_id,
            kind,
            culture: Some(culture.into()),
        }
    }

    /// A change that resynchronizes the whole tree. The node id is unused.
    pub fn refresh_all() -> Self {
        Self::new(NodeId::new(0), ChangeKind::RefreshAll)
    }
}

/// Outcome of one write batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct WriteReport {
    /// New generation, or the unchanged live generation if nothing committed
    pub generation: Generation,
    pub committed: bool,
    pub nodes_set: usize,
    pub nodes_removed: usize,
    /// Nodes whose parent was absent from the cache
    pub nodes_skipped: usize,
    /// Fetched nodes identical to the cached ones
    pub nodes_unchanged: usize,
    pub content_types_set: usize,
    pub content_types_removed: usize,
    /// Something readers of published content can see changed
    pub published_changed: bool,
    /// Something in the draft versions changed
    pub draft_changed: bool,
}

/// The single writer into a content store.
pub struct WriteCoordinator {
    source: Arc<dyn ContentSource>,
    journal: Arc<dyn ChangeJournal>,
    metrics: Arc<MetricsRegistry>,
}

impl WriteCoordinator {
    pub fn new(
        source: Arc<dyn ContentSource>,
        journal: Arc<dyn ChangeJournal>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            source,
            journal,
            metrics,
        }
    }

    pub fn journal(&self) -> &Arc<dyn ChangeJournal> {
        &self.journal
    }

    /// Applies `changes` to `store` as one batch.
    ///
    /// Blocks while another batch on the same store is open.
    ///
    /// # Errors
    ///
    /// `WriteBatchFailed` if the source cannot be read, a node is too large
    /// to journal, or the journal append fails. Nothing is committed in that
    /// case.
    pub fn apply(&self, store: &ContentStore, changes: &[ContentChange]) -> CacheResult<WriteReport> {
        let mut batch = store.begin_write();
        let mut report = WriteReport::default();

        for change in changes {
            if let Err(err) = self.stage(&mut batch, change, &mut report) {
                return Err(self.reject(batch.base(), err));
            }
        }

        if report.nodes_skipped > 0 {
            self.metrics.add_nodes_skipped(report.nodes_skipped as u64);
        }

        if batch.is_empty() {
            report.generation = batch.base();
            return Ok(report);
        }

        let next = batch.next_generation();
        let encoded = match encode_batch(next.value(), &batch.entries()) {
            Ok(encoded) => encoded,
            Err(e) => {
                return Err(self.reject(
                    batch.base(),
                    CacheError::write_batch_failed(format!("serialize batch: {}", e)),
                ))
            }
        };
        if let Err(e) = self.journal.append(&encoded) {
            return Err(self.reject(
                batch.base(),
                CacheError::write_batch_failed(format!("journal append: {}", e)),
            ));
        }
        self.metrics.add_journal_bytes(encoded.len() as u64);

        report.generation = batch.commit();
        report.committed = true;
        self.metrics.increment_batches_committed();

        crate::log_event!(
            Event::BatchCommitted,
            generation = report.generation.value(),
            changes = changes.len(),
            nodes_set = report.nodes_set,
            nodes_removed = report.nodes_removed,
            nodes_skipped = report.nodes_skipped,
            content_types_set = report.content_types_set,
            content_types_removed = report.content_types_removed,
            published_changed = report.published_changed,
            draft_changed = report.draft_changed
        );
        Ok(report)
    }

    fn reject(&self, base: Generation, err: CacheError) -> CacheError {
        self.metrics.increment_batches_failed();
        crate::log_event!(Event::BatchRejected, base_generation = base.value(), reason = %err);
        err
    }

    fn stage(
        &self,
        batch: &mut WriteBatch<'_>,
        change: &ContentChange,
        report: &mut WriteReport,
    ) -> CacheResult<()> {
        let id = change.node_id;
        match change.kind {
            ChangeKind::Save | ChangeKind::Publish | ChangeKind::Unpublish | ChangeKind::Sort => {
                match self.source.get(id).map_err(source_failed)? {
                    Some(node) => stage_set(batch, node, report),
                    None => stage_remove_tree(batch, id, report),
                }
            }
            ChangeKind::Delete => stage_remove_tree(batch, id, report),
            ChangeKind::Move | ChangeKind::RefreshBranch => {
                let branch = self.source.get_branch(id).map_err(source_failed)?;
                if branch.is_empty() {
                    stage_remove_tree(batch, id, report);
                    return Ok(());
                }

                let previous = batch.descendants(id);
                let fetched: HashSet<NodeId> = branch.iter().map(|n| n.id()).collect();
                for node in branch {
                    stage_set(batch, node, report);
                }
                for stale in previous.into_iter().filter(|n| !fetched.contains(n)) {
                    remove_node(batch, stale, report);
                }
            }
            ChangeKind::SchemaChange { content_type_id } => {
                match self
                    .source
                    .get_content_type(content_type_id)
                    .map_err(source_failed)?
                {
                    Some(content_type) => stage_content_type(batch, content_type, report),
                    None => {
                        if batch.remove_content_type(content_type_id) {
                            report.content_types_removed += 1;
                            report.published_changed = true;
                            report.draft_changed = true;
                        }
                    }
                }
                let nodes = self
                    .source
                    .get_by_content_type(content_type_id)
                    .map_err(source_failed)?;
                for node in nodes {
                    stage_set(batch, node, report);
                }
            }
            ChangeKind::RefreshAll => {
                let content_types = self.source.content_types().map_err(source_failed)?;
                let kept: HashSet<i32> = content_types.iter().map(|t| t.id()).collect();
                for content_type in content_types {
                    stage_content_type(batch, content_type, report);
                }
                for stale in batch.content_type_ids().into_iter().filter(|id| !kept.contains(id)) {
                    if batch.remove_content_type(stale) {
                        report.content_types_removed += 1;
                        report.published_changed = true;
                        report.draft_changed = true;
                    }
                }

                let mut fetched = HashSet::new();
                for node in self.source.stream_all().map_err(source_failed)? {
                    let node = node.map_err(source_failed)?;
                    fetched.insert(node.id());
                    stage_set(batch, node, report);
                }

                let mut cached = batch.child_ids(None);
                let mut i = 0;
                while i < cached.len() {
                    let children = batch.child_ids(Some(cached[i]));
                    cached.extend(children);
                    i += 1;
                }
                for stale in cached.into_iter().filter(|n| !fetched.contains(n)) {
                    remove_node(batch, stale, report);
                }
            }
        }
        Ok(())
    }
}

fn source_failed(err: SourceError) -> CacheError {
    CacheError::write_batch_failed(format!("content source: {}", err))
}

/// Records which side of the tree sees a node going from `old` to `new`.
fn note_change(report: &mut WriteReport, old: Option<&ContentNode>, new: Option<&ContentNode>) {
    let moved = match (old, new) {
        (Some(a), Some(b)) => {
            a.key() != b.key()
                || a.content_type_id() != b.content_type_id()
                || a.parent_id() != b.parent_id()
                || a.path() != b.path()
                || a.sort_order() != b.sort_order()
        }
        _ => false,
    };
    for state in [PublishState::Published, PublishState::Draft] {
        let before: Vec<_> = old.into_iter().flat_map(|n| n.versions_in(state)).collect();
        let after: Vec<_> = new.into_iter().flat_map(|n| n.versions_in(state)).collect();
        let visible = !before.is_empty() || !after.is_empty();
        let changed = before != after || (moved && visible);
        match state {
            PublishState::Published => report.published_changed |= changed,
            PublishState::Draft => report.draft_changed |= changed,
        }
    }
}

fn stage_content_type(
    batch: &mut WriteBatch<'_>,
    content_type: ContentType,
    report: &mut WriteReport,
) {
    if batch
        .current_content_type(content_type.id())
        .is_some_and(|cached| *cached == content_type)
    {
        return;
    }
    batch.set_content_type(Arc::new(content_type));
    report.content_types_set += 1;
    report.published_changed = true;
    report.draft_changed = true;
}

fn remove_node(batch: &mut WriteBatch<'_>, id: NodeId, report: &mut WriteReport) {
    let old = batch.current(id);
    if batch.remove(id) {
        report.nodes_removed += 1;
        note_change(report, old.as_deref(), None);
    }
}

fn stage_set(batch: &mut WriteBatch<'_>, node: ContentNode, report: &mut WriteReport) {
    let old = batch.current(node.id());
    if old.as_deref() == Some(&node) {
        report.nodes_unchanged += 1;
        return;
    }
    let node = Arc::new(node);
    match batch.set(Arc::clone(&node)) {
        Ok(()) => {
            report.nodes_set += 1;
            note_change(report, old.as_deref(), Some(node.as_ref()));
        }
        Err(StoreError::ParentNotFound { node, parent }) => {
            report.nodes_skipped += 1;
            crate::log_event!(Event::NodeSkipped, node_id = node.value(), parent_id = parent.value());
        }
        Err(other) => {
            // `set` only reports missing parents.
            report.nodes_skipped += 1;
            tracing::warn!(error = %other, "unexpected error staging node");
        }
    }
}

fn stage_remove_tree(batch: &mut WriteBatch<'_>, id: NodeId, report: &mut WriteReport) {
    let mut doomed = batch.descendants(id);
    doomed.push(id);
    for node in doomed {
        remove_node(batch, node, report);
    }
}
