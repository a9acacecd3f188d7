//! ContentStore - Generation-tagged table of content nodes
//!
//! Each node id maps to a version chain of `Arc<ContentNode>` entries and
//! each parent (roots under `None`) to a chain of ordered child-id lists.
//! Node keys and content types are versioned the same way, so a reader
//! pinned at an old generation resolves keys and types as they were then.
//! Readers take the tables read lock only long enough to clone `Arc`s out.
//! The single writer stages a batch outside the lock, pushes every entry
//! under one write lock and only then publishes the new live generation, so
//! a generation becomes visible all at once.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use super::chain::VersionChain;
use super::registry::{GenerationPin, GenerationRegistry};
use super::write_batch::WriteBatch;
use super::{Generation, StoreResult};
use crate::content::{ContentNode, ContentType, NodeId};

pub(crate) type ChildList = Vec<NodeId>;

#[derive(Debug, Default)]
pub(crate) struct Tables {
    pub(crate) nodes: HashMap<NodeId, VersionChain<ContentNode>>,
    pub(crate) children: HashMap<Option<NodeId>, VersionChain<ChildList>>,
    pub(crate) keys: HashMap<Uuid, VersionChain<NodeId>>,
    pub(crate) content_types: HashMap<i32, VersionChain<ContentType>>,
}

impl Tables {
    pub(crate) fn node_at(&self, id: NodeId, generation: Generation) -> Option<Arc<ContentNode>> {
        self.nodes
            .get(&id)
            .and_then(|c| c.value_at(generation))
            .cloned()
    }

    pub(crate) fn key_at(&self, key: Uuid, generation: Generation) -> Option<NodeId> {
        self.keys
            .get(&key)
            .and_then(|c| c.value_at(generation))
            .map(|id| **id)
    }

    pub(crate) fn content_type_at(&self, id: i32, generation: Generation) -> Option<Arc<ContentType>> {
        self.content_types
            .get(&id)
            .and_then(|c| c.value_at(generation))
            .cloned()
    }

    pub(crate) fn child_ids_at(&self, parent: Option<NodeId>, generation: Generation) -> &[NodeId] {
        self.children
            .get(&parent)
            .and_then(|c| c.value_at(generation))
            .map(|list| list.as_slice())
            .unwrap_or(&[])
    }
}

/// Entries removed by one collection pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectStats {
    pub entries_reclaimed: usize,
    pub chains_removed: usize,
}

#[derive(Debug)]
pub struct ContentStore {
    tables: RwLock<Tables>,
    live_gen: AtomicU64,
    write_lock: Mutex<()>,
    registry: Arc<GenerationRegistry>,
    last_floor: AtomicU64,
}

impl Default for ContentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentStore {
    pub fn new() -> Self {
        Self::starting_at(Generation::ZERO)
    }

    /// Creates an empty store whose first commit will be `base.next()`.
    pub fn starting_at(base: Generation) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            live_gen: AtomicU64::new(base.value()),
            write_lock: Mutex::new(()),
            registry: Arc::new(GenerationRegistry::new()),
            last_floor: AtomicU64::new(base.value()),
        }
    }

    pub(crate) fn read_tables(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write_tables(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquires the single-writer lock.
    pub(crate) fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn publish(&self, generation: Generation) {
        self.live_gen.store(generation.value(), Ordering::Release);
    }

    /// The most recently committed generation.
    #[inline]
    pub fn live_generation(&self) -> Generation {
        Generation::new(self.live_gen.load(Ordering::Acquire))
    }

    /// Pins the live generation for a reader.
    pub fn pin_live(&self) -> GenerationPin {
        self.registry.pin_with(|| self.live_generation())
    }

    /// Current collection floor.
    pub fn floor(&self) -> Generation {
        self.registry.floor(|| self.live_generation())
    }

    pub fn registry(&self) -> &GenerationRegistry {
        &self.registry
    }

    /// Floor used by the most recent collection.
    pub fn last_floor(&self) -> Generation {
        Generation::new(self.last_floor.load(Ordering::Acquire))
    }

    /// Node at `generation`, including nodes with only draft versions.
    pub fn get(&self, id: NodeId, generation: Generation) -> Option<Arc<ContentNode>> {
        self.read_tables().node_at(id, generation)
    }

    /// Published node at `generation`.
    pub fn get_current(&self, id: NodeId, generation: Generation) -> Option<Arc<ContentNode>> {
        self.get(id, generation).filter(|n| n.is_published())
    }

    pub fn get_by_key(&self, key: Uuid, generation: Generation) -> Option<Arc<ContentNode>> {
        let tables = self.read_tables();
        let id = tables.key_at(key, generation)?;
        tables
            .node_at(id, generation)
            .filter(|node| node.key() == key)
    }

    pub fn get_content_type(&self, id: i32, generation: Generation) -> Option<Arc<ContentType>> {
        self.read_tables().content_type_at(id, generation)
    }

    /// Content type whose alias matches `alias`, ignoring case.
    pub fn get_content_type_by_alias(&self, alias: &str, generation: Generation) -> Option<Arc<ContentType>> {
        self.find_content_type(generation, |ty| ty.alias_matches(alias))
    }

    pub fn get_content_type_by_key(&self, key: Uuid, generation: Generation) -> Option<Arc<ContentType>> {
        self.find_content_type(generation, |ty| ty.key() == key)
    }

    fn find_content_type(
        &self,
        generation: Generation,
        matches: impl Fn(&ContentType) -> bool,
    ) -> Option<Arc<ContentType>> {
        self.read_tables()
            .content_types
            .values()
            .filter_map(|c| c.value_at(generation))
            .find(|ty| matches(ty.as_ref()))
            .cloned()
    }

    /// Every content type at `generation`, by id.
    pub fn content_types(&self, generation: Generation) -> Vec<Arc<ContentType>> {
        let tables = self.read_tables();
        let mut types: Vec<Arc<ContentType>> = tables
            .content_types
            .values()
            .filter_map(|c| c.value_at(generation))
            .cloned()
            .collect();
        types.sort_unstable_by_key(|ty| ty.id());
        types
    }

    /// Children of `parent` at `generation`, ordered by sort order then id.
    pub fn children(&self, parent: Option<NodeId>, generation: Generation) -> Vec<Arc<ContentNode>> {
        let tables = self.read_tables();
        tables
            .child_ids_at(parent, generation)
            .iter()
            .filter_map(|id| tables.node_at(*id, generation))
            .collect()
    }

    pub fn roots(&self, generation: Generation) -> Vec<Arc<ContentNode>> {
        self.children(None, generation)
    }

    /// Every node at `generation`, parents before children.
    pub fn all(&self, generation: Generation) -> Vec<Arc<ContentNode>> {
        let tables = self.read_tables();
        let mut out = Vec::new();
        let mut queue: VecDeque<Option<NodeId>> = VecDeque::from([None]);

        while let Some(parent) = queue.pop_front() {
            for id in tables.child_ids_at(parent, generation) {
                if let Some(node) = tables.node_at(*id, generation) {
                    queue.push_back(Some(node.id()));
                    out.push(node);
                }
            }
        }
        out
    }

    pub fn node_count(&self, generation: Generation) -> usize {
        self.read_tables()
            .nodes
            .values()
            .filter(|c| c.value_at(generation).is_some())
            .count()
    }

    /// Total node entries across every chain, tombstones included.
    pub fn entry_count(&self) -> usize {
        self.read_tables().nodes.values().map(VersionChain::len).sum()
    }

    /// Opens a write batch, blocking while another batch is open.
    pub fn begin_write(&self) -> WriteBatch<'_> {
        WriteBatch::new(self, self.lock_writer())
    }

    /// Sets a single node as its own generation.
    pub fn append(&self, node: ContentNode) -> StoreResult<Generation> {
        let mut batch = self.begin_write();
        batch.set(Arc::new(node))?;
        Ok(batch.commit())
    }

    /// Removes a single node as its own generation.
    ///
    /// Descendants are not touched; callers that remove a subtree stage
    /// every descendant in one batch.
    pub fn tombstone(&self, id: NodeId) -> Generation {
        let mut batch = self.begin_write();
        batch.remove(id);
        batch.commit()
    }

    /// Drops history no reader at or above `floor` can observe.
    ///
    /// The caller holds the writer lock.
    pub(crate) fn collect_below(&self, floor: Generation) -> CollectStats {
        let mut stats = CollectStats::default();
        let mut tables = self.write_tables();

        let mut dead = Vec::new();
        for (id, chain) in tables.nodes.iter_mut() {
            stats.entries_reclaimed += chain.collect(floor);
            if chain.is_dead(floor) {
                dead.push(*id);
            }
        }
        for id in &dead {
            tables.nodes.remove(id);
            stats.entries_reclaimed += 1;
            stats.chains_removed += 1;
        }

        collect_side_table(&mut tables.children, floor);
        collect_side_table(&mut tables.keys, floor);
        collect_side_table(&mut tables.content_types, floor);

        self.last_floor.fetch_max(floor.value(), Ordering::AcqRel);
        stats
    }

    /// Checks structural invariants at the live generation.
    ///
    /// Returns one line per problem; empty means consistent.
    pub fn check_consistency(&self) -> Vec<String> {
        let generation = self.live_generation();
        let tables = self.read_tables();
        let mut problems = Vec::new();

        for (id, chain) in &tables.nodes {
            if !chain.is_ordered() {
                problems.push(format!("node {}: chain generations out of order", id));
            }
            if chain.latest().map_or(false, |e| e.generation > generation) {
                problems.push(format!("node {}: entry above live generation {}", id, generation));
            }
            let Some(node) = chain.value_at(generation) else {
                continue;
            };
            if node.id() != *id {
                problems.push(format!("node {}: stored under wrong id {}", node.id(), id));
            }
            if tables.key_at(node.key(), generation) != Some(*id) {
                problems.push(format!("node {}: key {} not mapped", id, node.key()));
            }
            if let Some(parent) = node.parent_id() {
                if tables.node_at(parent, generation).is_none() {
                    problems.push(format!("node {}: parent {} missing", id, parent));
                }
            }
            if !tables.child_ids_at(node.parent_id(), generation).contains(id) {
                problems.push(format!("node {}: missing from parent child list", id));
            }
        }

        for (key, chain) in &tables.keys {
            if let Some(id) = chain.value_at(generation) {
                if tables.node_at(**id, generation).map(|n| n.key()) != Some(*key) {
                    problems.push(format!("key {}: mapped to node {} which lacks it", key, id));
                }
            }
        }

        for (parent, chain) in &tables.children {
            if !chain.is_ordered() {
                problems.push(format!("children of {:?}: chain generations out of order", parent));
            }
            for child in tables.child_ids_at(*parent, generation) {
                match tables.node_at(*child, generation) {
                    Some(node) if node.parent_id() == *parent => {}
                    Some(_) => problems.push(format!("node {}: listed under wrong parent", child)),
                    None => problems.push(format!("node {}: listed but absent", child)),
                }
            }
        }

        problems
    }
}

/// Collects every chain of a table that is not counted in `CollectStats`.
fn collect_side_table<K, T>(table: &mut HashMap<K, VersionChain<T>>, floor: Generation)
where
    K: std::hash::Hash + Eq,
{
    table.retain(|_, chain| {
        chain.collect(floor);
        !chain.is_dead(floor)
    });
}
