//! WriteBatch - Staged changes committed as one generation
//!
//! A batch holds the store's writer lock for its whole lifetime. Reads
//! through the batch see the live generation overlaid with staged changes.
//! Dropping a batch without committing discards every staged change.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, MutexGuard};

use uuid::Uuid;

use super::content_store::{ChildList, ContentStore, Tables};
use super::{Generation, StoreError, StoreResult};
use crate::codec::BatchEntry;
use crate::content::{ContentNode, ContentType, NodeId};

pub struct WriteBatch<'a> {
    store: &'a ContentStore,
    _writer: MutexGuard<'a, ()>,
    base: Generation,
    staged: BTreeMap<NodeId, Option<Arc<ContentNode>>>,
    staged_types: BTreeMap<i32, Option<Arc<ContentType>>>,
}

impl<'a> WriteBatch<'a> {
    pub(crate) fn new(store: &'a ContentStore, writer: MutexGuard<'a, ()>) -> Self {
        let base = store.live_generation();
        Self {
            store,
            _writer: writer,
            base,
            staged: BTreeMap::new(),
            staged_types: BTreeMap::new(),
        }
    }

    /// Generation the batch was opened against.
    #[inline]
    pub fn base(&self) -> Generation {
        self.base
    }

    /// Generation a plain `commit` would produce.
    #[inline]
    pub fn next_generation(&self) -> Generation {
        self.base.next()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty() && self.staged_types.is_empty()
    }

    /// Staged node and content type changes.
    #[inline]
    pub fn len(&self) -> usize {
        self.staged.len() + self.staged_types.len()
    }

    /// Node as it would be after commit, including unpublished nodes.
    pub fn current(&self, id: NodeId) -> Option<Arc<ContentNode>> {
        match self.staged.get(&id) {
            Some(staged) => staged.clone(),
            None => self.store.get(id, self.base),
        }
    }

    /// Stages a node.
    ///
    /// Fails when the node's parent is absent from the staged view.
    pub fn set(&mut self, node: Arc<ContentNode>) -> StoreResult<()> {
        if let Some(parent) = node.parent_id() {
            if self.current(parent).is_none() {
                return Err(StoreError::ParentNotFound {
                    node: node.id(),
                    parent,
                });
            }
        }
        self.staged.insert(node.id(), Some(node));
        Ok(())
    }

    /// Stages the removal of a node. Returns false if it is already absent.
    pub fn remove(&mut self, id: NodeId) -> bool {
        if self.current(id).is_none() {
            return false;
        }
        match self.store.get(id, self.base) {
            Some(_) => {
                self.staged.insert(id, None);
            }
            // Only ever existed inside this batch.
            None => {
                self.staged.remove(&id);
            }
        }
        true
    }

    /// Content type as it would be after commit.
    pub fn current_content_type(&self, id: i32) -> Option<Arc<ContentType>> {
        match self.staged_types.get(&id) {
            Some(staged) => staged.clone(),
            None => self.store.get_content_type(id, self.base),
        }
    }

    /// Ids of every content type in the staged view, ascending.
    pub fn content_type_ids(&self) -> Vec<i32> {
        let mut ids: BTreeSet<i32> = self
            .store
            .content_types(self.base)
            .iter()
            .map(|ty| ty.id())
            .filter(|id| !self.staged_types.contains_key(id))
            .collect();
        ids.extend(
            self.staged_types
                .iter()
                .filter(|(_, ty)| ty.is_some())
                .map(|(id, _)| *id),
        );
        ids.into_iter().collect()
    }

    pub fn set_content_type(&mut self, content_type: Arc<ContentType>) {
        self.staged_types.insert(content_type.id(), Some(content_type));
    }

    /// Stages the removal of a content type. Returns false if it is already
    /// absent. Nodes of the type are left to the caller.
    pub fn remove_content_type(&mut self, id: i32) -> bool {
        if self.current_content_type(id).is_none() {
            return false;
        }
        if self.store.get_content_type(id, self.base).is_some() {
            self.staged_types.insert(id, None);
        } else {
            self.staged_types.remove(&id);
        }
        true
    }

    /// Ids of the children of `parent` in the staged view, unordered.
    pub fn child_ids(&self, parent: Option<NodeId>) -> Vec<NodeId> {
        let tables = self.store.read_tables();
        let mut ids: BTreeSet<NodeId> = tables
            .child_ids_at(parent, self.base)
            .iter()
            .filter(|id| !self.staged.contains_key(*id))
            .copied()
            .collect();
        drop(tables);

        ids.extend(
            self.staged
                .values()
                .flatten()
                .filter(|node| node.parent_id() == parent)
                .map(|node| node.id()),
        );
        ids.into_iter().collect()
    }

    /// Every descendant of `id` in the staged view.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut frontier = vec![id];
        while let Some(next) = frontier.pop() {
            for child in self.child_ids(Some(next)) {
                out.push(child);
                frontier.push(child);
            }
        }
        out
    }

    /// Staged changes for the change journal: content types by id, then
    /// nodes by id.
    pub fn entries(&self) -> Vec<BatchEntry> {
        let types = self.staged_types.iter().map(|(id, ty)| match ty {
            Some(ty) => BatchEntry::SetContentType(Arc::clone(ty)),
            None => BatchEntry::RemoveContentType(*id),
        });
        let nodes = self.staged.iter().map(|(id, node)| match node {
            Some(node) => BatchEntry::Set(Arc::clone(node)),
            None => BatchEntry::Remove(*id),
        });
        types.chain(nodes).collect()
    }

    /// Commits as `base + 1`. An empty batch commits nothing and returns the
    /// base generation.
    pub fn commit(self) -> Generation {
        if self.is_empty() {
            return self.base;
        }
        let generation = self.base.next();
        self.apply(generation);
        generation
    }

    /// Commits as exactly `generation`, even if the batch is empty.
    ///
    /// Used when loading persisted state, which must keep its generation.
    pub fn commit_as(self, generation: Generation) -> StoreResult<Generation> {
        if generation <= self.base {
            return Err(StoreError::NonMonotonic {
                live: self.base,
                attempted: generation,
            });
        }
        self.apply(generation);
        Ok(generation)
    }

    fn apply(self, generation: Generation) {
        let lists = self.child_list_updates();
        let keys = self.key_updates();

        let mut tables = self.store.write_tables();
        for (id, node) in &self.staged {
            tables
                .nodes
                .entry(*id)
                .or_default()
                .push(generation, node.clone());
        }
        for (key, id) in keys {
            tables
                .keys
                .entry(key)
                .or_default()
                .push(generation, id.map(Arc::new));
        }
        for (id, ty) in &self.staged_types {
            tables
                .content_types
                .entry(*id)
                .or_default()
                .push(generation, ty.clone());
        }
        for (parent, list) in lists {
            let value = if list.is_empty() {
                None
            } else {
                Some(Arc::new(list))
            };
            tables.children.entry(parent).or_default().push(generation, value);
        }
        drop(tables);

        self.store.publish(generation);
    }

    /// Key mappings that change with the batch: keys a node no longer
    /// carries are released, then current keys are claimed.
    fn key_updates(&self) -> BTreeMap<Uuid, Option<NodeId>> {
        let tables = self.store.read_tables();
        let mut updates = BTreeMap::new();

        for (id, node) in &self.staged {
            let Some(old) = tables.node_at(*id, self.base) else {
                continue;
            };
            let kept = node.as_ref().is_some_and(|n| n.key() == old.key());
            if !kept && tables.key_at(old.key(), self.base) == Some(*id) {
                updates.insert(old.key(), None);
            }
        }
        for (id, node) in &self.staged {
            if let Some(node) = node {
                if tables.key_at(node.key(), self.base) != Some(*id) {
                    updates.insert(node.key(), Some(*id));
                } else {
                    updates.remove(&node.key());
                }
            }
        }
        updates
    }

    /// Recomputes the child list of every parent touched by the batch.
    fn child_list_updates(&self) -> Vec<(Option<NodeId>, ChildList)> {
        let tables = self.store.read_tables();

        let mut touched: BTreeSet<Option<NodeId>> = BTreeSet::new();
        let mut added: HashMap<Option<NodeId>, Vec<Arc<ContentNode>>> = HashMap::new();
        for (id, node) in &self.staged {
            if let Some(old) = tables.node_at(*id, self.base) {
                touched.insert(old.parent_id());
            }
            if let Some(node) = node {
                touched.insert(node.parent_id());
                added.entry(node.parent_id()).or_default().push(Arc::clone(node));
            }
        }

        touched
            .into_iter()
            .map(|parent| {
                let list = self.merged_children(&tables, parent, added.remove(&parent));
                (parent, list)
            })
            .collect()
    }

    fn merged_children(
        &self,
        tables: &Tables,
        parent: Option<NodeId>,
        added: Option<Vec<Arc<ContentNode>>>,
    ) -> ChildList {
        let mut children: Vec<(i32, NodeId)> = tables
            .child_ids_at(parent, self.base)
            .iter()
            .filter(|id| !self.staged.contains_key(*id))
            .filter_map(|id| tables.node_at(*id, self.base))
            .map(|node| (node.sort_order(), node.id()))
            .collect();
        children.extend(
            added
                .into_iter()
                .flatten()
                .map(|node| (node.sort_order(), node.id())),
        );
        children.sort_unstable();
        children.into_iter().map(|(_, id)| id).collect()
    }
}
