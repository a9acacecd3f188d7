//! In-memory content source

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::export::ContentExport;
use super::{ContentSource, NodeStream, SourceError, SourceResult};
use crate::content::{ContentNode, ContentType, NodeId};

/// Thread-safe content source backed by a map, loadable from a JSON export.
#[derive(Debug, Default)]
pub struct MemoryContentSource {
    nodes: RwLock<BTreeMap<NodeId, ContentNode>>,
    content_types: RwLock<BTreeMap<i32, ContentType>>,
}

impl MemoryContentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nodes(nodes: impl IntoIterator<Item = ContentNode>) -> Self {
        let source = Self::new();
        for node in nodes {
            source.upsert(node);
        }
        source
    }

    /// Loads a JSON export file.
    pub fn from_export_file(path: &Path) -> SourceResult<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| SourceError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_export_json(&data)
    }

    pub fn from_export_json(json: &str) -> SourceResult<Self> {
        let mut export: ContentExport =
            serde_json::from_str(json).map_err(|e| SourceError::InvalidExport(e.to_string()))?;
        let content_types = std::mem::take(&mut export.content_types);
        let source = Self::from_nodes(export.into_nodes()?);
        for content_type in content_types {
            source.upsert_content_type(content_type);
        }
        Ok(source)
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<NodeId, ContentNode>> {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<NodeId, ContentNode>> {
        self.nodes.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn upsert_content_type(&self, content_type: ContentType) {
        self.content_types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(content_type.id(), content_type);
    }

    /// Removes a content type. Its nodes stay; callers remove them too.
    pub fn remove_content_type(&self, id: i32) -> bool {
        self.content_types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    /// Inserts or replaces a node.
    pub fn upsert(&self, node: ContentNode) {
        self.write().insert(node.id(), node);
    }

    /// Removes a node and everything below it. Returns the number removed.
    pub fn remove(&self, id: NodeId) -> usize {
        let mut nodes = self.write();
        let doomed: Vec<NodeId> = nodes
            .values()
            .filter(|n| n.id() == id || n.path().contains(&id))
            .map(ContentNode::id)
            .collect();
        for id in &doomed {
            nodes.remove(id);
        }
        doomed.len()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn sorted(mut nodes: Vec<ContentNode>) -> Vec<ContentNode> {
        nodes.sort_by_key(|n| (n.level(), n.parent_id(), n.sort_order(), n.id()));
        nodes
    }
}

impl ContentSource for MemoryContentSource {
    fn stream_all(&self) -> SourceResult<NodeStream<'_>> {
        let nodes = Self::sorted(self.read().values().cloned().collect());
        Ok(Box::new(nodes.into_iter().map(Ok)))
    }

    fn get(&self, id: NodeId) -> SourceResult<Option<ContentNode>> {
        Ok(self.read().get(&id).cloned())
    }

    fn get_branch(&self, id: NodeId) -> SourceResult<Vec<ContentNode>> {
        let nodes = self.read();
        if !nodes.contains_key(&id) {
            return Ok(Vec::new());
        }
        Ok(Self::sorted(
            nodes
                .values()
                .filter(|n| n.id() == id || n.path().contains(&id))
                .cloned()
                .collect(),
        ))
    }

    fn get_by_content_type(&self, content_type_id: i32) -> SourceResult<Vec<ContentNode>> {
        Ok(Self::sorted(
            self.read()
                .values()
                .filter(|n| n.content_type_id() == content_type_id)
                .cloned()
                .collect(),
        ))
    }

    fn content_types(&self) -> SourceResult<Vec<ContentType>> {
        Ok(self
            .content_types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect())
    }
}
