//! Content source
//!
//! The relational store the cache is materialized from. The cache only ever
//! reads from it: in bulk during a rebuild and by id, branch or content type
//! when a change notification arrives. Content types are read alongside the
//! nodes built from them.

mod export;
mod memory;

pub use export::{ContentExport, ExportNode, ExportVersion};
pub use memory::MemoryContentSource;

use thiserror::Error;

use crate::content::{ContentNode, ContentType, NodeId};

/// Result type for content source operations
pub type SourceResult<T> = Result<T, SourceError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("content source unavailable: {0}")]
    Unavailable(String),

    #[error("invalid content export: {0}")]
    InvalidExport(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl SourceError {
    pub fn code(&self) -> &'static str {
        match self {
            SourceError::Unavailable(_) => "NUCACHE_SOURCE_UNAVAILABLE",
            SourceError::InvalidExport(_) => "NUCACHE_SOURCE_INVALID_EXPORT",
            SourceError::Io(_) => "NUCACHE_SOURCE_IO",
        }
    }
}

/// Iterator over every node in the source.
pub type NodeStream<'a> = Box<dyn Iterator<Item = SourceResult<ContentNode>> + Send + 'a>;

/// Read access to the relational content store.
pub trait ContentSource: Send + Sync {
    /// Streams every node, draft-only nodes included, ordered by level then
    /// parent then sort order, so that parents always precede children.
    fn stream_all(&self) -> SourceResult<NodeStream<'_>>;

    /// Fetches a single node.
    fn get(&self, id: NodeId) -> SourceResult<Option<ContentNode>>;

    /// Fetches `id` and all of its descendants, parents first. Empty if `id`
    /// does not exist.
    fn get_branch(&self, id: NodeId) -> SourceResult<Vec<ContentNode>>;

    /// Fetches every node of a content type, parents first.
    fn get_by_content_type(&self, content_type_id: i32) -> SourceResult<Vec<ContentNode>>;

    /// Every content type. Sources without a type table have none.
    fn content_types(&self) -> SourceResult<Vec<ContentType>> {
        Ok(Vec::new())
    }

    /// Fetches a single content type.
    fn get_content_type(&self, id: i32) -> SourceResult<Option<ContentType>> {
        Ok(self.content_types()?.into_iter().find(|ty| ty.id() == id))
    }
}
