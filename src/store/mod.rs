//! Generational content store
//!
//! Append-only, generation-tagged MVCC table of content nodes:
//! - `Generation` - Snapshot identity
//! - `VersionChain` - Per-key ordered history
//! - `GenerationRegistry` / `GenerationPin` - Pinned generations and the collection floor
//! - `ContentStore` - The node table
//! - `WriteBatch` - Single-writer staging, one generation per commit

mod chain;
mod content_store;
mod generation;
mod registry;
mod write_batch;

pub use chain::{ChainEntry, VersionChain};
pub use content_store::{CollectStats, ContentStore};
pub use generation::Generation;
pub use registry::{GenerationPin, GenerationRegistry};
pub use write_batch::WriteBatch;

use thiserror::Error;

use crate::content::NodeId;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The node's parent is absent in the staged view
    #[error("parent {parent} of node {node} not found")]
    ParentNotFound { node: NodeId, parent: NodeId },

    /// A commit asked for a generation at or below the live one
    #[error("generation {attempted} is not above live generation {live}")]
    NonMonotonic {
        live: Generation,
        attempted: Generation,
    },
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::ParentNotFound { .. } => "NUCACHE_STORE_PARENT_NOT_FOUND",
            StoreError::NonMonotonic { .. } => "NUCACHE_STORE_NON_MONOTONIC",
        }
    }
}
