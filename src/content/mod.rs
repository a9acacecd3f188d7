//! Published content domain types
//!
//! A content node is identified by an integer id and a GUID key and carries
//! one immutable version per (culture, publish state). Nodes are values: the
//! cache never mutates a node in place, a change produces a new node that
//! supersedes the old one at a later generation.
//!
//! This module provides:
//! - `NodeId` - Integer node identity
//! - `ContentNode` - Tree placement plus the set of versions
//! - `ContentNodeVersion` - Immutable per-culture version
//! - `ContentType` - Document type, looked up by id, key or alias
//! - `PropertyPayload` / `Properties` - Property values and their encoded form

mod content_type;
mod node;
mod property;
mod version;

pub use content_type::ContentType;
pub use node::{ContentNode, ContentNodeBuilder, NodeId};
pub use property::{PropertyData, PropertyPayload, PropertyValue, Properties, PAYLOAD_SCHEMA_VERSION};
pub use version::{default_url_segment, ContentNodeVersion, PublishState, INVARIANT_CULTURE};
pub(crate) use version::truncate_millis;

use thiserror::Error;

/// Result type for content model construction
pub type ContentResult<T> = Result<T, ContentError>;

/// Errors raised while assembling a content node
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    /// Two versions share the same culture and publish state
    #[error("node {node} already has a {state} version for culture '{culture}'")]
    DuplicateVersion {
        node: NodeId,
        culture: String,
        state: PublishState,
    },

    /// The ancestor path does not agree with the parent reference
    #[error("node {node} has an invalid path: {reason}")]
    InvalidPath { node: NodeId, reason: String },
}

impl ContentError {
    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            ContentError::DuplicateVersion { .. } => "NUCACHE_CONTENT_DUPLICATE_VERSION",
            ContentError::InvalidPath { .. } => "NUCACHE_CONTENT_INVALID_PATH",
        }
    }
}
