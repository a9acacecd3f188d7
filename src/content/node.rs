//! ContentNode - A node in the content tree with its versions

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ContentError, ContentNodeVersion, ContentResult, PublishState, INVARIANT_CULTURE};

/// Integer identity of a content node.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(i32);

impl NodeId {
    #[inline]
    pub fn new(value: i32) -> Self {
        Self(value)
    }

    #[inline]
    pub fn value(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A content node: tree placement plus its versions.
///
/// Versions are kept sorted by (culture, state) and are unique on that pair,
/// which the builder enforces. A node is published when it carries at least
/// one published version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentNode {
    id: NodeId,
    key: Uuid,
    content_type_id: i32,
    parent_id: Option<NodeId>,
    path: Vec<NodeId>,
    sort_order: i32,
    versions: Vec<ContentNodeVersion>,
}

impl ContentNode {
    /// Starts building a root node.
    pub fn builder(id: NodeId, key: Uuid, content_type_id: i32) -> ContentNodeBuilder {
        ContentNodeBuilder {
            id,
            key,
            content_type_id,
            parent_id: None,
            path: Vec::new(),
            sort_order: 0,
            versions: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    pub fn key(&self) -> Uuid {
        self.key
    }

    #[inline]
    pub fn content_type_id(&self) -> i32 {
        self.content_type_id
    }

    #[inline]
    pub fn parent_id(&self) -> Option<NodeId> {
        self.parent_id
    }

    /// Ancestor ids, root first, excluding this node.
    #[inline]
    pub fn path(&self) -> &[NodeId] {
        &self.path
    }

    /// Depth in the tree; roots are level 1.
    #[inline]
    pub fn level(&self) -> usize {
        self.path.len() + 1
    }

    #[inline]
    pub fn sort_order(&self) -> i32 {
        self.sort_order
    }

    #[inline]
    pub fn versions(&self) -> &[ContentNodeVersion] {
        &self.versions
    }

    pub fn version(&self, culture: &str, state: PublishState) -> Option<&ContentNodeVersion> {
        self.versions
            .iter()
            .find(|v| v.culture() == culture && v.state() == state)
    }

    pub fn published(&self, culture: &str) -> Option<&ContentNodeVersion> {
        self.version(culture, PublishState::Published)
    }

    pub fn draft(&self, culture: &str) -> Option<&ContentNodeVersion> {
        self.version(culture, PublishState::Draft)
    }

    pub fn is_published(&self) -> bool {
        self.versions.iter().any(ContentNodeVersion::is_published)
    }

    /// Versions in `state`, in (culture, state) order.
    pub fn versions_in(&self, state: PublishState) -> impl Iterator<Item = &ContentNodeVersion> {
        self.versions.iter().filter(move |v| v.state() == state)
    }

    /// Returns the version a reader should see for `culture`.
    ///
    /// Preview readers prefer the draft over the published version. Falls
    /// back to the invariant culture when the node has no version for
    /// `culture`.
    pub fn version_for(&self, culture: &str, preview: bool) -> Option<&ContentNodeVersion> {
        let states: &[PublishState] = if preview {
            &[PublishState::Draft, PublishState::Published]
        } else {
            &[PublishState::Published]
        };

        [culture, INVARIANT_CULTURE]
            .iter()
            .flat_map(|c| states.iter().map(move |s| (*c, *s)))
            .find_map(|(c, s)| self.version(c, s))
    }

    /// Returns true if `other` is placed below this node.
    pub fn is_ancestor_of(&self, other: &ContentNode) -> bool {
        other.path.contains(&self.id)
    }
}

/// Builder for [`ContentNode`].
#[derive(Debug)]
pub struct ContentNodeBuilder {
    id: NodeId,
    key: Uuid,
    content_type_id: i32,
    parent_id: Option<NodeId>,
    path: Vec<NodeId>,
    sort_order: i32,
    versions: Vec<ContentNodeVersion>,
}

impl ContentNodeBuilder {
    /// Places the node below `parent`; `path` is the parent's path plus the
    /// parent id.
    pub fn parent(mut self, parent: NodeId, path: Vec<NodeId>) -> Self {
        self.parent_id = Some(parent);
        self.path = path;
        self
    }

    pub fn sort_order(mut self, sort_order: i32) -> Self {
        self.sort_order = sort_order;
        self
    }

    pub fn version(mut self, version: ContentNodeVersion) -> Self {
        self.versions.push(version);
        self
    }

    pub fn versions(mut self, versions: impl IntoIterator<Item = ContentNodeVersion>) -> Self {
        self.versions.extend(versions);
        self
    }

    pub fn build(mut self) -> ContentResult<ContentNode> {
        match self.parent_id {
            None if !self.path.is_empty() => {
                return Err(ContentError::InvalidPath {
                    node: self.id,
                    reason: "root node with a non-empty path".into(),
                });
            }
            Some(parent) if self.path.last() != Some(&parent) => {
                return Err(ContentError::InvalidPath {
                    node: self.id,
                    reason: format!("path does not end at parent {}", parent),
                });
            }
            _ => {}
        }
        if self.path.contains(&self.id) {
            return Err(ContentError::InvalidPath {
                node: self.id,
                reason: "node appears in its own path".into(),
            });
        }

        self.versions
            .sort_by(|a, b| (a.culture(), a.state()).cmp(&(b.culture(), b.state())));
        if let Some(pair) = self
            .versions
            .windows(2)
            .find(|w| w[0].culture() == w[1].culture() && w[0].state() == w[1].state())
        {
            return Err(ContentError::DuplicateVersion {
                node: self.id,
                culture: pair[0].culture().to_string(),
                state: pair[0].state(),
            });
        }

        Ok(ContentNode {
            id: self.id,
            key: self.key,
            content_type_id: self.content_type_id,
            parent_id: self.parent_id,
            path: self.path,
            sort_order: self.sort_order,
            versions: self.versions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Properties, PropertyPayload};

    fn version(culture: &str, state: PublishState, name: &str) -> ContentNodeVersion {
        ContentNodeVersion::new(
            culture,
            state,
            name,
            PropertyPayload::encode(&Properties::new()).unwrap(),
        )
    }

    #[test]
    fn test_build_root_and_child() {
        let root = ContentNode::builder(NodeId::new(1), Uuid::new_v4(), 10)
            .version(version("", PublishState::Published, "Home"))
            .build()
            .unwrap();
        assert_eq!(root.level(), 1);
        assert!(root.is_published());

        let child = ContentNode::builder(NodeId::new(2), Uuid::new_v4(), 10)
            .parent(NodeId::new(1), vec![NodeId::new(1)])
            .sort_order(3)
            .build()
            .unwrap();
        assert_eq!(child.level(), 2);
        assert!(!child.is_published());
        assert!(root.is_ancestor_of(&child));
    }

    #[test]
    fn test_duplicate_version_rejected() {
        let err = ContentNode::builder(NodeId::new(1), Uuid::new_v4(), 1)
            .version(version("en-US", PublishState::Draft, "a"))
            .version(version("en-US", PublishState::Draft, "b"))
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "NUCACHE_CONTENT_DUPLICATE_VERSION");
    }

    #[test]
    fn test_path_must_end_at_parent() {
        let err = ContentNode::builder(NodeId::new(5), Uuid::new_v4(), 1)
            .parent(NodeId::new(2), vec![NodeId::new(1)])
            .build()
            .unwrap_err();
        assert!(matches!(err, ContentError::InvalidPath { .. }));

        let err = ContentNode::builder(NodeId::new(5), Uuid::new_v4(), 1)
            .parent(NodeId::new(5), vec![NodeId::new(5)])
            .build()
            .unwrap_err();
        assert!(matches!(err, ContentError::InvalidPath { .. }));
    }

    #[test]
    fn test_version_for_preview_prefers_draft() {
        let node = ContentNode::builder(NodeId::new(1), Uuid::new_v4(), 1)
            .version(version("en-US", PublishState::Published, "Live"))
            .version(version("en-US", PublishState::Draft, "Pending"))
            .version(version("", PublishState::Published, "Invariant"))
            .build()
            .unwrap();

        assert_eq!(node.version_for("en-US", false).unwrap().name(), "Live");
        assert_eq!(node.version_for("en-US", true).unwrap().name(), "Pending");
        assert_eq!(node.version_for("fr-FR", false).unwrap().name(), "Invariant");
    }
}
