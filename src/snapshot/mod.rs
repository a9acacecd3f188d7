//! PublishedSnapshot - Read view bound to one generation
//!
//! A snapshot pins the live generation of a store when it is created and
//! keeps the pin until it is dropped. Every read is a pure function of that
//! generation and the store, so repeated calls return identical results no
//! matter what is committed concurrently.
//!
//! A published snapshot only returns nodes with at least one published
//! version. A preview snapshot also returns draft-only nodes.

use std::sync::Arc;

use uuid::Uuid;

use crate::content::{ContentNode, ContentType, NodeId};
use crate::store::{ContentStore, Generation, GenerationPin};

#[derive(Debug)]
pub struct PublishedSnapshot {
    store: Arc<ContentStore>,
    pin: GenerationPin,
    preview: bool,
}

impl PublishedSnapshot {
    /// Pins the live generation of `store`.
    pub fn new(store: Arc<ContentStore>, preview: bool) -> Self {
        let pin = store.pin_live();
        Self {
            store,
            pin,
            preview,
        }
    }

    #[inline]
    pub fn generation(&self) -> Generation {
        self.pin.generation()
    }

    #[inline]
    pub fn is_preview(&self) -> bool {
        self.preview
    }

    fn visible(&self, node: Arc<ContentNode>) -> Option<Arc<ContentNode>> {
        if self.preview || node.is_published() {
            Some(node)
        } else {
            None
        }
    }

    fn visible_children(&self, parent: Option<NodeId>) -> Vec<Arc<ContentNode>> {
        self.store
            .children(parent, self.generation())
            .into_iter()
            .filter_map(|n| self.visible(n))
            .collect()
    }

    pub fn get_by_id(&self, id: NodeId) -> Option<Arc<ContentNode>> {
        self.store
            .get(id, self.generation())
            .and_then(|n| self.visible(n))
    }

    pub fn get_by_key(&self, key: Uuid) -> Option<Arc<ContentNode>> {
        self.store
            .get_by_key(key, self.generation())
            .and_then(|n| self.visible(n))
    }

    /// Top-level nodes in sort order.
    pub fn get_at_root(&self) -> Vec<Arc<ContentNode>> {
        self.visible_children(None)
    }

    /// Children of `id` in sort order; empty if `id` is not visible.
    pub fn get_children(&self, id: NodeId) -> Vec<Arc<ContentNode>> {
        if self.get_by_id(id).is_none() {
            return Vec::new();
        }
        self.visible_children(Some(id))
    }

    /// Ancestors of `id`, parent first.
    pub fn get_ancestors(&self, id: NodeId) -> Vec<Arc<ContentNode>> {
        let Some(node) = self.get_by_id(id) else {
            return Vec::new();
        };
        node.path()
            .iter()
            .rev()
            .filter_map(|ancestor| self.get_by_id(*ancestor))
            .collect()
    }

    /// Descendants of `id` in document order (depth first, sort order).
    pub fn get_descendants(&self, id: NodeId) -> Vec<Arc<ContentNode>> {
        let mut out = Vec::new();
        let mut stack: Vec<Arc<ContentNode>> = self.get_children(id).into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            stack.extend(self.visible_children(Some(node.id())).into_iter().rev());
            out.push(node);
        }
        out
    }

    /// Resolves a route such as `/about-us/team` by url segment, walking
    /// down from the roots. `/` resolves to the first root.
    pub fn get_by_route(&self, route: &str, culture: &str) -> Option<Arc<ContentNode>> {
        let mut segments = route.split('/').filter(|s| !s.is_empty()).peekable();
        if segments.peek().is_none() {
            return self.get_at_root().into_iter().next();
        }

        let mut current: Option<Arc<ContentNode>> = None;
        for segment in segments {
            let candidates = match &current {
                None => self.get_at_root(),
                Some(node) => self.visible_children(Some(node.id())),
            };
            current = Some(candidates.into_iter().find(|candidate| {
                candidate
                    .version_for(culture, self.preview)
                    .map_or(false, |v| v.url_segment().eq_ignore_ascii_case(segment))
            })?);
        }
        current
    }

    pub fn is_empty(&self) -> bool {
        self.get_at_root().is_empty()
    }

    /// Content types are the same for published and preview readers.
    pub fn get_content_type(&self, id: i32) -> Option<Arc<ContentType>> {
        self.store.get_content_type(id, self.generation())
    }

    pub fn get_content_type_by_alias(&self, alias: &str) -> Option<Arc<ContentType>> {
        self.store.get_content_type_by_alias(alias, self.generation())
    }

    pub fn get_content_type_by_key(&self, key: Uuid) -> Option<Arc<ContentType>> {
        self.store.get_content_type_by_key(key, self.generation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContentNodeVersion, Properties, PropertyPayload, PublishState};

    fn node(id: i32, path: &[i32], name: &str, state: PublishState) -> ContentNode {
        let mut builder = ContentNode::builder(NodeId::new(id), Uuid::new_v4(), 1)
            .sort_order(id)
            .version(ContentNodeVersion::new(
                "",
                state,
                name,
                PropertyPayload::encode(&Properties::new()).unwrap(),
            ));
        if let Some(parent) = path.last() {
            builder = builder.parent(
                NodeId::new(*parent),
                path.iter().map(|p| NodeId::new(*p)).collect(),
            );
        }
        builder.build().unwrap()
    }

    fn tree() -> Arc<ContentStore> {
        let store = Arc::new(ContentStore::new());
        let mut batch = store.begin_write();
        for n in [
            node(1, &[], "Home", PublishState::Published),
            node(2, &[1], "About Us", PublishState::Published),
            node(3, &[1, 2], "Team", PublishState::Published),
            node(4, &[1], "Drafts", PublishState::Draft),
            node(5, &[1, 2], "History", PublishState::Published),
        ] {
            batch.set(Arc::new(n)).unwrap();
        }
        batch.commit();
        store
    }

    fn ids(nodes: &[Arc<ContentNode>]) -> Vec<i32> {
        nodes.iter().map(|n| n.id().value()).collect()
    }

    #[test]
    fn test_content_types_follow_the_pinned_generation() {
        let store = tree();
        let mut batch = store.begin_write();
        batch.set_content_type(Arc::new(
            ContentType::new(1, Uuid::from_u128(100), "page").with_name("Page"),
        ));
        batch.commit();
        let before = PublishedSnapshot::new(Arc::clone(&store), false);

        let mut batch = store.begin_write();
        batch.set_content_type(Arc::new(ContentType::new(1, Uuid::from_u128(100), "landingPage")));
        batch.commit();
        let after = PublishedSnapshot::new(store, true);

        assert_eq!(before.get_content_type(1).unwrap().alias(), "page");
        assert!(before.get_content_type_by_alias("landingpage").is_none());
        assert_eq!(after.get_content_type_by_alias("LandingPage").unwrap().id(), 1);
        assert_eq!(after.get_content_type_by_key(Uuid::from_u128(100)).unwrap().alias(), "landingPage");
        assert!(after.get_content_type(2).is_none());
    }

    #[test]
    fn test_navigation() {
        let snapshot = PublishedSnapshot::new(tree(), false);

        assert_eq!(ids(&snapshot.get_at_root()), vec![1]);
        assert_eq!(ids(&snapshot.get_children(NodeId::new(1))), vec![2]);
        assert_eq!(ids(&snapshot.get_ancestors(NodeId::new(3))), vec![2, 1]);
        assert_eq!(ids(&snapshot.get_descendants(NodeId::new(1))), vec![2, 3, 5]);
        assert!(!snapshot.is_empty());
    }

    #[test]
    fn test_preview_sees_drafts() {
        let store = tree();
        let published = PublishedSnapshot::new(Arc::clone(&store), false);
        let preview = PublishedSnapshot::new(store, true);

        assert!(published.get_by_id(NodeId::new(4)).is_none());
        assert!(preview.get_by_id(NodeId::new(4)).is_some());
        assert_eq!(ids(&preview.get_children(NodeId::new(1))), vec![2, 4]);
    }

    #[test]
    fn test_get_by_route() {
        let snapshot = PublishedSnapshot::new(tree(), false);

        assert_eq!(snapshot.get_by_route("/", "").unwrap().id(), NodeId::new(1));
        assert_eq!(
            snapshot.get_by_route("/home/about-us/team", "").unwrap().id(),
            NodeId::new(3)
        );
        assert!(snapshot.get_by_route("/home/drafts", "").is_none());
        assert!(snapshot.get_by_route("/home/nowhere", "").is_none());
    }

    #[test]
    fn test_snapshot_pins_generation_until_dropped() {
        let store = tree();
        let snapshot = PublishedSnapshot::new(Arc::clone(&store), false);
        assert_eq!(store.registry().pin_count(), 1);
        drop(snapshot);
        assert_eq!(store.registry().pin_count(), 0);
    }

    #[test]
    fn test_empty_store_snapshot() {
        let snapshot = PublishedSnapshot::new(Arc::new(ContentStore::new()), false);
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.generation(), Generation::ZERO);
        assert!(snapshot.get_by_route("/", "").is_none());
    }
}
