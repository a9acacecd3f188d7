//! JSON content export
//!
//! The export lists nodes flat with a parent reference; ancestor paths are
//! derived on load. Example:
//!
//! ```json
//! {
//!   "content_types": [
//!     { "id": 10, "key": "9b1f0e2a-0000-4c33-9e0a-0c1a1e4d5f60", "alias": "home" }
//!   ],
//!   "nodes": [
//!     {
//!       "id": 1,
//!       "key": "4d9a5c1e-1111-4c33-9e0a-0c1a1e4d5f60",
//!       "content_type_id": 10,
//!       "parent_id": null,
//!       "sort_order": 0,
//!       "versions": [
//!         {
//!           "culture": "en-US",
//!           "state": "published",
//!           "name": "Home",
//!           "properties": { "title": [ { "data": { "type": "text", "value": "Hello" } } ] }
//!         }
//!       ]
//!     }
//!   ]
//! }
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{SourceError, SourceResult};
use crate::content::{
    ContentNode, ContentNodeVersion, ContentType, NodeId, Properties, PropertyPayload, PublishState,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentExport {
    #[serde(default)]
    pub content_types: Vec<ContentType>,
    pub nodes: Vec<ExportNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportNode {
    pub id: i32,
    pub key: Uuid,
    pub content_type_id: i32,
    #[serde(default)]
    pub parent_id: Option<i32>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default)]
    pub versions: Vec<ExportVersion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportVersion {
    #[serde(default)]
    pub culture: String,
    pub state: PublishState,
    pub name: String,
    #[serde(default)]
    pub version_id: i32,
    #[serde(default)]
    pub url_segment: Option<String>,
    #[serde(default)]
    pub template_id: Option<i32>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub properties: Properties,
}

impl ExportVersion {
    fn into_version(self) -> SourceResult<ContentNodeVersion> {
        let payload = PropertyPayload::encode(&self.properties)
            .map_err(|e| SourceError::InvalidExport(e.to_string()))?;
        let mut version = ContentNodeVersion::new(self.culture, self.state, self.name, payload)
            .with_version_id(self.version_id)
            .with_template(self.template_id);
        if let Some(segment) = self.url_segment {
            version = version.with_url_segment(segment);
        }
        if let Some(created) = self.created_at {
            version = version.with_timestamps(created, self.updated_at.unwrap_or(created));
        }
        Ok(version)
    }
}

impl ContentExport {
    /// Converts the export into nodes, deriving each ancestor path.
    pub fn into_nodes(self) -> SourceResult<Vec<ContentNode>> {
        let parents: HashMap<i32, Option<i32>> =
            self.nodes.iter().map(|n| (n.id, n.parent_id)).collect();
        if parents.len() != self.nodes.len() {
            return Err(SourceError::InvalidExport("duplicate node id".into()));
        }

        let mut out = Vec::with_capacity(self.nodes.len());
        for node in self.nodes {
            let path = ancestor_path(node.id, &parents)?;
            let versions = node
                .versions
                .into_iter()
                .map(ExportVersion::into_version)
                .collect::<SourceResult<Vec<_>>>()?;

            let mut builder = ContentNode::builder(NodeId::new(node.id), node.key, node.content_type_id)
                .sort_order(node.sort_order)
                .versions(versions);
            if let Some(parent) = node.parent_id {
                builder = builder.parent(NodeId::new(parent), path);
            }
            out.push(
                builder
                    .build()
                    .map_err(|e| SourceError::InvalidExport(e.to_string()))?,
            );
        }
        Ok(out)
    }
}

fn ancestor_path(id: i32, parents: &HashMap<i32, Option<i32>>) -> SourceResult<Vec<NodeId>> {
    let mut path = Vec::new();
    let mut current = parents.get(&id).copied().flatten();
    while let Some(parent) = current {
        if parent == id || path.len() > parents.len() {
            return Err(SourceError::InvalidExport(format!(
                "node {} is part of a parent cycle",
                id
            )));
        }
        path.push(NodeId::new(parent));
        current = parents
            .get(&parent)
            .copied()
            .ok_or_else(|| {
                SourceError::InvalidExport(format!("node {} references missing parent {}", id, parent))
            })?;
    }
    path.reverse();
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = r#"{
        "nodes": [
            {"id": 1, "key": "4d9a5c1e-1111-4c33-9e0a-0c1a1e4d5f60", "content_type_id": 10,
             "versions": [{"state": "published", "name": "Home"}]},
            {"id": 2, "key": "4d9a5c1e-2222-4c33-9e0a-0c1a1e4d5f60", "content_type_id": 10,
             "parent_id": 1, "sort_order": 1,
             "versions": [{"culture": "en-US", "state": "draft", "name": "About",
                           "properties": {"title": [{"data": {"type": "text", "value": "Hi"}}]}}]},
            {"id": 3, "key": "4d9a5c1e-3333-4c33-9e0a-0c1a1e4d5f60", "content_type_id": 11,
             "parent_id": 2, "versions": []}
        ]
    }"#;

    #[test]
    fn test_export_derives_paths() {
        let export: ContentExport = serde_json::from_str(EXPORT).unwrap();
        let nodes = export.into_nodes().unwrap();

        assert_eq!(nodes[2].path(), &[NodeId::new(1), NodeId::new(2)]);
        assert_eq!(nodes[1].parent_id(), Some(NodeId::new(1)));
        assert!(nodes[0].is_published());

        let about = nodes[1].draft("en-US").unwrap();
        let props = about.properties().unwrap();
        assert_eq!(props.value("title", "en-US").and_then(|d| d.as_text()), Some("Hi"));
    }

    #[test]
    fn test_missing_parent_rejected() {
        let json = r#"{"nodes": [{"id": 2, "key": "4d9a5c1e-2222-4c33-9e0a-0c1a1e4d5f60",
                        "content_type_id": 1, "parent_id": 9}]}"#;
        let export: ContentExport = serde_json::from_str(json).unwrap();
        assert!(matches!(export.into_nodes(), Err(SourceError::InvalidExport(_))));
    }

    #[test]
    fn test_cycle_rejected() {
        let json = r#"{"nodes": [
            {"id": 1, "key": "4d9a5c1e-1111-4c33-9e0a-0c1a1e4d5f60", "content_type_id": 1, "parent_id": 2},
            {"id": 2, "key": "4d9a5c1e-2222-4c33-9e0a-0c1a1e4d5f60", "content_type_id": 1, "parent_id": 1}
        ]}"#;
        let export: ContentExport = serde_json::from_str(json).unwrap();
        assert!(export.into_nodes().is_err());
    }
}
