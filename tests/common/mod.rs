//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use nucache::codec::{MAX_RECORD_SIZE, PAYLOAD_SCHEMA_VERSION};
use nucache::config::CacheConfig;
use nucache::content::{
    ContentNode, ContentNodeVersion, ContentType, NodeId, Properties, PropertyData,
    PropertyPayload, PublishState,
};
use nucache::service::PublishedSnapshotService;
use nucache::source::{ContentSource, MemoryContentSource, NodeStream, SourceError, SourceResult};
use nucache::writer::{ChangeJournal, FileJournal, JournalReplay, JournalResult};
use tempfile::TempDir;
use uuid::Uuid;

pub fn key(id: i32) -> Uuid {
    Uuid::from_u128(0x6f1c_0a3e_0000_4000_8000_0000_0000_0000 + id as u128)
}

pub fn version(state: PublishState, name: &str, title: &str) -> ContentNodeVersion {
    let props = Properties::new().with("title", PropertyData::Text(title.to_string()));
    ContentNodeVersion::new("en-US", state, name, PropertyPayload::encode(&props).unwrap())
}

/// A node with one en-US version titled `title`. `path` lists ancestors
/// root first and ends at the parent.
pub fn node_with(id: i32, path: &[i32], state: PublishState, title: &str) -> ContentNode {
    let mut builder = ContentNode::builder(NodeId::new(id), key(id), 1)
        .sort_order(id)
        .version(version(state, &format!("Node {}", id), title));
    if let Some(parent) = path.last() {
        builder = builder.parent(
            NodeId::new(*parent),
            path.iter().map(|p| NodeId::new(*p)).collect(),
        );
    }
    builder.build().unwrap()
}

pub fn published(id: i32, path: &[i32], title: &str) -> ContentNode {
    node_with(id, path, PublishState::Published, title)
}

/// A root node whose payload alone exceeds the record size limit.
pub fn oversized(id: i32) -> ContentNode {
    ContentNode::builder(NodeId::new(id), key(id), 1)
        .version(ContentNodeVersion::new(
            "en-US",
            PublishState::Published,
            "Huge",
            PropertyPayload::from_raw(PAYLOAD_SCHEMA_VERSION, vec![b'x'; MAX_RECORD_SIZE]),
        ))
        .build()
        .unwrap()
}

/// Title of the en-US published or draft version, as stored.
pub fn title(node: &ContentNode, preview: bool) -> String {
    node.version_for("en-US", preview)
        .unwrap()
        .properties()
        .unwrap()
        .value("title", "en-US")
        .and_then(|data| data.as_text().map(str::to_string))
        .unwrap()
}

/// Service over `source` with its cache file and journal in `dir`.
pub fn service_in(dir: &TempDir, source: Arc<dyn ContentSource>) -> PublishedSnapshotService {
    service_with(dir, source, |_| {})
}

/// Like [`service_in`] with the default config adjusted by `configure`.
pub fn service_with(
    dir: &TempDir,
    source: Arc<dyn ContentSource>,
    configure: impl FnOnce(&mut CacheConfig),
) -> PublishedSnapshotService {
    let mut config = CacheConfig::new(dir.path());
    configure(&mut config);
    let journal = Arc::new(FileJournal::open(&config.journal_path()).unwrap());
    PublishedSnapshotService::new(config, source, journal)
}

/// Source over a [`MemoryContentSource`] that fails on demand.
#[derive(Default)]
pub struct FlakySource {
    pub inner: MemoryContentSource,
    /// `get` fails for this node id
    pub fail_get: Mutex<Option<NodeId>>,
    /// `stream_all` fails after yielding this many nodes
    pub fail_stream_after: Mutex<Option<usize>>,
}

impl FlakySource {
    pub fn new(nodes: impl IntoIterator<Item = ContentNode>) -> Self {
        Self {
            inner: MemoryContentSource::from_nodes(nodes),
            ..Self::default()
        }
    }

    pub fn fail_get(&self, id: Option<i32>) {
        *self.fail_get.lock().unwrap() = id.map(NodeId::new);
    }

    pub fn fail_stream_after(&self, count: Option<usize>) {
        *self.fail_stream_after.lock().unwrap() = count;
    }
}

impl ContentSource for FlakySource {
    fn stream_all(&self) -> SourceResult<NodeStream<'_>> {
        let limit = *self.fail_stream_after.lock().unwrap();
        let stream = self.inner.stream_all()?;
        match limit {
            None => Ok(stream),
            Some(limit) => Ok(Box::new(stream.enumerate().map(move |(i, node)| {
                if i >= limit {
                    Err(SourceError::Unavailable("connection reset".to_string()))
                } else {
                    node
                }
            }))),
        }
    }

    fn get(&self, id: NodeId) -> SourceResult<Option<ContentNode>> {
        if *self.fail_get.lock().unwrap() == Some(id) {
            return Err(SourceError::Unavailable(format!("timeout reading node {}", id)));
        }
        self.inner.get(id)
    }

    fn get_branch(&self, id: NodeId) -> SourceResult<Vec<ContentNode>> {
        self.inner.get_branch(id)
    }

    fn get_by_content_type(&self, content_type_id: i32) -> SourceResult<Vec<ContentNode>> {
        self.inner.get_by_content_type(content_type_id)
    }

    fn content_types(&self) -> SourceResult<Vec<ContentType>> {
        self.inner.content_types()
    }
}

/// Journal whose appends fail on demand.
#[derive(Default)]
pub struct FailingJournal {
    pub failing: AtomicBool,
    pub appended: AtomicUsize,
}

impl ChangeJournal for FailingJournal {
    fn append(&self, _batch: &[u8]) -> io::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
        }
        self.appended.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn replay(&self) -> JournalResult<JournalReplay> {
        Ok(JournalReplay::default())
    }

    fn reset(&self) -> io::Result<()> {
        Ok(())
    }
}
