//! On-disk cache file
//!
//! A serialized dump of the store at one generation, used for a fast cold
//! start. The file is a checksummed header, the content type records, then
//! one node group (a Node record and its Version records) per node, parents
//! first.
//!
//! Only a file written with the current schema is readable; anything else is
//! `SchemaMismatch` and must be rebuilt from the content source.

mod header;
mod reader;
mod writer;

pub use header::{CacheFileHeader, HEADER_SIZE, MAGIC};
pub use reader::{read_cache_file, read_header, verify_cache_file, LoadedCacheFile};
pub use writer::{write_cache_file, write_temp_file, PendingCacheFile};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::codec::CodecError;
use crate::content::{ContentNode, ContentType};
use crate::store::{ContentStore, Generation};

/// Result type for cache file operations
pub type CacheFileResult<T> = Result<T, CacheFileError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheFileError {
    #[error("cache file not found: {path}")]
    Missing { path: String },

    #[error("{context}: {reason}")]
    Io { context: String, reason: String },

    /// The file was written by another schema; `generation` is the header's
    /// generation, which a rebuild must exceed.
    #[error("cache file schema {found} does not match {expected}")]
    SchemaMismatch {
        found: u16,
        expected: u16,
        generation: u64,
    },

    #[error("corrupt cache file: {reason}")]
    Corrupt { reason: String },

    #[error("corrupt cache file record: {0}")]
    Codec(CodecError),

    /// A record could not be encoded; nothing was installed.
    #[error("cannot encode cache file record: {0}")]
    Encode(CodecError),
}

impl CacheFileError {
    pub(crate) fn io(context: impl Into<String>, err: std::io::Error) -> Self {
        CacheFileError::Io {
            context: context.into(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        CacheFileError::Corrupt {
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CacheFileError::Missing { .. } => "NUCACHE_CACHE_FILE_MISSING",
            CacheFileError::Io { .. } => "NUCACHE_CACHE_FILE_IO",
            CacheFileError::SchemaMismatch { .. } => "NUCACHE_SCHEMA_MISMATCH",
            CacheFileError::Corrupt { .. } | CacheFileError::Codec(_) => {
                "NUCACHE_CORRUPT_CACHE_FILE"
            }
            CacheFileError::Encode(_) => "NUCACHE_CACHE_FILE_ENCODE",
        }
    }
}

/// Everything a cache file holds for one generation.
#[derive(Debug, Clone, Default)]
pub struct CacheContents {
    pub content_types: Vec<Arc<ContentType>>,
    /// Parents first
    pub nodes: Vec<Arc<ContentNode>>,
}

impl CacheContents {
    pub fn from_nodes(nodes: Vec<Arc<ContentNode>>) -> Self {
        CacheContents {
            content_types: Vec::new(),
            nodes,
        }
    }

    /// The store as seen at `generation`.
    pub fn of(store: &ContentStore, generation: Generation) -> Self {
        CacheContents {
            content_types: store.content_types(generation),
            nodes: store.all(generation),
        }
    }
}

/// Summary of a cache file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheFileInfo {
    pub path: String,
    pub schema_version: u16,
    pub generation: u64,
    pub node_count: u64,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    /// CRC32 of the whole file, `crc32:xxxxxxxx`
    pub checksum: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;

    use tempfile::TempDir;
    use uuid::Uuid;

    use crate::codec::{CURRENT_SCHEMA_VERSION, MAX_RECORD_SIZE};
    use crate::content::{ContentNodeVersion, NodeId, Properties, PropertyData, PropertyPayload, PublishState};

    fn nodes() -> Vec<Arc<ContentNode>> {
        let props = Properties::new().with("title", PropertyData::Text("Hello".into()));
        let version = ContentNodeVersion::new(
            "en-US",
            PublishState::Published,
            "Home",
            PropertyPayload::encode(&props).unwrap(),
        );
        vec![
            Arc::new(
                ContentNode::builder(NodeId::new(1), Uuid::new_v4(), 1)
                    .version(version.clone())
                    .build()
                    .unwrap(),
            ),
            Arc::new(
                ContentNode::builder(NodeId::new(2), Uuid::new_v4(), 1)
                    .parent(NodeId::new(1), vec![NodeId::new(1)])
                    .version(version)
                    .build()
                    .unwrap(),
            ),
        ]
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nucache.content.db");
        let nodes = nodes();

        let written =
            write_cache_file(&path, Generation::new(12), &CacheContents::from_nodes(nodes.clone()))
                .unwrap();
        assert_eq!(written.node_count, 2);
        assert!(!dir.path().join("nucache.content.db.tmp").exists());

        let loaded = read_cache_file(&path).unwrap();
        assert_eq!(loaded.header.generation, 12);
        assert_eq!(loaded.nodes.len(), 2);
        assert_eq!(loaded.nodes[1], *nodes[1]);
        assert!(loaded.content_types.is_empty());
        assert_eq!(loaded.info, written);
    }

    #[test]
    fn test_content_types_are_written_before_nodes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.db");
        let page = ContentType::new(1, Uuid::from_u128(7), "page").with_property("title");
        let contents = CacheContents {
            content_types: vec![Arc::new(page.clone())],
            nodes: nodes(),
        };

        let written = write_cache_file(&path, Generation::new(4), &contents).unwrap();
        assert_eq!(written.node_count, 2);

        let loaded = read_cache_file(&path).unwrap();
        assert_eq!(loaded.content_types, vec![page]);
        assert_eq!(loaded.nodes.len(), 2);
    }

    #[test]
    fn test_oversized_node_fails_write_and_leaves_target() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.db");
        write_cache_file(&path, Generation::new(1), &CacheContents::from_nodes(nodes())).unwrap();
        let before = fs::read(&path).unwrap();

        let huge = ContentNode::builder(NodeId::new(9), Uuid::new_v4(), 1)
            .version(ContentNodeVersion::new(
                "",
                PublishState::Published,
                "Huge",
                PropertyPayload::from_raw(1, vec![b'x'; MAX_RECORD_SIZE]),
            ))
            .build()
            .unwrap();
        let mut contents = CacheContents::from_nodes(nodes());
        contents.nodes.push(Arc::new(huge));

        let err = write_temp_file(&path, Generation::new(2), &contents).unwrap_err();
        assert!(matches!(err, CacheFileError::Encode(CodecError::Oversized { .. })));
        assert_eq!(err.code(), "NUCACHE_CACHE_FILE_ENCODE");
        assert_eq!(fs::read(&path).unwrap(), before);
        assert!(!dir.path().join("cache.db.tmp").exists());
    }

    #[test]
    fn test_dropped_pending_file_leaves_target_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.db");
        write_cache_file(&path, Generation::new(1), &CacheContents::from_nodes(nodes())).unwrap();
        let before = fs::read(&path).unwrap();

        let pending = write_temp_file(&path, Generation::new(2), &CacheContents::default()).unwrap();
        drop(pending);

        assert_eq!(fs::read(&path).unwrap(), before);
        assert!(!dir.path().join("cache.db.tmp").exists());
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = read_cache_file(&dir.path().join("absent.db")).unwrap_err();
        assert!(matches!(err, CacheFileError::Missing { .. }));
    }

    #[test]
    fn test_old_schema_reports_generation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.db");
        let header = CacheFileHeader {
            schema_version: 2,
            generation: 10,
            node_count: 0,
            created_at: Utc::now(),
        };
        fs::write(&path, header.encode()).unwrap();

        assert_eq!(
            read_cache_file(&path).unwrap_err(),
            CacheFileError::SchemaMismatch {
                found: 2,
                expected: CURRENT_SCHEMA_VERSION,
                generation: 10
            }
        );
        assert_eq!(read_header(&path).unwrap().generation, 10);
    }

    #[test]
    fn test_flipped_byte_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.db");
        write_cache_file(&path, Generation::new(3), &CacheContents::from_nodes(nodes())).unwrap();

        let mut data = fs::read(&path).unwrap();
        let last = data.len() - 10;
        data[last] ^= 0x55;
        fs::write(&path, &data).unwrap();

        let err = read_cache_file(&path).unwrap_err();
        assert_eq!(err.code(), "NUCACHE_CORRUPT_CACHE_FILE");
    }

    #[test]
    fn test_truncated_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.db");
        write_cache_file(&path, Generation::new(3), &CacheContents::from_nodes(nodes())).unwrap();

        let data = fs::read(&path).unwrap();
        fs::write(&path, &data[..data.len() - 1]).unwrap();
        assert!(matches!(
            read_cache_file(&path),
            Err(CacheFileError::Codec(_))
        ));
    }
}
