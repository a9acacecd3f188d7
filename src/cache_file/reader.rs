//! Cache file reading and verification

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use super::header::{CacheFileHeader, HEADER_SIZE};
use super::writer::file_checksum;
use super::{CacheFileError, CacheFileInfo, CacheFileResult};
use crate::codec::{
    decode_frame, decode_node, deserialize_content_type, CodecError, RecordKind,
    CURRENT_SCHEMA_VERSION,
};
use crate::content::{ContentNode, ContentType};

/// Contents of a cache file that passed every check.
#[derive(Debug)]
pub struct LoadedCacheFile {
    pub header: CacheFileHeader,
    pub content_types: Vec<ContentType>,
    /// Nodes in file order, parents first
    pub nodes: Vec<ContentNode>,
    pub info: CacheFileInfo,
}

fn read_bytes(path: &Path) -> CacheFileResult<Vec<u8>> {
    fs::read(path).map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            CacheFileError::Missing {
                path: path.display().to_string(),
            }
        } else {
            CacheFileError::io(format!("read {}", path.display()), e)
        }
    })
}

/// Reads only the header.
///
/// Used to learn the generation of a file even when its schema is not
/// readable.
pub fn read_header(path: &Path) -> CacheFileResult<CacheFileHeader> {
    use std::io::Read;

    let mut file = fs::File::open(path).map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            CacheFileError::Missing {
                path: path.display().to_string(),
            }
        } else {
            CacheFileError::io(format!("open {}", path.display()), e)
        }
    })?;
    let mut buf = [0u8; HEADER_SIZE];
    file.read_exact(&mut buf)
        .map_err(|_| CacheFileError::corrupt("file is shorter than the header"))?;
    CacheFileHeader::decode(&buf)
}

/// Reads and fully validates a cache file.
pub fn read_cache_file(path: &Path) -> CacheFileResult<LoadedCacheFile> {
    let data = read_bytes(path)?;
    let header = CacheFileHeader::decode(&data)?;
    if header.schema_version != CURRENT_SCHEMA_VERSION {
        return Err(CacheFileError::SchemaMismatch {
            found: header.schema_version,
            expected: CURRENT_SCHEMA_VERSION,
            generation: header.generation,
        });
    }

    let record_error = |e: CodecError| match e {
        CodecError::SchemaMismatch { found, expected } => CacheFileError::SchemaMismatch {
            found,
            expected,
            generation: header.generation,
        },
        other => CacheFileError::Codec(other),
    };

    let mut content_types = Vec::new();
    let mut nodes = Vec::with_capacity(header.node_count.min(1 << 20) as usize);
    let mut offset = HEADER_SIZE;
    while offset < data.len() {
        let rest = &data[offset..];
        let (frame, frame_len) = decode_frame(rest).map_err(record_error)?;
        if frame.kind == RecordKind::ContentType {
            if !nodes.is_empty() {
                return Err(CacheFileError::corrupt("content type record after the first node"));
            }
            content_types.push(
                deserialize_content_type(frame.body, frame.schema_version).map_err(record_error)?,
            );
            offset += frame_len;
            continue;
        }
        let (node, consumed) = decode_node(rest).map_err(record_error)?;
        nodes.push(node);
        offset += consumed;
    }

    if nodes.len() as u64 != header.node_count {
        return Err(CacheFileError::corrupt(format!(
            "header declares {} nodes, file holds {}",
            header.node_count,
            nodes.len()
        )));
    }

    let info = CacheFileInfo {
        path: path.display().to_string(),
        schema_version: header.schema_version,
        generation: header.generation,
        node_count: header.node_count,
        created_at: header.created_at,
        size_bytes: data.len() as u64,
        checksum: file_checksum(&data),
    };
    Ok(LoadedCacheFile {
        header,
        content_types,
        nodes,
        info,
    })
}

/// Validates a cache file without loading it into a store.
pub fn verify_cache_file(path: &Path) -> CacheFileResult<CacheFileInfo> {
    read_cache_file(path).map(|loaded| loaded.info)
}
