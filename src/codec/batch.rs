//! Journal batch encoding
//!
//! A committed batch is a BatchHeader frame (generation u64, entry count u32)
//! followed by one record group per entry: a node group, a Tombstone, a
//! ContentType or a ContentTypeRemoval frame.

use std::sync::Arc;

use super::content_type::{
    decode_content_type_removal_body, deserialize_content_type, encode_content_type,
    encode_content_type_removal,
};
use super::node::{decode_node, decode_tombstone_body, encode_node, encode_tombstone};
use super::record::{decode_frame, encode_frame, expect_frame, BodyReader, BodyWriter, RecordKind};
use super::{CodecError, CodecResult, CURRENT_SCHEMA_VERSION};
use crate::content::{ContentNode, ContentType, NodeId};

/// One change inside a committed batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchEntry {
    Set(Arc<ContentNode>),
    Remove(NodeId),
    SetContentType(Arc<ContentType>),
    RemoveContentType(i32),
}

/// A batch read back from the journal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedBatch {
    pub generation: u64,
    pub entries: Vec<BatchEntry>,
}

/// Encodes a batch committed as `generation`.
///
/// Fails if any entry does not fit in a record; nothing is returned for a
/// batch that could not be read back whole.
pub fn encode_batch(generation: u64, entries: &[BatchEntry]) -> CodecResult<Vec<u8>> {
    let mut header = BodyWriter::new();
    header.u64(generation).u32(entries.len() as u32);

    let mut out = encode_frame(RecordKind::BatchHeader, CURRENT_SCHEMA_VERSION, &header.finish())?;
    for entry in entries {
        let encoded = match entry {
            BatchEntry::Set(node) => encode_node(node)?,
            BatchEntry::Remove(id) => encode_tombstone(*id)?,
            BatchEntry::SetContentType(content_type) => encode_content_type(content_type)?,
            BatchEntry::RemoveContentType(id) => encode_content_type_removal(*id)?,
        };
        out.extend(encoded);
    }
    Ok(out)
}

/// Decodes one batch from the start of `data`.
pub fn decode_batch(data: &[u8]) -> CodecResult<(DecodedBatch, usize)> {
    let (frame, mut offset) = expect_frame(data, RecordKind::BatchHeader)?;
    if frame.schema_version != CURRENT_SCHEMA_VERSION {
        return Err(CodecError::SchemaMismatch {
            found: frame.schema_version,
            expected: CURRENT_SCHEMA_VERSION,
        });
    }
    let mut r = BodyReader::new(frame.body);
    let generation = r.u64()?;
    let count = r.u32()? as usize;
    r.finish()?;

    let mut entries = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        let rest = &data[offset..];
        let (peek, peek_len) = decode_frame(rest)?;
        match peek.kind {
            RecordKind::Node => {
                let (node, consumed) = decode_node(rest)?;
                entries.push(BatchEntry::Set(Arc::new(node)));
                offset += consumed;
            }
            RecordKind::Tombstone => {
                let (frame, consumed) = expect_frame(rest, RecordKind::Tombstone)?;
                entries.push(BatchEntry::Remove(decode_tombstone_body(
                    frame.body,
                    frame.schema_version,
                )?));
                offset += consumed;
            }
            RecordKind::ContentType => {
                let content_type = deserialize_content_type(peek.body, peek.schema_version)?;
                entries.push(BatchEntry::SetContentType(Arc::new(content_type)));
                offset += peek_len;
            }
            RecordKind::ContentTypeRemoval => {
                let id = decode_content_type_removal_body(peek.body, peek.schema_version)?;
                entries.push(BatchEntry::RemoveContentType(id));
                offset += peek_len;
            }
            other => {
                return Err(CodecError::UnexpectedRecord {
                    expected: RecordKind::Node,
                    found: other,
                })
            }
        }
    }

    Ok((DecodedBatch { generation, entries }, offset))
}
