//! Node and version record bodies
//!
//! Version body, schema 3:
//!
//! ```text
//! culture (str) | state (u8) | version id (i32) | name (str) | url segment (str)
//! | template id (opt i32) | created (i64 ms) | updated (i64 ms)
//! | payload schema (u16) | payload (bytes)
//! ```
//!
//! Schema 2 lacks the url segment and template id; such records are
//! upgraded on read with the segment derived from the name.
//!
//! Node body (schemas 2 and 3):
//!
//! ```text
//! id (i32) | key (16 bytes) | content type (i32) | parent (opt i32)
//! | path count (u32) | path ids (i32 each) | sort order (i32) | version count (u32)
//! ```

use uuid::Uuid;

use super::record::{encode_frame, expect_frame, BodyReader, BodyWriter, RecordKind};
use super::{CodecError, CodecResult, CURRENT_SCHEMA_VERSION, LEGACY_SCHEMA_VERSION};
use crate::content::{
    default_url_segment, ContentNode, ContentNodeVersion, NodeId, PropertyPayload, PublishState,
};

/// Decoded node metadata, before its versions are attached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeHeader {
    pub id: NodeId,
    pub key: Uuid,
    pub content_type_id: i32,
    pub parent_id: Option<NodeId>,
    pub path: Vec<NodeId>,
    pub sort_order: i32,
    pub version_count: u32,
}

fn check_schema(found: u16) -> CodecResult<()> {
    if found == CURRENT_SCHEMA_VERSION || found == LEGACY_SCHEMA_VERSION {
        Ok(())
    } else {
        Err(CodecError::SchemaMismatch {
            found,
            expected: CURRENT_SCHEMA_VERSION,
        })
    }
}

/// Serializes a version body with the current schema.
pub fn serialize_version(version: &ContentNodeVersion) -> Vec<u8> {
    let mut w = BodyWriter::new();
    w.str(version.culture())
        .u8(version.state().as_u8())
        .i32(version.version_id())
        .str(version.name())
        .str(version.url_segment())
        .opt_i32(version.template_id())
        .timestamp(version.created_at())
        .timestamp(version.updated_at())
        .u16(version.payload().schema_version())
        .bytes(version.payload().bytes());
    w.finish()
}

/// Deserializes a version body written with `schema_version`.
pub fn deserialize_version(body: &[u8], schema_version: u16) -> CodecResult<ContentNodeVersion> {
    check_schema(schema_version)?;
    let legacy = schema_version == LEGACY_SCHEMA_VERSION;

    let mut r = BodyReader::new(body);
    let culture = r.str()?;
    let state_tag = r.u8()?;
    let state = PublishState::from_u8(state_tag)
        .ok_or_else(|| CodecError::corrupt(format!("invalid publish state {}", state_tag)))?;
    let version_id = r.i32()?;
    let name = r.str()?;
    let (url_segment, template_id) = if legacy {
        (default_url_segment(&name), None)
    } else {
        (r.str()?, r.opt_i32()?)
    };
    let created_at = r.timestamp()?;
    let updated_at = r.timestamp()?;
    let payload_schema = r.u16()?;
    let payload = r.bytes()?.to_vec();
    r.finish()?;

    Ok(
        ContentNodeVersion::new(culture, state, name, PropertyPayload::from_raw(payload_schema, payload))
            .with_version_id(version_id)
            .with_url_segment(url_segment)
            .with_template(template_id)
            .with_timestamps(created_at, updated_at),
    )
}

/// Serializes node metadata (without versions).
pub fn serialize_node(node: &ContentNode) -> Vec<u8> {
    let mut w = BodyWriter::new();
    w.i32(node.id().value())
        .raw(node.key().as_bytes())
        .i32(node.content_type_id())
        .opt_i32(node.parent_id().map(|p| p.value()))
        .u32(node.path().len() as u32);
    for ancestor in node.path() {
        w.i32(ancestor.value());
    }
    w.i32(node.sort_order()).u32(node.versions().len() as u32);
    w.finish()
}

/// Deserializes node metadata.
pub fn deserialize_node(body: &[u8], schema_version: u16) -> CodecResult<NodeHeader> {
    check_schema(schema_version)?;

    let mut r = BodyReader::new(body);
    let id = NodeId::new(r.i32()?);
    let key = Uuid::from_bytes(r.raw::<16>()?);
    let content_type_id = r.i32()?;
    let parent_id = r.opt_i32()?.map(NodeId::new);
    let path_len = r.u32()? as usize;
    // Each id needs four bytes, so a larger count is certainly corrupt.
    if path_len > body.len() / 4 {
        return Err(CodecError::corrupt(format!("path length {} too large", path_len)));
    }
    let mut path = Vec::with_capacity(path_len);
    for _ in 0..path_len {
        path.push(NodeId::new(r.i32()?));
    }
    let sort_order = r.i32()?;
    let version_count = r.u32()?;
    r.finish()?;

    Ok(NodeHeader {
        id,
        key,
        content_type_id,
        parent_id,
        path,
        sort_order,
        version_count,
    })
}

/// Encodes a node as one Node frame followed by one Version frame per version.
///
/// Fails with `Oversized` if any single version would not fit in a record.
pub fn encode_node(node: &ContentNode) -> CodecResult<Vec<u8>> {
    let mut out = encode_frame(RecordKind::Node, CURRENT_SCHEMA_VERSION, &serialize_node(node))?;
    for version in node.versions() {
        out.extend(encode_frame(
            RecordKind::Version,
            CURRENT_SCHEMA_VERSION,
            &serialize_version(version),
        )?);
    }
    Ok(out)
}

/// Decodes a node group written by [`encode_node`].
///
/// Returns the node and the number of bytes consumed.
pub fn decode_node(data: &[u8]) -> CodecResult<(ContentNode, usize)> {
    let (frame, mut offset) = expect_frame(data, RecordKind::Node)?;
    let header = deserialize_node(frame.body, frame.schema_version)?;

    let mut builder = ContentNode::builder(header.id, header.key, header.content_type_id)
        .sort_order(header.sort_order);
    if let Some(parent) = header.parent_id {
        builder = builder.parent(parent, header.path.clone());
    } else if !header.path.is_empty() {
        return Err(CodecError::corrupt(format!(
            "root node {} carries a path",
            header.id
        )));
    }

    for _ in 0..header.version_count {
        let (frame, consumed) = expect_frame(&data[offset..], RecordKind::Version)?;
        builder = builder.version(deserialize_version(frame.body, frame.schema_version)?);
        offset += consumed;
    }

    let node = builder
        .build()
        .map_err(|e| CodecError::corrupt(e.to_string()))?;
    Ok((node, offset))
}

/// Encodes a node removal.
pub fn encode_tombstone(id: NodeId) -> CodecResult<Vec<u8>> {
    let mut w = BodyWriter::new();
    w.i32(id.value());
    encode_frame(RecordKind::Tombstone, CURRENT_SCHEMA_VERSION, &w.finish())
}

pub(crate) fn decode_tombstone_body(body: &[u8], schema_version: u16) -> CodecResult<NodeId> {
    check_schema(schema_version)?;
    let mut r = BodyReader::new(body);
    let id = NodeId::new(r.i32()?);
    r.finish()?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::record::{decode_frame, MAX_RECORD_SIZE};
    use crate::content::{Properties, PropertyData};
    use chrono::{TimeZone, Utc};

    fn sample_version(culture: &str, state: PublishState) -> ContentNodeVersion {
        let props = Properties::new().with("title", PropertyData::Text("Hello".into()));
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        ContentNodeVersion::new(culture, state, "Hello World", PropertyPayload::encode(&props).unwrap())
            .with_version_id(77)
            .with_template(Some(1040))
            .with_timestamps(at, at)
    }

    fn sample_node() -> ContentNode {
        ContentNode::builder(NodeId::new(42), Uuid::new_v4(), 1051)
            .parent(NodeId::new(7), vec![NodeId::new(1), NodeId::new(7)])
            .sort_order(4)
            .version(sample_version("en-US", PublishState::Published))
            .version(sample_version("en-US", PublishState::Draft))
            .build()
            .unwrap()
    }

    #[test]
    fn test_version_roundtrip() {
        let v = sample_version("en-US", PublishState::Published);
        let body = serialize_version(&v);
        assert_eq!(deserialize_version(&body, CURRENT_SCHEMA_VERSION).unwrap(), v);
    }

    #[test]
    fn test_legacy_version_upgraded() {
        let mut w = BodyWriter::new();
        w.str("")
            .u8(PublishState::Published.as_u8())
            .i32(5)
            .str("About Us")
            .i64(1_700_000_000_000)
            .i64(1_700_000_000_000)
            .u16(1)
            .bytes(b"{}");

        let v = deserialize_version(&w.finish(), LEGACY_SCHEMA_VERSION).unwrap();
        assert_eq!(v.name(), "About Us");
        assert_eq!(v.url_segment(), "about-us");
        assert_eq!(v.template_id(), None);
        assert_eq!(v.version_id(), 5);
    }

    #[test]
    fn test_unknown_schema_is_mismatch() {
        let body = serialize_version(&sample_version("", PublishState::Draft));
        assert_eq!(
            deserialize_version(&body, 4).unwrap_err(),
            CodecError::SchemaMismatch {
                found: 4,
                expected: CURRENT_SCHEMA_VERSION
            }
        );
        assert!(matches!(
            deserialize_version(&body, 1),
            Err(CodecError::SchemaMismatch { found: 1, .. })
        ));
    }

    #[test]
    fn test_node_roundtrip() {
        let node = sample_node();
        let encoded = encode_node(&node).unwrap();
        let (decoded, consumed) = decode_node(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded, node);
    }

    #[test]
    fn test_node_missing_version_frame_is_corrupt() {
        let node = sample_node();
        let encoded = encode_node(&node).unwrap();
        let (_, node_frame_len) = decode_frame(&encoded).unwrap();
        let err = decode_node(&encoded[..node_frame_len]).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_tombstone_frame() {
        let encoded = encode_tombstone(NodeId::new(9)).unwrap();
        let (frame, _) = expect_frame(&encoded, RecordKind::Tombstone).unwrap();
        assert_eq!(
            decode_tombstone_body(frame.body, frame.schema_version).unwrap(),
            NodeId::new(9)
        );
    }

    #[test]
    fn test_oversized_version_is_rejected() {
        let version = ContentNodeVersion::new(
            "",
            PublishState::Published,
            "Huge",
            PropertyPayload::from_raw(1, vec![b'x'; MAX_RECORD_SIZE]),
        );
        let node = ContentNode::builder(NodeId::new(2), Uuid::from_u128(2), 1)
            .version(version)
            .build()
            .unwrap();

        let err = encode_node(&node).unwrap_err();
        assert!(matches!(err, CodecError::Oversized { limit: MAX_RECORD_SIZE, .. }));
    }
}
