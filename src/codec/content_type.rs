//! Content type record bodies
//!
//! ```text
//! id (i32) | key (16 bytes) | alias (str) | name (str)
//! | property count (u32) | property aliases (str each)
//! ```
//!
//! A removed content type is a ContentTypeRemoval frame carrying only its id.

use uuid::Uuid;

use super::record::{encode_frame, BodyReader, BodyWriter, RecordKind};
use super::{CodecError, CodecResult, CURRENT_SCHEMA_VERSION};
use crate::content::ContentType;

fn check_schema(found: u16) -> CodecResult<()> {
    if found == CURRENT_SCHEMA_VERSION {
        Ok(())
    } else {
        Err(CodecError::SchemaMismatch {
            found,
            expected: CURRENT_SCHEMA_VERSION,
        })
    }
}

pub fn serialize_content_type(content_type: &ContentType) -> Vec<u8> {
    let mut w = BodyWriter::new();
    w.i32(content_type.id())
        .raw(content_type.key().as_bytes())
        .str(content_type.alias())
        .str(content_type.name())
        .u32(content_type.property_aliases().len() as u32);
    for alias in content_type.property_aliases() {
        w.str(alias);
    }
    w.finish()
}

pub fn deserialize_content_type(body: &[u8], schema_version: u16) -> CodecResult<ContentType> {
    check_schema(schema_version)?;

    let mut r = BodyReader::new(body);
    let id = r.i32()?;
    let key = Uuid::from_bytes(r.raw::<16>()?);
    let alias = r.str()?;
    let name = r.str()?;
    let count = r.u32()? as usize;
    // Each alias needs at least its four byte length prefix.
    if count > body.len() / 4 {
        return Err(CodecError::corrupt(format!("property count {} too large", count)));
    }
    let mut content_type = ContentType::new(id, key, alias).with_name(name);
    for _ in 0..count {
        content_type = content_type.with_property(r.str()?);
    }
    r.finish()?;
    Ok(content_type)
}

/// Encodes a content type as a single ContentType frame.
pub fn encode_content_type(content_type: &ContentType) -> CodecResult<Vec<u8>> {
    encode_frame(
        RecordKind::ContentType,
        CURRENT_SCHEMA_VERSION,
        &serialize_content_type(content_type),
    )
}

/// Encodes the removal of content type `id`.
pub fn encode_content_type_removal(id: i32) -> CodecResult<Vec<u8>> {
    let mut w = BodyWriter::new();
    w.i32(id);
    encode_frame(RecordKind::ContentTypeRemoval, CURRENT_SCHEMA_VERSION, &w.finish())
}

pub(crate) fn decode_content_type_removal_body(body: &[u8], schema_version: u16) -> CodecResult<i32> {
    check_schema(schema_version)?;
    let mut r = BodyReader::new(body);
    let id = r.i32()?;
    r.finish()?;
    Ok(id)
}
