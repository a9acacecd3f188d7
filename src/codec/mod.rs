//! Binary record codec
//!
//! Converts content nodes, their versions and content types to checksummed
//! records and back. The same records make up the cache file and the change journal.
//!
//! Guarantees:
//! - A checksum failure is always `Corrupt` and a short input `Truncated`, never a partial value
//! - No encoder produces a record the decoder would reject as `Oversized`
//! - Schema 2 version records are upgraded on read
//! - Any other foreign schema is `SchemaMismatch`

mod batch;
mod checksum;
mod content_type;
mod errors;
mod node;
mod record;

pub use batch::{decode_batch, encode_batch, BatchEntry, DecodedBatch};
pub use checksum::{compute_checksum, format_checksum, verify_checksum};
pub use content_type::{
    deserialize_content_type, encode_content_type, encode_content_type_removal,
    serialize_content_type,
};
pub use errors::{CodecError, CodecResult};
pub use node::{
    decode_node, deserialize_node, deserialize_version, encode_node, encode_tombstone,
    serialize_node, serialize_version, NodeHeader,
};
pub use record::{
    decode_frame, encode_frame, expect_frame, BodyReader, BodyWriter, Frame, RecordKind,
    FRAME_OVERHEAD, MAX_RECORD_SIZE,
};

pub use crate::content::PAYLOAD_SCHEMA_VERSION;

/// Record schema written by this build.
pub const CURRENT_SCHEMA_VERSION: u16 = 3;

/// Oldest record schema that is still upgraded on read.
pub const LEGACY_SCHEMA_VERSION: u16 = 2;
