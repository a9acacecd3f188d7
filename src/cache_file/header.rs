//! Cache file header
//!
//! ```text
//! +------------------+
//! | Magic            | "NUCACHE1"
//! +------------------+
//! | Schema Version   | (u16 LE)
//! +------------------+
//! | Generation       | (u64 LE)
//! +------------------+
//! | Node Count       | (u64 LE)
//! +------------------+
//! | Created At       | (i64 LE, unix millis)
//! +------------------+
//! | Header Checksum  | (u32 LE) CRC32 over the preceding bytes
//! +------------------+
//! ```

use chrono::{DateTime, Utc};

use super::{CacheFileError, CacheFileResult};
use crate::codec::{compute_checksum, verify_checksum};

pub const MAGIC: &[u8; 8] = b"NUCACHE1";

pub const HEADER_SIZE: usize = 8 + 2 + 8 + 8 + 8 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheFileHeader {
    pub schema_version: u16,
    pub generation: u64,
    pub node_count: u64,
    pub created_at: DateTime<Utc>,
}

impl CacheFileHeader {
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..8].copy_from_slice(MAGIC);
        out[8..10].copy_from_slice(&self.schema_version.to_le_bytes());
        out[10..18].copy_from_slice(&self.generation.to_le_bytes());
        out[18..26].copy_from_slice(&self.node_count.to_le_bytes());
        out[26..34].copy_from_slice(&self.created_at.timestamp_millis().to_le_bytes());
        let checksum = compute_checksum(&out[..34]);
        out[34..38].copy_from_slice(&checksum.to_le_bytes());
        out
    }

    /// Decodes and checksums the header. The schema version is returned as
    /// found; callers decide whether it is readable.
    pub fn decode(data: &[u8]) -> CacheFileResult<Self> {
        if data.len() < HEADER_SIZE {
            return Err(CacheFileError::corrupt(format!(
                "file of {} bytes is shorter than the header",
                data.len()
            )));
        }
        if &data[0..8] != MAGIC {
            return Err(CacheFileError::corrupt("bad magic"));
        }
        let stored = u32::from_le_bytes([data[34], data[35], data[36], data[37]]);
        if !verify_checksum(&data[..34], stored) {
            return Err(CacheFileError::corrupt("header checksum mismatch"));
        }

        let u64_at = |at: usize| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&data[at..at + 8]);
            bytes
        };
        let millis = i64::from_le_bytes(u64_at(26));
        let created_at = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| CacheFileError::corrupt(format!("created_at {} out of range", millis)))?;

        Ok(Self {
            schema_version: u16::from_le_bytes([data[8], data[9]]),
            generation: u64::from_le_bytes(u64_at(10)),
            node_count: u64::from_le_bytes(u64_at(18)),
            created_at,
        })
    }
}
