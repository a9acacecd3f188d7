//! CRC32 checksums for cache records
//!
//! Every record read from the cache file or the change journal is validated
//! against its trailing checksum before any field is decoded.

use crc32fast::Hasher;

/// Computes a CRC32 (IEEE) checksum over `data`.
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Verifies that the computed checksum matches the expected checksum.
pub fn verify_checksum(data: &[u8], expected: u32) -> bool {
    compute_checksum(data) == expected
}

/// Formats a checksum for reports, e.g. `crc32:0a1b2c3d`.
pub fn format_checksum(checksum: u32) -> String {
    format!("crc32:{:08x}", checksum)
}
