//! Record framing
//!
//! Every record on disk, in the cache file and in the change journal, uses
//! the same frame:
//!
//! ```text
//! +------------------+
//! | Record Length    | (u32 LE) total length including this field
//! +------------------+
//! | Kind             | (u8)
//! +------------------+
//! | Schema Version   | (u16 LE)
//! +------------------+
//! | Body             | (variable)
//! +------------------+
//! | Checksum         | (u32 LE) CRC32 over every preceding byte
//! +------------------+
//! ```
//!
//! Strings and blobs inside a body are prefixed with their u32 LE length.

use chrono::{DateTime, Utc};

use super::checksum::{compute_checksum, verify_checksum};
use super::{CodecError, CodecResult};

/// Length + kind + schema + checksum.
pub const FRAME_OVERHEAD: usize = 4 + 1 + 2 + 4;

/// Hard upper bound on a single record.
pub const MAX_RECORD_SIZE: usize = 64 * 1024 * 1024;

/// Kind tag of a framed record.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RecordKind {
    /// Node metadata, followed by its version records
    Node = 1,
    /// One content version
    Version = 2,
    /// Removal of a node
    Tombstone = 3,
    /// Start of a committed journal batch
    BatchHeader = 4,
    /// One content type
    ContentType = 5,
    /// Removal of a content type
    ContentTypeRemoval = 6,
}

impl RecordKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(RecordKind::Node),
            2 => Some(RecordKind::Version),
            3 => Some(RecordKind::Tombstone),
            4 => Some(RecordKind::BatchHeader),
            5 => Some(RecordKind::ContentType),
            6 => Some(RecordKind::ContentTypeRemoval),
            _ => None,
        }
    }
}

/// A decoded frame borrowing its body from the input.
#[derive(Debug)]
pub struct Frame<'a> {
    pub kind: RecordKind,
    pub schema_version: u16,
    pub body: &'a [u8],
}

/// Wraps `body` in a checksummed frame.
///
/// Fails with [`CodecError::Oversized`] if the frame would exceed
/// [`MAX_RECORD_SIZE`], since `decode_frame` could never read it back.
pub fn encode_frame(kind: RecordKind, schema_version: u16, body: &[u8]) -> CodecResult<Vec<u8>> {
    let size = FRAME_OVERHEAD + body.len();
    if size > MAX_RECORD_SIZE {
        return Err(CodecError::Oversized {
            size,
            limit: MAX_RECORD_SIZE,
        });
    }
    let record_length = size as u32;

    let mut record = Vec::with_capacity(record_length as usize);
    record.extend_from_slice(&record_length.to_le_bytes());
    record.push(kind as u8);
    record.extend_from_slice(&schema_version.to_le_bytes());
    record.extend_from_slice(body);

    let checksum = compute_checksum(&record);
    record.extend_from_slice(&checksum.to_le_bytes());
    Ok(record)
}

/// Reads one frame from the start of `data`.
///
/// Returns the frame and the number of bytes consumed. The checksum is
/// verified before the kind or schema is interpreted.
pub fn decode_frame(data: &[u8]) -> CodecResult<(Frame<'_>, usize)> {
    if data.len() < 4 {
        return Err(CodecError::Truncated {
            needed: 4,
            available: data.len(),
        });
    }

    let record_length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if record_length < FRAME_OVERHEAD {
        return Err(CodecError::corrupt(format!(
            "record length {} below minimum {}",
            record_length, FRAME_OVERHEAD
        )));
    }
    if record_length > MAX_RECORD_SIZE {
        return Err(CodecError::Oversized {
            size: record_length,
            limit: MAX_RECORD_SIZE,
        });
    }
    if data.len() < record_length {
        return Err(CodecError::Truncated {
            needed: record_length,
            available: data.len(),
        });
    }

    let checksum_offset = record_length - 4;
    let stored = u32::from_le_bytes([
        data[checksum_offset],
        data[checksum_offset + 1],
        data[checksum_offset + 2],
        data[checksum_offset + 3],
    ]);
    if !verify_checksum(&data[..checksum_offset], stored) {
        return Err(CodecError::corrupt("checksum mismatch"));
    }

    let kind = RecordKind::from_u8(data[4])
        .ok_or_else(|| CodecError::corrupt(format!("unknown record kind {}", data[4])))?;
    let schema_version = u16::from_le_bytes([data[5], data[6]]);

    Ok((
        Frame {
            kind,
            schema_version,
            body: &data[7..checksum_offset],
        },
        record_length,
    ))
}

/// Reads a frame and checks its kind.
pub fn expect_frame(data: &[u8], expected: RecordKind) -> CodecResult<(Frame<'_>, usize)> {
    let (frame, consumed) = decode_frame(data)?;
    if frame.kind != expected {
        return Err(CodecError::UnexpectedRecord {
            expected,
            found: frame.kind,
        });
    }
    Ok((frame, consumed))
}

/// Little-endian body writer.
#[derive(Debug, Default)]
pub struct BodyWriter {
    buf: Vec<u8>,
}

impl BodyWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i32(&mut self, v: i32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i64(&mut self, v: i64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn opt_i32(&mut self, v: Option<i32>) -> &mut Self {
        match v {
            Some(v) => self.u8(1).i32(v),
            None => self.u8(0),
        }
    }

    pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.u32(v.len() as u32);
        self.buf.extend_from_slice(v);
        self
    }

    pub fn str(&mut self, v: &str) -> &mut Self {
        self.bytes(v.as_bytes())
    }

    pub fn raw(&mut self, v: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(v);
        self
    }

    pub fn timestamp(&mut self, v: DateTime<Utc>) -> &mut Self {
        self.i64(v.timestamp_millis())
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Little-endian body reader. Every read past the end is `Corrupt`.
#[derive(Debug)]
pub struct BodyReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BodyReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| CodecError::corrupt("record body truncated"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> CodecResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> CodecResult<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> CodecResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> CodecResult<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> CodecResult<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub fn i64(&mut self) -> CodecResult<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    pub fn opt_i32(&mut self) -> CodecResult<Option<i32>> {
        match self.u8()? {
            0 => Ok(None),
            1 => Ok(Some(self.i32()?)),
            other => Err(CodecError::corrupt(format!("invalid option tag {}", other))),
        }
    }

    pub fn bytes(&mut self) -> CodecResult<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    pub fn str(&mut self) -> CodecResult<String> {
        let bytes = self.bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::corrupt("invalid utf-8 string"))
    }

    pub fn raw<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        self.array()
    }

    pub fn timestamp(&mut self) -> CodecResult<DateTime<Utc>> {
        let millis = self.i64()?;
        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| CodecError::corrupt(format!("timestamp {} out of range", millis)))
    }

    /// Fails unless every byte of the body was consumed.
    pub fn finish(self) -> CodecResult<()> {
        if self.pos != self.data.len() {
            return Err(CodecError::corrupt(format!(
                "{} trailing bytes in record body",
                self.data.len() - self.pos
            )));
        }
        Ok(())
    }
}
