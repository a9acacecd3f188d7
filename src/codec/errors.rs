//! Codec error types
//!
//! Error codes:
//! - NUCACHE_CODEC_SCHEMA_MISMATCH (ERROR) - record written by an unsupported schema
//! - NUCACHE_CODEC_CORRUPT (FATAL) - checksum failure or malformed body
//! - NUCACHE_CODEC_TRUNCATED (FATAL) - input ends inside a record
//! - NUCACHE_CODEC_UNEXPECTED_RECORD (FATAL) - record kind out of sequence
//! - NUCACHE_CODEC_OVERSIZED (ERROR) - record length above the hard limit
//! - NUCACHE_CODEC_PAYLOAD (ERROR) - property payload encode/decode failure

use thiserror::Error;

use super::RecordKind;
use crate::errors::Severity;

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("schema version mismatch: found {found}, expected {expected}")]
    SchemaMismatch { found: u16, expected: u16 },

    #[error("corrupt record: {reason}")]
    Corrupt { reason: String },

    #[error("truncated record: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("unexpected record: expected {expected:?}, found {found:?}")]
    UnexpectedRecord {
        expected: RecordKind,
        found: RecordKind,
    },

    #[error("record of {size} bytes exceeds the {limit} byte limit")]
    Oversized { size: usize, limit: usize },

    #[error("property payload error: {reason}")]
    Payload { reason: String },
}

impl CodecError {
    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        CodecError::Corrupt {
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CodecError::SchemaMismatch { .. } => "NUCACHE_CODEC_SCHEMA_MISMATCH",
            CodecError::Corrupt { .. } => "NUCACHE_CODEC_CORRUPT",
            CodecError::Truncated { .. } => "NUCACHE_CODEC_TRUNCATED",
            CodecError::UnexpectedRecord { .. } => "NUCACHE_CODEC_UNEXPECTED_RECORD",
            CodecError::Oversized { .. } => "NUCACHE_CODEC_OVERSIZED",
            CodecError::Payload { .. } => "NUCACHE_CODEC_PAYLOAD",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            CodecError::Corrupt { .. }
            | CodecError::Truncated { .. }
            | CodecError::UnexpectedRecord { .. } => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    /// Returns true if the bytes are unreadable rather than merely from
    /// another schema.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            CodecError::Corrupt { .. }
                | CodecError::Truncated { .. }
                | CodecError::UnexpectedRecord { .. }
                | CodecError::Oversized { .. }
        )
    }

    /// Returns true if the input simply ran out inside a record, as after
    /// an interrupted append.
    pub fn is_truncation(&self) -> bool {
        matches!(self, CodecError::Truncated { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = CodecError::SchemaMismatch {
            found: 2,
            expected: 3,
        };
        assert_eq!(err.code(), "NUCACHE_CODEC_SCHEMA_MISMATCH");
        assert_eq!(err.severity(), Severity::Error);
        assert!(!err.is_corruption());

        let err = CodecError::corrupt("bad checksum");
        assert_eq!(err.severity(), Severity::Fatal);
        assert!(err.is_corruption());
        assert!(err.to_string().contains("bad checksum"));
        assert!(!err.is_truncation());

        let err = CodecError::Truncated {
            needed: 20,
            available: 3,
        };
        assert_eq!(err.code(), "NUCACHE_CODEC_TRUNCATED");
        assert!(err.is_corruption());
        assert!(err.is_truncation());
    }
}
