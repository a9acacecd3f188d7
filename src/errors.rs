//! Cache-level error types
//!
//! Error codes:
//! - NUCACHE_SCHEMA_MISMATCH (ERROR) - cache file from another schema, forces rebuild
//! - NUCACHE_WRITE_BATCH_FAILED (ERROR) - batch discarded, prior generation stays current
//! - NUCACHE_REBUILD_FAILED (ERROR) - previous store stays live, status unhealthy
//! - NUCACHE_REBUILD_CANCELLED (ERROR) - previous store stays live, status healthy
//! - NUCACHE_REBUILD_IN_PROGRESS (ERROR) - a rebuild or reload is already running
//! - NUCACHE_CORRUPT_CACHE_FILE (FATAL) - recovered by falling back to rebuild
//! - NUCACHE_CACHE_FILE_MISSING (ERROR) - nothing to reload from
//! - NUCACHE_IO (ERROR) - filesystem failure outside the cache file
//! - NUCACHE_CONFIG (FATAL) - invalid configuration at load time

use std::fmt;

use thiserror::Error;

use crate::cache_file::CacheFileError;
use crate::codec::CodecError;
use crate::config::ConfigError;

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Severity levels shared by every error type in the crate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, cache continues serving
    Error,
    /// State on disk or in configuration cannot be trusted
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("cache schema mismatch: found {found}, expected {expected}")]
    SchemaMismatch { found: u16, expected: u16 },

    #[error("write batch failed: {reason}")]
    WriteBatchFailed { reason: String },

    #[error("rebuild failed: {reason}")]
    RebuildFailed { reason: String },

    #[error("rebuild cancelled")]
    RebuildCancelled,

    #[error("a rebuild or reload is already in progress")]
    RebuildInProgress,

    #[error("corrupt cache file: {reason}")]
    CorruptCacheFile { reason: String },

    #[error("cache file not found: {path}")]
    CacheFileMissing { path: String },

    #[error("{context}: {reason}")]
    Io { context: String, reason: String },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl CacheError {
    pub fn write_batch_failed(reason: impl fmt::Display) -> Self {
        CacheError::WriteBatchFailed {
            reason: reason.to_string(),
        }
    }

    pub fn rebuild_failed(reason: impl fmt::Display) -> Self {
        CacheError::RebuildFailed {
            reason: reason.to_string(),
        }
    }

    pub fn io(context: impl Into<String>, err: std::io::Error) -> Self {
        CacheError::Io {
            context: context.into(),
            reason: err.to_string(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CacheError::SchemaMismatch { .. } => "NUCACHE_SCHEMA_MISMATCH",
            CacheError::WriteBatchFailed { .. } => "NUCACHE_WRITE_BATCH_FAILED",
            CacheError::RebuildFailed { .. } => "NUCACHE_REBUILD_FAILED",
            CacheError::RebuildCancelled => "NUCACHE_REBUILD_CANCELLED",
            CacheError::RebuildInProgress => "NUCACHE_REBUILD_IN_PROGRESS",
            CacheError::CorruptCacheFile { .. } => "NUCACHE_CORRUPT_CACHE_FILE",
            CacheError::CacheFileMissing { .. } => "NUCACHE_CACHE_FILE_MISSING",
            CacheError::Io { .. } => "NUCACHE_IO",
            CacheError::Config(_) => "NUCACHE_CONFIG",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            CacheError::CorruptCacheFile { .. } | CacheError::Config(_) => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    /// Returns true if the on-disk cache cannot be loaded and a rebuild from
    /// the content source is the recovery path.
    pub fn requires_rebuild(&self) -> bool {
        matches!(
            self,
            CacheError::SchemaMismatch { .. }
                | CacheError::CorruptCacheFile { .. }
                | CacheError::CacheFileMissing { .. }
        )
    }
}

impl From<CodecError> for CacheError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::SchemaMismatch { found, expected } => {
                CacheError::SchemaMismatch { found, expected }
            }
            other => CacheError::CorruptCacheFile {
                reason: other.to_string(),
            },
        }
    }
}

impl From<CacheFileError> for CacheError {
    fn from(err: CacheFileError) -> Self {
        match err {
            CacheFileError::SchemaMismatch {
                found, expected, ..
            } => CacheError::SchemaMismatch { found, expected },
            CacheFileError::Missing { path } => CacheError::CacheFileMissing { path },
            CacheFileError::Io { context, reason } => CacheError::Io { context, reason },
            other @ (CacheFileError::Corrupt { .. } | CacheFileError::Codec(_)) => {
                CacheError::CorruptCacheFile {
                    reason: other.to_string(),
                }
            }
            CacheFileError::Encode(err) => CacheError::Io {
                context: "encode cache file".to_string(),
                reason: err.to_string(),
            },
        }
    }
}
