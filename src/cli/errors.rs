//! CLI-specific error types
//!
//! Cache errors keep their own code; everything else is a CLI code.

use std::fmt;
use std::io;

use crate::config::ConfigError;
use crate::errors::CacheError;
use crate::source::SourceError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (stdout, data directory)
    IoError,
    /// Configuration file already exists
    AlreadyInitialized,
    /// Content export could not be loaded
    SourceError,
    /// A cache operation failed; carries the cache error code
    Cache(&'static str),
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "NUCACHE_CLI_CONFIG_ERROR",
            Self::IoError => "NUCACHE_CLI_IO_ERROR",
            Self::AlreadyInitialized => "NUCACHE_CLI_ALREADY_INITIALIZED",
            Self::SourceError => "NUCACHE_CLI_SOURCE_ERROR",
            Self::Cache(code) => code,
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn already_initialized(path: impl fmt::Display) -> Self {
        Self::new(
            CliErrorCode::AlreadyInitialized,
            format!("Configuration already exists at {}", path),
        )
    }

    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<SourceError> for CliError {
    fn from(e: SourceError) -> Self {
        Self::new(CliErrorCode::SourceError, format!("{}: {}", e.code(), e))
    }
}

impl From<CacheError> for CliError {
    fn from(e: CacheError) -> Self {
        Self::new(CliErrorCode::Cache(e.code()), e.to_string())
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
