//! CLI module for nucache
//!
//! Provides command-line interface for:
//! - init: Write a default configuration
//! - status: Start the cache and report its state
//! - verify: Check the cache file and store
//! - collect: Run one collection pass
//! - rebuild: Rebuild from a content export
//! - reload: Load from the cache file and journal

mod args;
mod commands;
mod errors;
mod io;

pub use args::{CacheArgs, Cli, Command, LogFormatArg};
pub use commands::{collect, init, open_service, rebuild, reload, run, run_command, status, verify};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_response};
