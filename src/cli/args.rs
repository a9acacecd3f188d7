//! CLI argument definitions using clap
//!
//! Commands:
//! - nucache init --config <path> --data-dir <dir>
//! - nucache status --config <path> [--source <export.json>]
//! - nucache verify --config <path> [--source <export.json>]
//! - nucache collect --config <path> [--source <export.json>]
//! - nucache rebuild --config <path> [--source <export.json>]
//! - nucache reload --config <path> [--source <export.json>]

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// nucache - generational published content cache
#[derive(Parser, Debug)]
#[command(name = "nucache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log output format (logs go to stderr)
    #[arg(long, value_enum, default_value_t = LogFormatArg::Json, global = true)]
    pub log_format: LogFormatArg,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Json,
    Compact,
}

/// Options shared by every command that opens the cache.
#[derive(Args, Debug, Clone)]
pub struct CacheArgs {
    /// Path to configuration file
    #[arg(long, default_value = "./nucache.json")]
    pub config: PathBuf,

    /// JSON content export to use as the content source
    #[arg(long)]
    pub source: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a default configuration and create the data directory
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./nucache.json")]
        config: PathBuf,

        /// Directory for the cache file and journal
        #[arg(long, default_value = "./nucache-data")]
        data_dir: PathBuf,
    },

    /// Start the cache and report its status
    Status(CacheArgs),

    /// Check the cache file and the loaded store
    Verify(CacheArgs),

    /// Start the cache and run one collection pass
    Collect(CacheArgs),

    /// Rebuild the cache from the content source (Ctrl-C cancels)
    Rebuild(CacheArgs),

    /// Load the cache from the cache file and journal
    Reload(CacheArgs),
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
