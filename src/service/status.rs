//! Status and verification reports

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache_file::CacheFileInfo;
use crate::rebuild::{CacheState, RebuildReport, ReloadReport};
use crate::store::Generation;

/// Point-in-time view of the cache, safe to take at any moment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    /// Distinct generations currently pinned by snapshots
    pub generation_count: usize,
    /// Live snapshots across all pinned generations
    pub snapshot_count: usize,
    pub live_generation: Generation,
    pub last_floor: Generation,
    pub node_count: usize,
    pub entry_count: usize,
    pub last_rebuild: Option<DateTime<Utc>>,
    pub last_reload: Option<DateTime<Utc>>,
    pub state: CacheState,
    pub is_healthy: bool,
    /// Why the cache is unhealthy
    pub reason: Option<String>,
}

/// Result of checking the store and the cache file without mutating either.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub live_generation: Generation,
    pub node_count: usize,
    /// Structural problems in the in-memory store
    pub store_problems: Vec<String>,
    /// Present when the cache file passed every check
    pub cache_file: Option<CacheFileInfo>,
    pub cache_file_error: Option<String>,
    pub is_consistent: bool,
}

/// How the cache came up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum StartupReport {
    /// Loaded from the local cache file
    Reloaded(ReloadReport),
    /// Built from the content source
    Rebuilt {
        /// Why the cache file was not used
        reason: String,
        #[serde(flatten)]
        report: RebuildReport,
    },
}

impl StartupReport {
    pub fn generation(&self) -> Generation {
        match self {
            StartupReport::Reloaded(report) => report.generation,
            StartupReport::Rebuilt { report, .. } => report.generation,
        }
    }

    pub fn was_rebuilt(&self) -> bool {
        matches!(self, StartupReport::Rebuilt { .. })
    }
}
