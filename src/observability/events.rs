//! Observable cache lifecycle events
//!
//! Events are explicit and typed; each maps to a stable name emitted as the
//! `event` field of a tracing record.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Startup
    StartupBegin,
    StartupComplete,
    ConfigLoaded,

    // Writes
    /// A write batch committed as a new generation
    BatchCommitted,
    /// A write batch was discarded
    BatchRejected,
    /// A node was skipped because its parent is absent
    NodeSkipped,
    /// Changes queued while a rebuild is running
    ChangesQueued,

    // Collection
    CollectBegin,
    CollectComplete,

    // Rebuild / reload
    RebuildBegin,
    RebuildComplete,
    RebuildFailed,
    RebuildCancelled,
    ReloadBegin,
    ReloadComplete,
    ReloadFailed,

    // Cache file and journal
    CacheFileWritten,
    /// The cache file failed validation (FATAL)
    CacheFileCorrupt,
    CacheSchemaMismatch,
    JournalReplayed,
    JournalReset,
    /// The journal ended in a partially written batch
    JournalTornTail,
    /// The live generation was written to the cache file and the journal reset
    CheckpointWritten,
    CheckpointFailed,

    // Verification
    VerifyBegin,
    VerifyComplete,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::StartupBegin => "CACHE_STARTUP_BEGIN",
            Event::StartupComplete => "CACHE_STARTUP_COMPLETE",
            Event::ConfigLoaded => "CONFIG_LOADED",

            Event::BatchCommitted => "WRITE_COMMIT",
            Event::BatchRejected => "WRITE_REJECTED",
            Event::NodeSkipped => "WRITE_NODE_SKIPPED",
            Event::ChangesQueued => "WRITE_QUEUED_FOR_REBUILD",

            Event::CollectBegin => "COLLECT_BEGIN",
            Event::CollectComplete => "COLLECT_COMPLETE",

            Event::RebuildBegin => "CACHE_REBUILD_BEGIN",
            Event::RebuildComplete => "CACHE_REBUILD_COMPLETE",
            Event::RebuildFailed => "CACHE_REBUILD_FAILED",
            Event::RebuildCancelled => "CACHE_REBUILD_CANCELLED",
            Event::ReloadBegin => "CACHE_RELOAD_BEGIN",
            Event::ReloadComplete => "CACHE_RELOAD_COMPLETE",
            Event::ReloadFailed => "CACHE_RELOAD_FAILED",

            Event::CacheFileWritten => "CACHE_FILE_WRITTEN",
            Event::CacheFileCorrupt => "CACHE_FILE_CORRUPT",
            Event::CacheSchemaMismatch => "CACHE_SCHEMA_MISMATCH",
            Event::JournalReplayed => "JOURNAL_REPLAYED",
            Event::JournalReset => "JOURNAL_RESET",
            Event::JournalTornTail => "JOURNAL_TORN_TAIL",
            Event::CheckpointWritten => "JOURNAL_CHECKPOINT_WRITTEN",
            Event::CheckpointFailed => "JOURNAL_CHECKPOINT_FAILED",

            Event::VerifyBegin => "VERIFICATION_BEGIN",
            Event::VerifyComplete => "VERIFICATION_COMPLETE",
        }
    }

    /// Events that indicate the on-disk cache cannot be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::CacheFileCorrupt)
    }

    /// Events that are reported at WARN level.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Event::BatchRejected
                | Event::NodeSkipped
                | Event::RebuildFailed
                | Event::ReloadFailed
                | Event::CacheSchemaMismatch
                | Event::JournalTornTail
                | Event::CheckpointFailed
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(Event::RebuildBegin.as_str(), "CACHE_REBUILD_BEGIN");
        assert_eq!(Event::BatchCommitted.to_string(), "WRITE_COMMIT");
    }

    #[test]
    fn test_fatal_and_warning_classes() {
        assert!(Event::CacheFileCorrupt.is_fatal());
        assert!(!Event::RebuildFailed.is_fatal());
        assert!(Event::NodeSkipped.is_warning());
        assert!(!Event::CollectComplete.is_warning());
    }
}
