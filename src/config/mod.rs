//! Cache configuration
//!
//! A JSON file, loaded and validated once at startup:
//!
//! ```json
//! {
//!   "data_dir": "/var/lib/nucache",
//!   "cache_file_name": "nucache.content.db",
//!   "journal_file_name": "nucache.content.journal",
//!   "collect_min_gen_delta": 8,
//!   "auto_collect": true,
//!   "rebuild_group_size": 1000,
//!   "journal_checkpoint_bytes": 16777216,
//!   "ignore_local_db": false,
//!   "log_level": "info"
//! }
//! ```
//!
//! Only `data_dir` is required.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("invalid config JSON: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding the cache file and the journal
    pub data_dir: PathBuf,

    #[serde(default = "default_cache_file_name")]
    pub cache_file_name: String,

    #[serde(default = "default_journal_file_name")]
    pub journal_file_name: String,

    /// Generations the live generation may run ahead of the last collection
    /// floor before a snapshot triggers an automatic collection
    #[serde(default = "default_collect_min_gen_delta")]
    pub collect_min_gen_delta: u64,

    #[serde(default = "default_true")]
    pub auto_collect: bool,

    /// Nodes loaded between cancellation checks during a rebuild
    #[serde(default = "default_rebuild_group_size")]
    pub rebuild_group_size: usize,

    /// Journal size past which a write rewrites the cache file at the live
    /// generation and resets the journal; 0 disables
    #[serde(default = "default_journal_checkpoint_bytes")]
    pub journal_checkpoint_bytes: u64,

    /// Skip the local cache file and journal; always build from the source
    #[serde(default)]
    pub ignore_local_db: bool,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_cache_file_name() -> String {
    "nucache.content.db".to_string()
}
fn default_journal_file_name() -> String {
    "nucache.content.journal".to_string()
}
fn default_collect_min_gen_delta() -> u64 {
    8
}
fn default_true() -> bool {
    true
}
fn default_rebuild_group_size() -> usize {
    1000
}
fn default_journal_checkpoint_bytes() -> u64 {
    16 * 1024 * 1024
}
fn default_log_level() -> String {
    "info".to_string()
}

impl CacheConfig {
    /// Default configuration rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            cache_file_name: default_cache_file_name(),
            journal_file_name: default_journal_file_name(),
            collect_min_gen_delta: default_collect_min_gen_delta(),
            auto_collect: true,
            rebuild_group_size: default_rebuild_group_size(),
            journal_checkpoint_bytes: default_journal_checkpoint_bytes(),
            ignore_local_db: false,
            log_level: default_log_level(),
        }
    }

    /// Loads and validates a configuration file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config: CacheConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("data_dir must not be empty".into()));
        }
        for (field, name) in [
            ("cache_file_name", &self.cache_file_name),
            ("journal_file_name", &self.journal_file_name),
        ] {
            if name.is_empty() || name.contains(['/', '\\']) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be a plain file name, got '{}'",
                    field, name
                )));
            }
        }
        if self.cache_file_name == self.journal_file_name {
            return Err(ConfigError::Invalid(
                "cache_file_name and journal_file_name must differ".into(),
            ));
        }
        if self.collect_min_gen_delta == 0 {
            return Err(ConfigError::Invalid("collect_min_gen_delta must be > 0".into()));
        }
        if self.rebuild_group_size == 0 {
            return Err(ConfigError::Invalid("rebuild_group_size must be > 0".into()));
        }
        Ok(())
    }

    /// Writes the configuration as pretty JSON.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        fs::write(path, json).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    pub fn cache_file_path(&self) -> PathBuf {
        self.data_dir.join(&self.cache_file_name)
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join(&self.journal_file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, value: serde_json::Value) -> PathBuf {
        let path = dir.path().join("nucache.json");
        fs::write(&path, value.to_string()).unwrap();
        path
    }

    #[test]
    fn test_config_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, json!({"data_dir": dir.path()}));

        let config = CacheConfig::load(&path).unwrap();
        assert_eq!(config.cache_file_name, "nucache.content.db");
        assert_eq!(config.journal_file_name, "nucache.content.journal");
        assert_eq!(config.collect_min_gen_delta, 8);
        assert!(config.auto_collect);
        assert_eq!(config.rebuild_group_size, 1000);
        assert_eq!(config.journal_checkpoint_bytes, 16 * 1024 * 1024);
        assert!(!config.ignore_local_db);
        assert_eq!(config.cache_file_path(), dir.path().join("nucache.content.db"));
    }

    #[test]
    fn test_config_rejects_zero_group_size() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, json!({"data_dir": dir.path(), "rebuild_group_size": 0}));
        assert!(matches!(CacheConfig::load(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_config_rejects_path_in_file_name() {
        let mut config = CacheConfig::new("/tmp/x");
        config.cache_file_name = "../escape.db".into();
        assert!(config.validate().is_err());

        let mut config = CacheConfig::new("/tmp/x");
        config.journal_file_name = config.cache_file_name.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_missing_file_and_bad_json() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            CacheConfig::load(&dir.path().join("absent.json")),
            Err(ConfigError::Read { .. })
        ));

        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(CacheConfig::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nucache.json");
        let mut config = CacheConfig::new(dir.path());
        config.auto_collect = false;
        config.save(&path).unwrap();
        assert_eq!(CacheConfig::load(&path).unwrap(), config);
    }
}
