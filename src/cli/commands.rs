//! CLI command implementations
//!
//! Each command opens the cache from its configuration file, performs one
//! operation and returns the JSON data for the response. The process holds
//! no state between invocations: commands that need a populated store run
//! the startup sequence first.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::config::CacheConfig;
use crate::observability::{init_tracing, Event, LogFormat};
use crate::service::PublishedSnapshotService;
use crate::source::{ContentSource, MemoryContentSource};
use crate::writer::{ChangeJournal, FileJournal, NullJournal};

use super::args::{CacheArgs, Cli, Command, LogFormatArg};
use super::errors::{CliError, CliResult};
use super::io::write_response;

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Json => LogFormat::Json,
            LogFormatArg::Compact => LogFormat::Compact,
        }
    }
}

/// Parses arguments, runs the command and writes its response.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    let data = run_command(&cli)?;
    write_response(data)
}

/// Runs a parsed command and returns its response data.
pub fn run_command(cli: &Cli) -> CliResult<Value> {
    let format = LogFormat::from(cli.log_format);
    match &cli.command {
        Command::Init { config, data_dir } => {
            init_tracing(format, "info");
            init(config, data_dir)
        }
        Command::Status(args) => status(&open_service(args, format)?),
        Command::Verify(args) => verify(&open_service(args, format)?),
        Command::Collect(args) => collect(&open_service(args, format)?),
        Command::Rebuild(args) => rebuild(Arc::new(open_service(args, format)?)),
        Command::Reload(args) => reload(&open_service(args, format)?),
    }
}

/// Builds the service described by `args`. Nothing is loaded yet.
pub fn open_service(args: &CacheArgs, format: LogFormat) -> CliResult<PublishedSnapshotService> {
    let config = CacheConfig::load(&args.config)?;
    init_tracing(format, &config.log_level);
    crate::log_event!(
        Event::ConfigLoaded,
        path = %args.config.display(),
        data_dir = %config.data_dir.display()
    );

    let source: Arc<dyn ContentSource> = match &args.source {
        Some(path) => Arc::new(MemoryContentSource::from_export_file(path)?),
        None => Arc::new(MemoryContentSource::new()),
    };
    let journal: Arc<dyn ChangeJournal> = if config.ignore_local_db {
        Arc::new(NullJournal)
    } else {
        Arc::new(FileJournal::open(&config.journal_path()).map_err(|e| {
            CliError::io_error(format!("open journal {}: {}", config.journal_path().display(), e))
        })?)
    };

    Ok(PublishedSnapshotService::new(config, source, journal))
}

/// Writes a default configuration file and creates the data directory.
pub fn init(config_path: &Path, data_dir: &Path) -> CliResult<Value> {
    if config_path.exists() {
        return Err(CliError::already_initialized(config_path.display()));
    }
    fs::create_dir_all(data_dir).map_err(|e| {
        CliError::io_error(format!("create data directory {}: {}", data_dir.display(), e))
    })?;

    let config = CacheConfig::new(data_dir);
    config.validate()?;
    config.save(config_path)?;

    Ok(json!({
        "config": config_path.display().to_string(),
        "data_dir": data_dir.display().to_string(),
    }))
}

/// Starts the cache and reports its status and metrics.
pub fn status(service: &PublishedSnapshotService) -> CliResult<Value> {
    let startup = service.load_on_startup()?;
    Ok(json!({
        "startup": startup,
        "status": service.status(),
        "metrics": service.metrics(),
    }))
}

/// Loads the cache file without falling back to a rebuild, then verifies.
pub fn verify(service: &PublishedSnapshotService) -> CliResult<Value> {
    let reload_error = service
        .reload_cache()
        .err()
        .map(|e| format!("{}: {}", e.code(), e));
    Ok(json!({
        "reload_error": reload_error,
        "verify": service.verify(),
    }))
}

/// Starts the cache and runs one collection pass.
pub fn collect(service: &PublishedSnapshotService) -> CliResult<Value> {
    service.load_on_startup()?;
    let report = service.collect();
    Ok(json!({
        "collect": report,
        "status": service.status(),
    }))
}

/// Rebuilds from the content source on the blocking pool; Ctrl-C cancels.
pub fn rebuild(service: Arc<PublishedSnapshotService>) -> CliResult<Value> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::io_error(format!("start runtime: {}", e)))?;

    let result = runtime.block_on(async {
        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_signal.cancel();
            }
        });
        service.rebuild_db_cache_in_background(cancel).await
    });
    let report = result.map_err(|e| CliError::io_error(format!("rebuild task: {}", e)))??;

    Ok(json!({
        "rebuild": report,
        "status": service.status(),
    }))
}

/// Loads the cache file and journal.
pub fn reload(service: &PublishedSnapshotService) -> CliResult<Value> {
    let report = service.reload_cache()?;
    Ok(json!({
        "reload": report,
        "status": service.status(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const EXPORT: &str = r#"{
        "nodes": [
            {"id": 1, "key": "6f1c0a3e-0000-4000-8000-000000000001", "content_type_id": 1,
             "versions": [{"culture": "en-US", "state": "published", "name": "Home"}]},
            {"id": 2, "key": "6f1c0a3e-0000-4000-8000-000000000002", "content_type_id": 1,
             "parent_id": 1,
             "versions": [{"culture": "en-US", "state": "published", "name": "About"}]}
        ]
    }"#;

    fn cache_args(dir: &TempDir) -> CacheArgs {
        let config = dir.path().join("nucache.json");
        init(&config, &dir.path().join("data")).unwrap();
        let source = dir.path().join("export.json");
        fs::write(&source, EXPORT).unwrap();
        CacheArgs {
            config,
            source: Some(source),
        }
    }

    #[test]
    fn test_init_refuses_existing_config() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("nucache.json");
        init(&config, &dir.path().join("data")).unwrap();
        assert!(dir.path().join("data").is_dir());

        let err = init(&config, &dir.path().join("data")).unwrap_err();
        assert_eq!(err.code_str(), "NUCACHE_CLI_ALREADY_INITIALIZED");
    }

    #[test]
    fn test_status_rebuilds_on_first_start() {
        let dir = TempDir::new().unwrap();
        let args = cache_args(&dir);

        let data = status(&open_service(&args, LogFormat::Compact).unwrap()).unwrap();
        assert_eq!(data["startup"]["source"], "rebuilt");
        assert_eq!(data["status"]["node_count"], 2);
        assert_eq!(data["status"]["is_healthy"], true);

        let data = status(&open_service(&args, LogFormat::Compact).unwrap()).unwrap();
        assert_eq!(data["startup"]["source"], "reloaded");
    }

    #[test]
    fn test_rebuild_then_verify() {
        let dir = TempDir::new().unwrap();
        let args = cache_args(&dir);

        let data = rebuild(Arc::new(open_service(&args, LogFormat::Compact).unwrap())).unwrap();
        assert_eq!(data["rebuild"]["node_count"], 2);

        let data = verify(&open_service(&args, LogFormat::Compact).unwrap()).unwrap();
        assert_eq!(data["reload_error"], Value::Null);
        assert_eq!(data["verify"]["is_consistent"], true);
    }

    #[test]
    fn test_reload_without_cache_file_fails() {
        let dir = TempDir::new().unwrap();
        let args = cache_args(&dir);
        let err = reload(&open_service(&args, LogFormat::Compact).unwrap()).unwrap_err();
        assert_eq!(err.code_str(), "NUCACHE_CACHE_FILE_MISSING");
    }
}
