//! Observability for the cache
//!
//! - Structured logging through `tracing`, JSON formatted by the CLI
//! - Counter metrics
//! - Typed lifecycle events and begin/complete scopes
//!
//! Observability is read-only: nothing here influences cache behavior.

mod events;
mod metrics;
mod scope;

pub use events::Event;
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::{ObservationScope, Timer};

use std::sync::Once;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Compact,
}

/// Installs the global subscriber, writing to stderr.
///
/// The filter comes from `RUST_LOG`, defaulting to `default_level`. Later
/// calls are no-ops.
pub fn init_tracing(format: LogFormat, default_level: &str) {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level));

        let result = match format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
                .try_init(),
            LogFormat::Compact => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .try_init(),
        };
        if let Err(err) = result {
            eprintln!("failed to install tracing subscriber: {}", err);
        }
    });
}

/// Logs a lifecycle event at the level its class implies.
///
/// Everything after the event is passed to `tracing` as fields, so each
/// field keeps its own key in JSON output:
///
/// ```ignore
/// log_event!(Event::BatchCommitted, generation = next.value(), nodes_set = 3);
/// log_event!(Event::ReloadFailed, code = err.code(), reason = %err);
/// ```
#[macro_export]
macro_rules! log_event {
    ($event:expr $(, $($field:tt)+)?) => {{
        let event: $crate::observability::Event = $event;
        if event.is_fatal() {
            ::tracing::error!(event = event.as_str(), fatal = true $(, $($field)+)?);
        } else if event.is_warning() {
            ::tracing::warn!(event = event.as_str() $(, $($field)+)?);
        } else {
            ::tracing::info!(event = event.as_str() $(, $($field)+)?);
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io;
    use std::sync::{Arc, Mutex};

    use tracing_subscriber::fmt::MakeWriter;

    /// Collects formatted log output in memory.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn json_lines(emit: impl FnOnce()) -> Vec<serde_json::Value> {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .json()
                .flatten_event(true)
                .with_writer(captured.clone()),
        );
        tracing::subscriber::with_default(subscriber, emit);

        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_log_event_keeps_fields_structured() {
        let lines = json_lines(|| {
            crate::log_event!(Event::NodeSkipped, node_id = 42, parent_id = %"7");
            crate::log_event!(Event::CacheFileCorrupt, reason = "checksum mismatch");
            crate::log_event!(Event::StartupBegin);
        });

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["event"], "WRITE_NODE_SKIPPED");
        assert_eq!(lines[0]["node_id"], 42);
        assert_eq!(lines[0]["parent_id"], "7");
        assert_eq!(lines[0]["level"], "WARN");
        assert_eq!(lines[1]["reason"], "checksum mismatch");
        assert_eq!(lines[1]["fatal"], true);
        assert_eq!(lines[1]["level"], "ERROR");
        assert_eq!(lines[2]["level"], "INFO");
        assert!(lines.iter().all(|line| line.get("fields").is_none()));
    }

    #[test]
    fn test_init_tracing_twice() {
        init_tracing(LogFormat::Compact, "warn");
        init_tracing(LogFormat::Json, "info");
    }
}
