//! Logging and audit infrastructure: stderr tracing output plus SQLite
//! persistence for warn+ logs and per-request generation records.

mod logging;
mod requests;

pub use logging::{SqliteLogLayer, SqliteLogSink};
pub use requests::{RequestLog, RequestRecord};

use std::path::PathBuf;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "fable_llm" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Whether to persist warn+ logs to SQLite.
    pub log_to_sqlite: bool,
    /// Path to the log database.
    pub log_db_path: PathBuf,
    /// Whether to keep a per-request audit log.
    pub request_log_enabled: bool,
    /// Path to the request database.
    pub request_db_path: PathBuf,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        let fable_dir = dirs_fallback();
        Self {
            // The terminal doubles as the game surface, so stay quiet there.
            log_level: Level::WARN,
            module_levels: Vec::new(),
            log_to_sqlite: true,
            log_db_path: fable_dir.join("logs.db"),
            request_log_enabled: true,
            request_db_path: fable_dir.join("requests.db"),
        }
    }
}

/// Handles to the persistent sinks. Keep it alive for the life of the
/// process.
pub struct TelemetryGuard {
    request_log: Option<RequestLog>,
}

impl TelemetryGuard {
    /// Access the request audit log.
    pub fn requests(&self) -> Option<&RequestLog> {
        self.request_log.as_ref()
    }
}

/// Initialize the telemetry subsystem. Call once at startup.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let mut filter_str = config.log_level.to_string().to_lowercase();
    for (module, level) in &config.module_levels {
        filter_str.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
    }
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    // Human-readable layer on stderr; stdout belongs to the story.
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(env_filter);

    let sqlite_layer = if config.log_to_sqlite {
        match SqliteLogSink::new(&config.log_db_path) {
            Ok(sink) => Some(SqliteLogLayer::new(Arc::new(sink))),
            Err(e) => {
                eprintln!("fable-telemetry: failed to open log DB: {e}");
                None
            }
        }
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(sqlite_layer)
        .init();

    let request_log = if config.request_log_enabled {
        match RequestLog::new(&config.request_db_path) {
            Ok(log) => Some(log),
            Err(e) => {
                tracing::warn!("fable-telemetry: failed to open request DB: {e}");
                None
            }
        }
    } else {
        None
    };

    TelemetryGuard { request_log }
}

/// Fallback home dir for default paths.
fn dirs_fallback() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".fable")
}
