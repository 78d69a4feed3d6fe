//! # Observability
//!
//! Logging setup shared by every feedkit binary and test harness.
//!
//! Library crates never configure logging themselves; they only emit
//! `tracing` events with structured fields. The binary calls
//! [`init_with_config`] once at startup and picks where those events go:
//!
//! - [`LogFormat::Compact`]: human readable lines on stderr (default).
//! - [`LogFormat::Jsonl`]: one JSON object per line appended to
//!   `~/.feedkit/logs/client.jsonl` (or [`LogConfig::log_path`]), with
//!   secret-looking fields redacted.
//!
//! `RUST_LOG` always wins over [`LogConfig::default_level`].
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "feedkit".into(),
//!     default_level: "debug".into(),
//!     format: observability::LogFormat::Jsonl,
//!     ..Default::default()
//! });
//! ```

mod file_sink;
mod json_layer;
mod redact;

use std::path::PathBuf;
use std::str::FromStr;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use file_sink::{default_log_path, JsonlFile, PendingLine};
pub use json_layer::{JsonLayer, LogEntry};
pub use redact::{is_sensitive_field, REDACTED};

/// Output format for the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Compact, human readable lines on stderr.
    #[default]
    Compact,
    /// Structured JSONL appended to a log file.
    Jsonl,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" | "text" | "pretty" => Ok(Self::Compact),
            "json" | "jsonl" => Ok(Self::Jsonl),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name written into every JSONL entry (e.g. "feedkit").
    pub service_name: String,

    /// Default level filter, overridden by `RUST_LOG`.
    pub default_level: String,

    /// Custom JSONL file path. Defaults to `~/.feedkit/logs/client.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Mirror JSONL output to stderr in compact form.
    pub also_stderr: bool,

    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "feedkit".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
            format: LogFormat::Compact,
        }
    }
}

/// Initialize logging with a custom configuration.
///
/// A JSONL file that cannot be opened falls back to compact stderr output.
/// Calling this more than once is harmless; only the first call installs a
/// subscriber.
pub fn init_with_config(config: LogConfig) {
    match config.format {
        LogFormat::Compact => init_compact(&config.default_level),
        LogFormat::Jsonl => {
            let Some(log_path) = config.log_path.clone().or_else(default_log_path) else {
                init_compact(&config.default_level);
                tracing::warn!("no home directory for JSONL logs, using stderr");
                return;
            };

            match JsonlFile::open(&log_path) {
                Ok(writer) => init_jsonl(&config, writer),
                Err(e) => {
                    init_compact(&config.default_level);
                    tracing::warn!(
                        log_path = %log_path.display(),
                        error = %e,
                        "failed to open log file, using stderr"
                    );
                }
            }
        }
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn init_compact(default_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

fn init_jsonl(config: &LogConfig, writer: JsonlFile) {
    let log_path = writer.path().to_path_buf();
    let json_layer = JsonLayer::new(config.service_name.clone(), writer);

    let stderr_layer = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(env_filter(&config.default_level))
    });

    let installed = tracing_subscriber::registry()
        .with(json_layer.with_filter(env_filter(&config.default_level)))
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(log_path = %log_path.display(), "logging initialized");
    }
}
