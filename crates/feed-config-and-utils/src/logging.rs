//! Logging initialization for feedkit binaries.

use crate::DEFAULT_LOG_LEVEL;
use observability::{LogConfig, LogFormat};

/// Initialize tracing for the client.
///
/// Output format comes from `FEEDKIT_LOG_FORMAT` (`compact` or `jsonl`,
/// default compact). JSONL goes to `log_path` when given, otherwise
/// `~/.feedkit/logs/client.jsonl`, and is mirrored to stderr.
///
/// # Arguments
///
/// * `level` - Default log level (normalized), overridden by `RUST_LOG`
/// * `log_path` - JSONL destination for the JSONL format
pub fn init_logging(level: &str, log_path: Option<std::path::PathBuf>) {
    let format = std::env::var("FEEDKIT_LOG_FORMAT")
        .ok()
        .and_then(|raw| raw.parse::<LogFormat>().ok())
        .unwrap_or_default();

    observability::init_with_config(LogConfig {
        service_name: "feedkit".into(),
        default_level: normalize_level(level),
        log_path,
        also_stderr: format == LogFormat::Jsonl,
        format,
    });
}

/// Lowercase level name for `raw` (`warning` is accepted for `warn`);
/// anything unrecognized becomes `info`.
pub fn normalize_level(raw: &str) -> String {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("warning") {
        return "warn".to_string();
    }
    raw.parse::<tracing::Level>()
        .map(|level| level.as_str().to_ascii_lowercase())
        .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
}
