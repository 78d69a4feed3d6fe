//! Field-name based secret redaction for structured log output.

/// Replacement written in place of a sensitive value.
pub const REDACTED: &str = "[REDACTED]";

const SENSITIVE_MARKERS: &[&str] = &[
    "authorization",
    "token",
    "password",
    "secret",
    "api_key",
    "apikey",
    "cookie",
];

/// Whether a field with this name should never be written verbatim.
pub fn is_sensitive_field(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SENSITIVE_MARKERS.iter().any(|marker| lower.contains(marker))
}
