//! Error types for authenticated HTTP calls.

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    /// Transport-level failure (connect, timeout, TLS, malformed request).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response from a JSON call.
    #[error("Request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    /// 2xx response whose body was not the expected JSON.
    #[error("Invalid JSON response: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// Request body could not be serialized.
    #[error("Failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),
}

pub type FetchResult<T> = Result<T, FetchError>;

impl FetchError {
    /// HTTP status for [`FetchError::Status`].
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            FetchError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether retrying the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Http(e) => e.is_connect() || e.is_timeout(),
            FetchError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Human-readable reason from a JSON error body (`error`, then
    /// `details`), falling back to the raw body.
    pub fn server_message(&self) -> Option<String> {
        let FetchError::Status { body, .. } = self else {
            return None;
        };
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let field = |name: &str| {
            parsed
                .as_ref()
                .and_then(|v| v.get(name))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        field("error")
            .or_else(|| field("details"))
            .or_else(|| (!body.is_empty()).then(|| body.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16, body: &str) -> FetchError {
        FetchError::Status {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_status_display() {
        assert_eq!(
            status(403, "forbidden").to_string(),
            "Request failed with status 403: forbidden"
        );
    }

    #[test]
    fn test_server_message_prefers_error_then_details() {
        assert_eq!(
            status(401, r#"{"error":"Invalid credentials","details":"x"}"#).server_message(),
            Some("Invalid credentials".to_string())
        );
        assert_eq!(
            status(401, r#"{"details":"INVALID_PASSWORD"}"#).server_message(),
            Some("INVALID_PASSWORD".to_string())
        );
        assert_eq!(
            status(500, "upstream down").server_message(),
            Some("upstream down".to_string())
        );
        assert_eq!(status(500, "").server_message(), None);
    }

    #[test]
    fn test_transient_classification() {
        assert!(status(503, "").is_transient());
        assert!(!status(401, "").is_transient());
        let json_err = serde_json::from_str::<Value>("{").unwrap_err();
        assert!(!FetchError::InvalidJson(json_err).is_transient());
    }

    #[test]
    fn test_status_accessor() {
        assert_eq!(status(404, "").status(), Some(404));
        let json_err = serde_json::from_str::<Value>("{").unwrap_err();
        assert_eq!(FetchError::Encode(json_err).status(), None);
    }
}
