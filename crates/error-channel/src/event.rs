use crate::PermissionError;
use serde_json::Value;

/// Kind used for [`PermissionError`] events.
pub const PERMISSION_ERROR: &str = "permission-error";
/// Kind used for free-form errors shown by a generic alert.
pub const GENERIC_ERROR: &str = "generic-error";

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorPayload {
    Permission(PermissionError),
    Message(String),
    Json(Value),
}

impl ErrorPayload {
    /// Text suitable for an alert.
    pub fn display_message(&self) -> String {
        match self {
            ErrorPayload::Permission(err) => err.message().to_string(),
            ErrorPayload::Message(msg) => msg.clone(),
            ErrorPayload::Json(value) => value
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string()),
        }
    }
}

impl From<PermissionError> for ErrorPayload {
    fn from(err: PermissionError) -> Self {
        ErrorPayload::Permission(err)
    }
}

impl From<String> for ErrorPayload {
    fn from(msg: String) -> Self {
        ErrorPayload::Message(msg)
    }
}

impl From<&str> for ErrorPayload {
    fn from(msg: &str) -> Self {
        ErrorPayload::Message(msg.to_string())
    }
}

impl From<Value> for ErrorPayload {
    fn from(value: Value) -> Self {
        ErrorPayload::Json(value)
    }
}

/// One published event.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEvent {
    pub kind: String,
    pub payload: ErrorPayload,
}

impl ErrorEvent {
    pub fn permission(&self) -> Option<&PermissionError> {
        match &self.payload {
            ErrorPayload::Permission(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Operation;
    use serde_json::json;

    #[test]
    fn test_display_message_variants() {
        assert_eq!(ErrorPayload::from("boom").display_message(), "boom");
        assert_eq!(
            ErrorPayload::from(json!({ "message": "quota exceeded" })).display_message(),
            "quota exceeded"
        );
        assert_eq!(
            ErrorPayload::from(json!({ "code": 7 })).display_message(),
            r#"{"code":7}"#
        );

        let err = PermissionError::new("posts", Operation::List, None);
        assert_eq!(
            ErrorPayload::from(err.clone()).display_message(),
            err.message()
        );
    }

    #[test]
    fn test_permission_accessor() {
        let event = ErrorEvent {
            kind: PERMISSION_ERROR.into(),
            payload: PermissionError::new("posts", Operation::List, None).into(),
        };
        assert_eq!(event.permission().unwrap().path(), "posts");

        let event = ErrorEvent {
            kind: GENERIC_ERROR.into(),
            payload: "x".into(),
        };
        assert!(event.permission().is_none());
    }
}
