//! Permission error raised when a data operation is refused or fails.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

const DOCUMENTS_ROOT: &str = "/databases/(default)/documents";
const DENIED_PREFIX: &str =
    "Missing or insufficient permissions: The following request was denied by security rules:";

/// The kind of data operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Get,
    List,
    Create,
    Update,
    Delete,
    /// Whole-document set (with or without merge).
    Write,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Get => "get",
            Operation::List => "list",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Write => "write",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload attached to a refused write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestResource {
    pub data: Value,
}

/// Normalized description of the refused request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PermissionRequest {
    /// Always null on the client; the caller's identity is not known here.
    pub auth: Option<Value>,
    pub method: Operation,
    /// Fully qualified resource path.
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<RequestResource>,
}

/// A refused data operation. Immutable once built.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct PermissionError {
    path: String,
    operation: Operation,
    request_payload: Option<Value>,
    request: PermissionRequest,
    message: String,
}

impl PermissionError {
    /// Build the error for `operation` on `path`, embedding `request_payload`
    /// (the attempted write data, if any) in the rendered message.
    pub fn new(
        path: impl Into<String>,
        operation: Operation,
        request_payload: Option<Value>,
    ) -> Self {
        let path = path.into();
        let request = PermissionRequest {
            auth: None,
            method: operation,
            path: format!("{}/{}", DOCUMENTS_ROOT, path.trim_start_matches('/')),
            resource: request_payload.clone().map(|data| RequestResource { data }),
        };

        let rendered = serde_json::to_string_pretty(&request).unwrap_or_else(|_| {
            format!(
                "{{ \"method\": \"{}\", \"path\": \"{}\" }}",
                operation, request.path
            )
        });
        let message = format!("{}\n{}", DENIED_PREFIX, rendered);

        Self {
            path,
            operation,
            request_payload,
            request,
            message,
        }
    }

    /// Document or collection path as given by the caller.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn request_payload(&self) -> Option<&Value> {
        self.request_payload.as_ref()
    }

    pub fn request(&self) -> &PermissionRequest {
        &self.request
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_error_has_no_resource() {
        let err = PermissionError::new("users/u1", Operation::Get, None);

        assert_eq!(err.path(), "users/u1");
        assert_eq!(err.operation(), Operation::Get);
        assert!(err.request_payload().is_none());
        assert_eq!(
            err.request().path,
            "/databases/(default)/documents/users/u1"
        );
        assert!(err.request().resource.is_none());
        assert!(!err.message().contains("resource"));
    }

    #[test]
    fn test_message_embeds_request_json() {
        let payload = json!({ "title": "hello" });
        let err = PermissionError::new("posts", Operation::Create, Some(payload.clone()));

        let message = err.to_string();
        assert!(message.starts_with("Missing or insufficient permissions"));
        let (_, body) = message.split_once('\n').unwrap();
        let parsed: Value = serde_json::from_str(body).unwrap();
        assert_eq!(parsed["method"], "create");
        assert_eq!(parsed["auth"], Value::Null);
        assert_eq!(parsed["path"], "/databases/(default)/documents/posts");
        assert_eq!(parsed["resource"]["data"], payload);
    }

    #[test]
    fn test_leading_slash_normalized() {
        let err = PermissionError::new("/posts/p1", Operation::Delete, None);
        assert_eq!(
            err.request().path,
            "/databases/(default)/documents/posts/p1"
        );
        assert_eq!(err.path(), "/posts/p1");
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(Operation::Write.to_string(), "write");
        assert_eq!(Operation::List.as_str(), "list");
        assert_eq!(serde_json::to_value(Operation::Update).unwrap(), json!("update"));
    }
}
