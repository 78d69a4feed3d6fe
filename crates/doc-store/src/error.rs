//! Error types for document store operations.

use authed_fetch::FetchError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The store refused the operation for the current caller.
    #[error("Permission denied on {path}: {message}")]
    PermissionDenied { path: String, message: String },

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Store could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Store request failed: {0}")]
    Fetch(#[from] FetchError),

    /// Response did not have the expected shape.
    #[error("Unexpected response: {0}")]
    Decode(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn permission_denied(path: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::PermissionDenied {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, StoreError::PermissionDenied { .. })
    }

    /// Whether the same call could succeed later.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Network(_) => true,
            StoreError::Fetch(e) => e.is_transient(),
            _ => false,
        }
    }
}
