use error_channel::PermissionError;
use thiserror::Error;

/// Error exposed in subscription and pager state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    /// A read failed; the same error was published on the error channel.
    #[error(transparent)]
    Permission(#[from] PermissionError),

    /// Missing backend or reference. Never published.
    #[error("{0}")]
    Config(String),
}

impl DataError {
    pub(crate) fn store_unavailable() -> Self {
        DataError::Config("document store not initialized".to_string())
    }

    pub fn permission(&self) -> Option<&PermissionError> {
        match self {
            DataError::Permission(err) => Some(err),
            DataError::Config(_) => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PagerError {
    #[error("page size must be at least 1")]
    InvalidPageSize,

    #[error("collection path is empty")]
    EmptyPath,
}

pub type PagerResult<T> = Result<T, PagerError>;
