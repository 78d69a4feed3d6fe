//! Error types for authentication.

use authed_fetch::FetchError;
use thiserror::Error;

/// Errors that can occur during authentication operations.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authentication is not initialized")]
    NotInitialized,

    #[error("Not signed in")]
    NotSignedIn,

    /// Error reported by the identity service, with a normalized `auth/...` code.
    #[error("Auth service error [{code}]: {message}")]
    Service { code: String, message: String },

    /// The companion service refused to mint a sign-in token.
    #[error("Sign-in rejected ({status}): {message}")]
    Rejected {
        status: u16,
        message: String,
        details: Option<String>,
    },

    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Companion request failed: {0}")]
    Companion(#[from] FetchError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Network unavailable")]
    NetworkUnavailable,
}

impl AuthError {
    /// Normalized error code, when one is known.
    pub fn code(&self) -> Option<&str> {
        match self {
            AuthError::Service { code, .. } => Some(code),
            AuthError::Rejected {
                details: Some(details),
                message,
                ..
            } => code_from_identity_message(details).or_else(|| code_from_identity_message(message)),
            AuthError::Rejected { message, .. } => code_from_identity_message(message),
            AuthError::NetworkUnavailable => Some("auth/network-request-failed"),
            _ => None,
        }
    }

    /// Check if this error is worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::NetworkUnavailable => true,
            AuthError::Http(e) => e.is_connect() || e.is_timeout(),
            AuthError::Companion(e) => e.is_transient(),
            AuthError::Service { code, message } => {
                code == "auth/network-request-failed" || crate::retry::is_transient_message(message)
            }
            _ => false,
        }
    }

    /// Message suitable for showing to the person signing in.
    pub fn user_message(&self) -> String {
        if self.is_transient() {
            return NETWORK_MESSAGE.to_string();
        }
        match self.code() {
            Some("auth/email-already-in-use") => "Email already in use.".to_string(),
            Some("auth/invalid-email") => "Invalid email address.".to_string(),
            Some("auth/user-disabled") => "This user account has been disabled.".to_string(),
            Some("auth/user-not-found") => "No user found with this email.".to_string(),
            Some("auth/wrong-password") => "Incorrect password.".to_string(),
            Some("auth/network-request-failed") => NETWORK_MESSAGE.to_string(),
            _ => match self {
                AuthError::Service { message, .. } | AuthError::Rejected { message, .. }
                    if !message.is_empty() =>
                {
                    message.clone()
                }
                _ => "Authentication error.".to_string(),
            },
        }
    }
}

const NETWORK_MESSAGE: &str = "Network error. Please check your connection and try again.";

/// Map an identity service error message (`EMAIL_NOT_FOUND`,
/// `INVALID_PASSWORD : detail`, ...) to an `auth/...` code.
pub(crate) fn code_from_identity_message(message: &str) -> Option<&'static str> {
    let key = message.split(':').next().unwrap_or_default().trim();
    let code = match key {
        "EMAIL_EXISTS" => "auth/email-already-in-use",
        "INVALID_EMAIL" => "auth/invalid-email",
        "USER_DISABLED" => "auth/user-disabled",
        "EMAIL_NOT_FOUND" => "auth/user-not-found",
        "INVALID_PASSWORD" => "auth/wrong-password",
        "INVALID_LOGIN_CREDENTIALS" => "auth/invalid-credential",
        "INVALID_CUSTOM_TOKEN" => "auth/invalid-custom-token",
        "TOKEN_EXPIRED" => "auth/user-token-expired",
        "INVALID_REFRESH_TOKEN" | "INVALID_GRANT_TYPE" => "auth/invalid-refresh-token",
        "WEAK_PASSWORD" => "auth/weak-password",
        "NETWORK_REQUEST_FAILED" => "auth/network-request-failed",
        _ => return None,
    };
    Some(code)
}

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;
