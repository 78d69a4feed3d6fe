use async_trait::async_trait;

/// Source of bearer tokens for authenticated requests.
///
/// Returning `None` (signed out, refresh failed) is not an error: the
/// request goes out without an `Authorization` header.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current ID token. `force_refresh` bypasses any cached token.
    async fn id_token(&self, force_refresh: bool) -> Option<String>;
}

/// Provider returning a fixed token (or none).
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn id_token(&self, _force_refresh: bool) -> Option<String> {
        self.token.clone()
    }
}
