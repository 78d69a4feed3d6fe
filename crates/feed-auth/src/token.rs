use crate::AuthProvider;
use async_trait::async_trait;
use authed_fetch::TokenProvider;
use std::sync::Arc;
use tracing::warn;

/// Supplies bearer tokens from the signed-in session.
#[derive(Clone)]
pub struct SessionTokenProvider {
    auth: Arc<dyn AuthProvider>,
}

impl SessionTokenProvider {
    pub fn new(auth: Arc<dyn AuthProvider>) -> Self {
        Self { auth }
    }
}

#[async_trait]
impl TokenProvider for SessionTokenProvider {
    async fn id_token(&self, force_refresh: bool) -> Option<String> {
        match self.auth.id_token(force_refresh).await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, force_refresh, "Could not obtain ID token");
                None
            }
        }
    }
}
