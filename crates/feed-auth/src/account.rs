//! Email/password account flows through the companion service.
//!
//! The companion verifies credentials and mints a custom token; the auth
//! provider then exchanges it for a session. Only the token exchange is
//! retried, and only for transient failures.

use crate::retry::{retryable, RetryPolicy};
use crate::{AuthError, AuthProvider, AuthResult, AuthUser};
use authed_fetch::{
    CompanionClient, CustomTokenResponse, FetchError, ProfileResponse, SignInRequest,
    SignUpRequest, SyncResponse,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Optional profile fields sent with sign-up.
#[derive(Debug, Clone, Default)]
pub struct SignUpProfile {
    pub username: Option<String>,
    pub name: Option<String>,
}

pub struct AccountService {
    companion: CompanionClient,
    auth: Option<Arc<dyn AuthProvider>>,
    retry: RetryPolicy,
}

impl AccountService {
    /// `auth` is `None` when the auth subsystem could not be configured;
    /// every flow then fails with [`AuthError::NotInitialized`].
    pub fn new(companion: CompanionClient, auth: Option<Arc<dyn AuthProvider>>) -> Self {
        Self {
            companion,
            auth,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn auth(&self) -> AuthResult<&Arc<dyn AuthProvider>> {
        self.auth.as_ref().ok_or(AuthError::NotInitialized)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AuthUser> {
        let auth = self.auth()?;

        match self.companion.health().await {
            Ok(health) => debug!(ok = health.ok, "Companion health check"),
            Err(e) => warn!(error = %e, "Companion health check failed"),
        }

        let minted = self
            .companion
            .sign_in(&SignInRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await
            .map_err(rejection)?;

        let user = self.exchange(auth, &minted).await?;
        info!(uid = %user.uid, "Account signed in");
        Ok(user)
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        profile: SignUpProfile,
    ) -> AuthResult<AuthUser> {
        let auth = self.auth()?;

        let minted = self
            .companion
            .sign_up(&SignUpRequest {
                email: email.to_string(),
                password: password.to_string(),
                username: profile.username,
                name: profile.name,
            })
            .await
            .map_err(rejection)?;

        let user = self.exchange(auth, &minted).await?;
        info!(uid = %user.uid, "Account created");
        Ok(user)
    }

    pub async fn sign_out(&self) -> AuthResult<()> {
        self.auth()?.sign_out().await.map_err(|e| {
            warn!(error = %e, "Sign-out failed");
            e
        })
    }

    pub async fn profile(&self) -> AuthResult<ProfileResponse> {
        Ok(self.companion.profile().await?)
    }

    pub async fn sync_profile(&self, profile: &Value) -> AuthResult<SyncResponse> {
        Ok(self.companion.sync_profile(profile).await?)
    }

    async fn exchange(
        &self,
        auth: &Arc<dyn AuthProvider>,
        minted: &CustomTokenResponse,
    ) -> AuthResult<AuthUser> {
        debug!(uid = %minted.uid, "Exchanging custom token");
        retryable(
            move || auth.sign_in_with_custom_token(&minted.custom_token),
            self.retry,
        )
        .await
    }
}

/// Turn a companion failure into an error carrying the server's reason.
fn rejection(err: FetchError) -> AuthError {
    let FetchError::Status { status, body } = &err else {
        return AuthError::Companion(err);
    };
    let details = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        v.get("details")
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    AuthError::Rejected {
        status: *status,
        message: err
            .server_message()
            .unwrap_or_else(|| format!("HTTP {}", status)),
        details,
    }
}
