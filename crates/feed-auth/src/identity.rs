//! Identity Toolkit REST provider.
//!
//! Sessions live in memory only. ID tokens are refreshed through the secure
//! token endpoint when forced or when they expire within a minute.

use crate::error::code_from_identity_message;
use crate::provider::{AuthListenerHandle, AuthListeners, AuthProvider, AuthStateCallback, AuthUser};
use crate::session_fsm::{SessionMachine, SessionMachineInput, SessionState};
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tokens expiring within this window are refreshed before use.
const REFRESH_MARGIN_SECS: i64 = 60;
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
    #[serde(default)]
    local_id: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Clone)]
struct Session {
    user: AuthUser,
    id_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

impl Session {
    fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - ChronoDuration::seconds(REFRESH_MARGIN_SECS) <= now
    }
}

fn expiry_from(expires_in: Option<&str>) -> DateTime<Utc> {
    let secs = expires_in
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    Utc::now() + ChronoDuration::seconds(secs)
}

pub struct IdentityToolkitAuth {
    http: reqwest::Client,
    identity_url: String,
    token_url: String,
    api_key: String,
    session: Mutex<Option<Session>>,
    fsm: Mutex<SessionMachine>,
    /// Serializes sign-in, sign-out and refresh.
    session_lock: tokio::sync::Mutex<()>,
    listeners: AuthListeners,
}

impl IdentityToolkitAuth {
    /// Create a provider against `identity_url`; the secure token endpoint
    /// defaults to the same host.
    pub fn new(
        identity_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> AuthResult<Self> {
        let identity_url = identity_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            token_url: identity_url.clone(),
            identity_url,
            api_key: api_key.into(),
            session: Mutex::new(None),
            fsm: Mutex::new(SessionMachine::new()),
            session_lock: tokio::sync::Mutex::new(()),
            listeners: AuthListeners::new(),
        })
    }

    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn state(&self) -> SessionState {
        SessionState::from(self.fsm.lock().state())
    }

    fn transition(&self, input: SessionMachineInput) -> AuthResult<SessionState> {
        let mut fsm = self.fsm.lock();
        let old_state = SessionState::from(fsm.state());
        fsm.consume(&input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input, old_state
            ))
        })?;
        let new_state = SessionState::from(fsm.state());
        if old_state != new_state {
            debug!(old_state = ?old_state, new_state = ?new_state, "Session state transition");
        }
        Ok(new_state)
    }

    fn accounts_url(&self, method: &str) -> String {
        format!(
            "{}/v1/accounts:{}?key={}",
            self.identity_url, method, self.api_key
        )
    }

    fn token_endpoint(&self) -> String {
        format!("{}/v1/token?key={}", self.token_url, self.api_key)
    }

    async fn post_json<T: DeserializeOwned>(&self, url: &str, body: &Value) -> AuthResult<T> {
        let response = self.http.post(url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|envelope| envelope.error.message)
                .unwrap_or_else(|_| format!("HTTP {}", status.as_u16()));
            let code = code_from_identity_message(&message).unwrap_or("auth/internal-error");
            return Err(AuthError::Service {
                code: code.to_string(),
                message,
            });
        }
        Ok(response.json::<T>().await?)
    }

    async fn lookup(&self, id_token: &str) -> AuthResult<AuthUser> {
        let response: LookupResponse = self
            .post_json(&self.accounts_url("lookup"), &json!({ "idToken": id_token }))
            .await?;
        let user = response.users.into_iter().next().ok_or_else(|| AuthError::Service {
            code: "auth/user-not-found".to_string(),
            message: "Account lookup returned no user".to_string(),
        })?;
        Ok(AuthUser {
            uid: user.local_id,
            email: user.email,
            display_name: user.display_name,
        })
    }

    async fn request_session(&self, method: &str, body: Value) -> AuthResult<Session> {
        let response: SignInResponse = self.post_json(&self.accounts_url(method), &body).await?;
        let user = match response.local_id {
            Some(uid) => AuthUser {
                uid,
                email: response.email,
                display_name: response.display_name,
            },
            None => self.lookup(&response.id_token).await?,
        };
        Ok(Session {
            user,
            expires_at: expiry_from(response.expires_in.as_deref()),
            id_token: response.id_token,
            refresh_token: response.refresh_token,
        })
    }

    /// Run a sign-in style request and install the resulting session.
    async fn establish(&self, method: &str, body: Value) -> AuthResult<AuthUser> {
        let _guard = self.session_lock.lock().await;
        self.transition(SessionMachineInput::SignInAttempt)?;
        let pending = PendingSignIn { auth: self, settled: false };

        let result = self.request_session(method, body).await;
        pending.settle();
        match result {
            Ok(session) => {
                let user = session.user.clone();
                *self.session.lock() = Some(session);
                self.transition(SessionMachineInput::SignInSuccess)?;
                info!(uid = %user.uid, "Signed in");
                self.listeners.notify(Some(user.clone()));
                Ok(user)
            }
            Err(e) => {
                self.abandon_sign_in()?;
                warn!(error = %e, method, "Sign-in failed");
                Err(e)
            }
        }
    }

    /// Leave `SigningIn` for `SignedOut`. A failed account switch leaves no
    /// session behind.
    fn abandon_sign_in(&self) -> AuthResult<()> {
        let previous = self.session.lock().take();
        self.transition(SessionMachineInput::SignInFailed)?;
        if previous.is_some() {
            self.listeners.notify(None);
        }
        Ok(())
    }

    async fn refresh(&self, refresh_token: &str) -> AuthResult<RefreshResponse> {
        self.post_json(
            &self.token_endpoint(),
            &json!({ "grant_type": "refresh_token", "refresh_token": refresh_token }),
        )
        .await
    }
}

/// Returns the machine to `SignedOut` if a sign-in future is dropped before
/// the request settles.
struct PendingSignIn<'a> {
    auth: &'a IdentityToolkitAuth,
    settled: bool,
}

impl PendingSignIn<'_> {
    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for PendingSignIn<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        warn!("Sign-in cancelled before completing");
        if let Err(e) = self.auth.abandon_sign_in() {
            warn!(error = %e, "Could not reset session after cancelled sign-in");
        }
    }
}

#[async_trait]
impl AuthProvider for IdentityToolkitAuth {
    async fn sign_in_with_custom_token(&self, token: &str) -> AuthResult<AuthUser> {
        self.establish(
            "signInWithCustomToken",
            json!({ "token": token, "returnSecureToken": true }),
        )
        .await
    }

    async fn sign_in_with_email_and_password(
        &self,
        email: &str,
        password: &str,
    ) -> AuthResult<AuthUser> {
        self.establish(
            "signInWithPassword",
            json!({ "email": email, "password": password, "returnSecureToken": true }),
        )
        .await
    }

    async fn create_user_with_email_and_password(
        &self,
        email: &str,
        password: &str,
    ) -> AuthResult<AuthUser> {
        self.establish(
            "signUp",
            json!({ "email": email, "password": password, "returnSecureToken": true }),
        )
        .await
    }

    async fn sign_out(&self) -> AuthResult<()> {
        let _guard = self.session_lock.lock().await;
        if self.session.lock().is_none() {
            debug!("Sign-out requested while signed out");
            return Ok(());
        }

        self.transition(SessionMachineInput::SignOutRequested)?;
        *self.session.lock() = None;
        self.transition(SessionMachineInput::SignOutComplete)?;
        info!("Signed out");
        self.listeners.notify(None);
        Ok(())
    }

    fn on_auth_state_changed(&self, callback: AuthStateCallback) -> AuthListenerHandle {
        let handle = self.listeners.add(callback.clone());
        callback(self.current_user());
        handle
    }

    async fn id_token(&self, force_refresh: bool) -> AuthResult<Option<String>> {
        let fresh = |session: &Session| force_refresh || session.needs_refresh(Utc::now());

        match self.session.lock().as_ref() {
            None => return Ok(None),
            Some(session) if !fresh(session) => return Ok(Some(session.id_token.clone())),
            Some(_) => {}
        }

        let _guard = self.session_lock.lock().await;
        // Re-read: the session may have changed while waiting.
        let refresh_token = match self.session.lock().as_ref() {
            None => return Ok(None),
            Some(session) if !session.needs_refresh(Utc::now()) && !force_refresh => {
                return Ok(Some(session.id_token.clone()));
            }
            Some(session) => session.refresh_token.clone(),
        };

        self.transition(SessionMachineInput::TokenExpired)?;
        match self.refresh(&refresh_token).await {
            Ok(response) => {
                let id_token = response.id_token.clone();
                if let Some(session) = self.session.lock().as_mut() {
                    session.expires_at = expiry_from(response.expires_in.as_deref());
                    session.id_token = response.id_token;
                    session.refresh_token = response.refresh_token;
                }
                self.transition(SessionMachineInput::RefreshSuccess)?;
                debug!("ID token refreshed");
                Ok(Some(id_token))
            }
            Err(e) if e.is_transient() => {
                self.transition(SessionMachineInput::RefreshAborted)?;
                warn!(error = %e, "Token refresh failed, keeping session");
                Err(e)
            }
            Err(e) => {
                *self.session.lock() = None;
                self.transition(SessionMachineInput::RefreshFailed)?;
                warn!(error = %e, "Token refresh rejected, signing out");
                self.listeners.notify(None);
                Err(AuthError::TokenRefresh(e.to_string()))
            }
        }
    }

    fn current_user(&self) -> Option<AuthUser> {
        self.session.lock().as_ref().map(|s| s.user.clone())
    }
}
