//! Typed client for the companion HTTP service.
//!
//! The companion service mints custom sign-in tokens for email/password
//! credentials and keeps user profiles in sync:
//!
//! | Endpoint | Auth |
//! |---|---|
//! | `GET /health` | none |
//! | `POST /api/auth/signup` | none |
//! | `POST /api/auth/signin` | none |
//! | `GET /api/protected/profile` | bearer |
//! | `POST /api/auth/sync` | bearer |

use crate::{AuthedFetch, FetchRequest, FetchResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Custom token issued by sign-in and sign-up.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomTokenResponse {
    pub custom_token: String,
    pub uid: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProfileResponse {
    pub uid: String,
    #[serde(default)]
    pub claims: Value,
    #[serde(default)]
    pub profile: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SyncResponse {
    pub ok: bool,
    #[serde(default)]
    pub profile: Value,
}

#[derive(Clone)]
pub struct CompanionClient {
    base_url: String,
    fetch: AuthedFetch,
}

impl CompanionClient {
    pub fn new(base_url: impl Into<String>, fetch: AuthedFetch) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            fetch,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn health(&self) -> FetchResult<HealthResponse> {
        self.fetch
            .public_api_call(FetchRequest::get(self.url("/health")))
            .await
    }

    pub async fn sign_up(&self, request: &SignUpRequest) -> FetchResult<CustomTokenResponse> {
        debug!(email = %request.email, "companion sign-up");
        let request = FetchRequest::post(self.url("/api/auth/signup")).json(request)?;
        self.fetch.public_api_call(request).await
    }

    pub async fn sign_in(&self, request: &SignInRequest) -> FetchResult<CustomTokenResponse> {
        debug!(email = %request.email, "companion sign-in");
        let request = FetchRequest::post(self.url("/api/auth/signin")).json(request)?;
        self.fetch.public_api_call(request).await
    }

    pub async fn profile(&self) -> FetchResult<ProfileResponse> {
        self.fetch
            .api_call(FetchRequest::get(self.url("/api/protected/profile")))
            .await
    }

    /// Merge `profile` into the signed-in user's server-side profile.
    pub async fn sync_profile(&self, profile: &Value) -> FetchResult<SyncResponse> {
        let body = serde_json::json!({ "profile": profile });
        let request = FetchRequest::post(self.url("/api/auth/sync")).json(&body)?;
        self.fetch.api_call(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub_server::{StubResponse, StubServer};
    use crate::{FetchError, StaticTokenProvider};
    use serde_json::json;
    use std::sync::Arc;

    async fn companion() -> (StubServer, CompanionClient) {
        let server = StubServer::start(|req| match (req.method.as_str(), req.path.as_str()) {
            ("GET", "/health") => StubResponse::json(200, json!({ "ok": true })),
            ("POST", "/api/auth/signin") => {
                let body = req.json();
                if body["password"] == "hunter2" {
                    StubResponse::json(200, json!({ "customToken": "ct-1", "uid": "u1" }))
                } else {
                    StubResponse::json(
                        401,
                        json!({ "error": "Invalid credentials", "details": "INVALID_PASSWORD" }),
                    )
                }
            }
            ("POST", "/api/auth/signup") => {
                StubResponse::json(200, json!({ "customToken": "ct-new", "uid": "u2" }))
            }
            ("GET", "/api/protected/profile") => match req.header("authorization") {
                Some("Bearer id-1") => StubResponse::json(
                    200,
                    json!({ "uid": "u1", "claims": {}, "profile": { "username": "ada" } }),
                ),
                _ => StubResponse::json(401, json!({ "error": "Missing token" })),
            },
            ("POST", "/api/auth/sync") => {
                let profile = req.json()["profile"].clone();
                StubResponse::json(200, json!({ "ok": true, "profile": profile }))
            }
            _ => StubResponse::text(404, "Not Found"),
        })
        .await
        .unwrap();

        let fetch = AuthedFetch::new(Arc::new(StaticTokenProvider::new("id-1")));
        let client = CompanionClient::new(format!("{}/", server.base_url()), fetch);
        (server, client)
    }

    #[tokio::test]
    async fn test_health() {
        let (_server, client) = companion().await;
        assert!(client.health().await.unwrap().ok);
    }

    #[tokio::test]
    async fn test_sign_in_success() {
        let (server, client) = companion().await;
        let response = client
            .sign_in(&SignInRequest {
                email: "ada@example.com".into(),
                password: "hunter2".into(),
            })
            .await
            .unwrap();

        assert_eq!(response.custom_token, "ct-1");
        assert_eq!(response.uid, "u1");
        // Public endpoints never carry the bearer token.
        assert!(server.requests()[0].header("authorization").is_none());
    }

    #[tokio::test]
    async fn test_sign_in_rejected_exposes_server_reason() {
        let (_server, client) = companion().await;
        let err = client
            .sign_in(&SignInRequest {
                email: "ada@example.com".into(),
                password: "wrong".into(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(401));
        assert_eq!(err.server_message().as_deref(), Some("Invalid credentials"));
        assert!(matches!(err, FetchError::Status { .. }));
    }

    #[tokio::test]
    async fn test_sign_up_omits_missing_optional_fields() {
        let (server, client) = companion().await;
        client
            .sign_up(&SignUpRequest {
                email: "new@example.com".into(),
                password: "pw123456".into(),
                username: Some("newbie".into()),
                name: None,
            })
            .await
            .unwrap();

        let body = server.requests()[0].json();
        assert_eq!(body["username"], "newbie");
        assert!(body.get("name").is_none());
    }

    #[tokio::test]
    async fn test_profile_uses_bearer() {
        let (_server, client) = companion().await;
        let profile = client.profile().await.unwrap();
        assert_eq!(profile.uid, "u1");
        assert_eq!(profile.profile.unwrap()["username"], "ada");
    }

    #[tokio::test]
    async fn test_sync_profile_echoes() {
        let (_server, client) = companion().await;
        let response = client
            .sync_profile(&json!({ "name": "Ada" }))
            .await
            .unwrap();
        assert!(response.ok);
        assert_eq!(response.profile["name"], "Ada");
    }
}
