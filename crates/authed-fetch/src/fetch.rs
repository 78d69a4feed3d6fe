//! Authenticated fetch with 401-triggered token refresh.

use crate::{FetchError, FetchResult, TokenProvider};
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A request that can be sent more than once with identical content.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl FetchRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::PATCH, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Serialize `body` as the JSON payload.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> FetchResult<Self> {
        self.body = Some(serde_json::to_vec(body).map_err(FetchError::Encode)?);
        Ok(self)
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers
            .iter()
            .any(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }
}

/// Retry policy for [`AuthedFetch::fetch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Retry a 401 with a force-refreshed token.
    pub retry_on_unauthorized: bool,
    /// Upper bound on 401 retries.
    pub max_retries: u32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            retry_on_unauthorized: true,
            max_retries: 1,
        }
    }
}

/// Final response of a fetch, body fully read.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> FetchResult<T> {
        serde_json::from_slice(&self.body).map_err(FetchError::InvalidJson)
    }
}

/// HTTP client that authenticates each request with an ID token.
#[derive(Clone)]
pub struct AuthedFetch {
    http: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
}

impl AuthedFetch {
    pub fn new(tokens: Arc<dyn TokenProvider>) -> Self {
        Self::with_client(reqwest::Client::new(), tokens)
    }

    /// Client whose requests time out after `timeout`.
    pub fn with_timeout(tokens: Arc<dyn TokenProvider>, timeout: Duration) -> FetchResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(http, tokens))
    }

    pub fn with_client(http: reqwest::Client, tokens: Arc<dyn TokenProvider>) -> Self {
        Self { http, tokens }
    }

    /// Send `request` with a bearer token.
    ///
    /// The first attempt uses the cached token; each 401 retry (while
    /// `options` allow one) forces a refresh. The last response is returned
    /// whatever its status. Transport errors are returned immediately.
    pub async fn fetch(
        &self,
        request: &FetchRequest,
        options: FetchOptions,
    ) -> FetchResult<FetchResponse> {
        let mut retries = 0u32;
        loop {
            let force_refresh = retries > 0;
            let token = self.tokens.id_token(force_refresh).await;
            if token.is_none() {
                debug!(url = %request.url, "no ID token, sending unauthenticated");
            }

            let response = self.send(request, token.as_deref()).await?;

            if response.status == StatusCode::UNAUTHORIZED
                && options.retry_on_unauthorized
                && retries < options.max_retries
            {
                retries += 1;
                debug!(
                    url = %request.url,
                    retry = retries,
                    "401 received, retrying with refreshed token"
                );
                continue;
            }

            return Ok(response);
        }
    }

    /// Send `request` once without any token.
    pub async fn fetch_public(&self, request: &FetchRequest) -> FetchResult<FetchResponse> {
        self.send(request, None).await
    }

    /// Authenticated JSON call: non-2xx becomes [`FetchError::Status`], a
    /// body that does not decode as `T` becomes [`FetchError::InvalidJson`].
    pub async fn api_call<T: DeserializeOwned>(&self, request: FetchRequest) -> FetchResult<T> {
        let request = with_json_content_type(request);
        let response = self.fetch(&request, FetchOptions::default()).await?;
        decode_json(&request, response)
    }

    /// [`AuthedFetch::api_call`] without a token, for public endpoints.
    pub async fn public_api_call<T: DeserializeOwned>(
        &self,
        request: FetchRequest,
    ) -> FetchResult<T> {
        let request = with_json_content_type(request);
        let response = self.fetch_public(&request).await?;
        decode_json(&request, response)
    }

    async fn send(&self, request: &FetchRequest, token: Option<&str>) -> FetchResult<FetchResponse> {
        let mut builder = self.http.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        debug!(
            method = %request.method,
            url = %request.url,
            status = status.as_u16(),
            "request completed"
        );

        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}

fn with_json_content_type(request: FetchRequest) -> FetchRequest {
    if request.has_header("content-type") {
        request
    } else {
        request.header("Content-Type", "application/json")
    }
}

fn decode_json<T: DeserializeOwned>(
    request: &FetchRequest,
    response: FetchResponse,
) -> FetchResult<T> {
    if !response.is_success() {
        let status = response.status.as_u16();
        let body = response.text();
        warn!(method = %request.method, url = %request.url, status, "API call failed");
        return Err(FetchError::Status { status, body });
    }
    response.json()
}
