//! Bearer-authenticated HTTP for the feed client.
//!
//! [`AuthedFetch`] attaches an ID token from a [`TokenProvider`] to each
//! request and, on a 401, retries with a force-refreshed token a bounded
//! number of times. [`AuthedFetch::api_call`] layers JSON decoding and
//! status checking on top. [`CompanionClient`] types the companion
//! service's endpoints.

pub mod companion;
mod error;
mod fetch;
#[cfg(any(test, feature = "test-support"))]
pub mod stub_server;
mod token;

pub use companion::{
    CompanionClient, CustomTokenResponse, HealthResponse, ProfileResponse, SignInRequest,
    SignUpRequest, SyncResponse,
};
pub use error::{FetchError, FetchResult};
pub use fetch::{AuthedFetch, FetchOptions, FetchRequest, FetchResponse};
pub use token::{StaticTokenProvider, TokenProvider};

/// Re-exported so callers can build requests without depending on reqwest.
pub use reqwest::{Method, StatusCode};
