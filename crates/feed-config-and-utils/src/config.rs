//! Client configuration: JSON file plus environment overrides.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_COMPANION_URL: &str = "http://localhost:4000";
pub const DEFAULT_PAGE_SIZE: usize = 8;
pub const DEFAULT_ORDER_FIELD: &str = "createdAt";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Main client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Companion HTTP service base URL (sign-in, sign-up, profile sync).
    #[serde(default = "default_companion_url")]
    pub companion_url: String,
    /// Document store REST base URL. `None` means no backend is configured.
    #[serde(default)]
    pub store_url: Option<String>,
    #[serde(default)]
    pub store_api_key: Option<String>,
    /// Identity API base URL. `None` means no auth subsystem is configured.
    #[serde(default)]
    pub identity_url: Option<String>,
    #[serde(default)]
    pub identity_api_key: Option<String>,
    /// Feed page size.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Feed ordering field (always descending).
    #[serde(default = "default_order_field")]
    pub order_field: String,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Poll interval for REST document listeners.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_companion_url() -> String {
    DEFAULT_COMPANION_URL.to_string()
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_order_field() -> String {
    DEFAULT_ORDER_FIELD.to_string()
}

fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            companion_url: default_companion_url(),
            store_url: None,
            store_api_key: None,
            identity_url: None,
            identity_api_key: None,
            page_size: DEFAULT_PAGE_SIZE,
            order_field: default_order_field(),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl Config {
    /// Defaults overridden from the process environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Load `config.json` under `paths` (defaults when absent), then apply
    /// environment overrides and validate.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override fields from `FEEDKIT_*` variables resolved through `lookup`.
    /// Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(level) = get("FEEDKIT_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(url) = get("FEEDKIT_COMPANION_URL") {
            self.companion_url = url;
        }
        if let Some(url) = get("FEEDKIT_STORE_URL") {
            self.store_url = Some(url);
        }
        if let Some(key) = get("FEEDKIT_STORE_API_KEY") {
            self.store_api_key = Some(key);
        }
        if let Some(url) = get("FEEDKIT_IDENTITY_URL") {
            self.identity_url = Some(url);
        }
        if let Some(key) = get("FEEDKIT_IDENTITY_API_KEY") {
            self.identity_api_key = Some(key);
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.page_size == 0 {
            return Err(CoreError::Config(
                "page_size must be greater than zero".to_string(),
            ));
        }
        if self.order_field.trim().is_empty() {
            return Err(CoreError::Config("order_field must not be empty".to_string()));
        }
        self.companion_url()?;
        self.store_url()?;
        self.identity_url()?;
        Ok(())
    }

    pub fn companion_url(&self) -> CoreResult<Url> {
        Url::parse(&self.companion_url).map_err(CoreError::from)
    }

    pub fn store_url(&self) -> CoreResult<Option<Url>> {
        self.store_url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(CoreError::from)
    }

    pub fn identity_url(&self) -> CoreResult<Option<Url>> {
        self.identity_url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(CoreError::from)
    }
}
