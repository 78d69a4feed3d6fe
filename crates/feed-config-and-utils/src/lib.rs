//! Configuration, paths, and logging setup shared by feedkit crates.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_COMPANION_URL, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_LOG_LEVEL,
    DEFAULT_ORDER_FIELD, DEFAULT_PAGE_SIZE, DEFAULT_POLL_INTERVAL_MS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, normalize_level};
pub use paths::{Paths, HOME_ENV};
