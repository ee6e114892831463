//! Environment variable configuration.
//!
//! Every tunable of the client is read from a `MANGAL_*` variable with a
//! compiled-in default. Unset or unparsable values fall back to the default.
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `MANGAL_API_URL` | Base URL of the REST API | `https://mangal.io/api/v2` |
//! | `MANGAL_TIMEOUT_SECS` | Per-request timeout | 30 |
//! | `MANGAL_CONNECT_TIMEOUT_SECS` | Connect timeout | 10 |
//! | `MANGAL_RETRIES` | Automatic retries of transient failures | 0 |
//! | `MANGAL_PAGE_SIZE` | Records per listing page | 100 |
//! | `MANGAL_WORKERS` | Worker threads for pages and hydration | 1 |
//!
//! # Example
//!
//! ```
//! use mangal_types::env_utils::{env_secs_or, env_var_or};
//!
//! let page_size: usize = env_var_or("MANGAL_PAGE_SIZE", 100);
//! let timeout = env_secs_or("MANGAL_TIMEOUT_SECS", 30);
//! assert!(page_size > 0 && timeout.as_secs() > 0);
//! ```

use std::str::FromStr;
use std::time::Duration;

pub const API_URL_VAR: &str = "MANGAL_API_URL";
pub const TIMEOUT_VAR: &str = "MANGAL_TIMEOUT_SECS";
pub const CONNECT_TIMEOUT_VAR: &str = "MANGAL_CONNECT_TIMEOUT_SECS";
pub const PAGE_SIZE_VAR: &str = "MANGAL_PAGE_SIZE";
pub const WORKERS_VAR: &str = "MANGAL_WORKERS";
pub const RETRIES_VAR: &str = "MANGAL_RETRIES";

/// Parse an environment variable into a type that implements `FromStr`.
///
/// Returns `None` if the variable is not set or cannot be parsed.
pub fn env_var<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Parse an environment variable with a default value.
pub fn env_var_or<T: FromStr>(key: &str, default: T) -> T {
    env_var(key).unwrap_or(default)
}

/// Read a whole number of seconds as a [`Duration`].
pub fn env_secs_or(key: &str, default_secs: u64) -> Duration {
    Duration::from_secs(env_var_or(key, default_secs))
}

/// Get an environment variable as a string with a default value.
///
/// Empty values count as unset.
pub fn env_string_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
