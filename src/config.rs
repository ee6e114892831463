//! Session configuration.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `MANGAL_API_URL` | `https://mangal.io/api/v2` | API base URL |
//! | `MANGAL_TIMEOUT_SECS` | 30 | request timeout |
//! | `MANGAL_CONNECT_TIMEOUT_SECS` | 10 | connect timeout |
//! | `MANGAL_RETRIES` | 0 | automatic retries of transient failures |
//! | `MANGAL_PAGE_SIZE` | 100 | records per page (at most 1000) |
//! | `MANGAL_WORKERS` | 1 | worker threads for pages and hydration |
//!
//! The first four are read by [`RestClient::mangal`](mangal_transport::RestClient::mangal).

use mangal_transport::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use mangal_types::env_utils::{env_var_or, PAGE_SIZE_VAR, WORKERS_VAR};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub page_size: usize,
    /// Threads used for page fetches and hydration; 1 means sequential.
    pub workers: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            workers: 1,
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        Self::default()
            .with_page_size(env_var_or(PAGE_SIZE_VAR, DEFAULT_PAGE_SIZE))
            .with_workers(env_var_or(WORKERS_VAR, 1))
    }

    /// Clamped to `1..=MAX_PAGE_SIZE`.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Worker pool for parallel fetches, or `None` when sequential.
    pub(crate) fn build_pool(&self) -> Option<rayon::ThreadPool> {
        if self.workers <= 1 {
            return None;
        }
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("mangal-worker-{i}"))
            .build()
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                warn!(workers = self.workers, error = %e, "falling back to sequential fetching");
                None
            }
        }
    }
}
