//! REST Client for the Mangal API
//!
//! ## Endpoints
//! - Production: `https://mangal.io/api/v2`
//!
//! Every entity kind has a listing endpoint (`/<endpoint>?count=&page=&...`)
//! returning a JSON array, and a single-entity endpoint (`/<endpoint>/<id>`)
//! returning one object. Totals are read from the `Content-Range` header of a
//! listing response, which has the form `<endpoint> <first>-<last>/<total>`.
//!
//! ## Usage
//!
//! ```ignore
//! let client = RestClient::mangal();
//! let total = client.count(EntityKind::Network, &Query::new())?;
//! let first = client.list(EntityKind::Network, &Query::new(), PageRequest::new(0, 100))?;
//! let one = client.get(EntityKind::Network, 19)?;
//! ```

use std::time::Duration;

use mangal_types::env_utils::{
    env_secs_or, env_string_or, API_URL_VAR, CONNECT_TIMEOUT_VAR, TIMEOUT_VAR,
};
use mangal_types::{EntityKind, RetryConfig};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::query::Query;
use crate::source::{PageRequest, RecordSource};

pub const DEFAULT_API_URL: &str = "https://mangal.io/api/v2";

/// HTTP client for the Mangal REST API.
#[derive(Clone)]
pub struct RestClient {
    base_url: String,
    agent: ureq::Agent,
    retry: RetryConfig,
}

impl RestClient {
    /// Default request timeout in seconds (can be overridden by env).
    const DEFAULT_TIMEOUT_SECS: u64 = 30;
    /// Default connect timeout in seconds (can be overridden by env).
    const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

    fn default_timeouts() -> (Duration, Duration) {
        (
            env_secs_or(TIMEOUT_VAR, Self::DEFAULT_TIMEOUT_SECS),
            env_secs_or(CONNECT_TIMEOUT_VAR, Self::DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    fn build_agent(timeout: Duration, connect_timeout: Duration) -> ureq::Agent {
        ureq::AgentBuilder::new()
            .timeout(timeout)
            .timeout_connect(connect_timeout)
            .build()
    }

    /// Client for the public API, honouring `MANGAL_API_URL` and `MANGAL_RETRIES`.
    pub fn mangal() -> Self {
        Self::new(&env_string_or(API_URL_VAR, DEFAULT_API_URL)).with_retry(RetryConfig::from_env())
    }

    /// Create a client with a custom base URL.
    pub fn new(base_url: &str) -> Self {
        let (timeout, connect_timeout) = Self::default_timeouts();
        Self::with_timeouts(base_url, timeout, connect_timeout)
    }

    /// Create a client with explicit timeouts.
    pub fn with_timeouts(base_url: &str, timeout: Duration, connect_timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: Self::build_agent(timeout, connect_timeout),
            retry: RetryConfig::none(),
        }
    }

    /// Retry transient failures (timeouts, connection errors, 429 and 5xx).
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn listing_url(&self, kind: EntityKind) -> String {
        format!("{}/{}", self.base_url, kind.endpoint())
    }

    fn entity_url(&self, kind: EntityKind, id: u64) -> String {
        format!("{}/{}/{}", self.base_url, kind.endpoint(), id)
    }

    fn listing_request(&self, kind: EntityKind, query: &Query, page: PageRequest) -> ureq::Request {
        let mut request = self
            .agent
            .get(&self.listing_url(kind))
            .query("count", &page.size.to_string())
            .query("page", &page.index.to_string());
        for (key, value) in query.to_pairs() {
            request = request.query(&key, &value);
        }
        request
    }

    /// Send a request, retrying transient failures per the retry config.
    fn call(&self, request: &ureq::Request) -> Result<ureq::Response, TransportError> {
        let mut attempt = 0;
        loop {
            match request.clone().call() {
                Ok(response) => return Ok(response),
                Err(err) => {
                    let err = map_ureq_error(err);
                    if !err.is_transient() || attempt >= self.retry.retries {
                        return Err(err);
                    }
                    let backoff = self.retry.backoff(attempt);
                    warn!(
                        url = request.url(),
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "retrying transient failure"
                    );
                    std::thread::sleep(backoff);
                    attempt += 1;
                }
            }
        }
    }
}

impl RecordSource for RestClient {
    fn list(
        &self,
        kind: EntityKind,
        query: &Query,
        page: PageRequest,
    ) -> Result<Vec<Value>, TransportError> {
        let request = self.listing_request(kind, query, page);
        debug!(url = request.url(), page = page.index, "GET listing");
        let body: Value = self
            .call(&request)?
            .into_json()
            .map_err(|e| TransportError::Decode(e.to_string()))?;

        match body {
            Value::Array(records) => Ok(records),
            other => Err(TransportError::Decode(format!(
                "expected a JSON array, got {}",
                json_type(&other)
            ))),
        }
    }

    fn count(&self, kind: EntityKind, query: &Query) -> Result<u64, TransportError> {
        let request = self.listing_request(kind, query, PageRequest::new(0, 1));
        debug!(url = request.url(), "GET count");
        let response = self.call(&request)?;
        parse_content_range(response.header("Content-Range"))
    }

    fn get(&self, kind: EntityKind, id: u64) -> Result<Option<Value>, TransportError> {
        let request = self.agent.get(&self.entity_url(kind, id));
        debug!(url = request.url(), "GET entity");
        let response = match self.call(&request) {
            Ok(response) => response,
            Err(TransportError::Status { status: 404, .. }) => return Ok(None),
            Err(err) => return Err(err),
        };
        let body: Value = response
            .into_json()
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        match body {
            Value::Null => Ok(None),
            other => Ok(Some(other)),
        }
    }
}

/// Total from a `Content-Range` header such as `network 0-99/1234`.
pub fn parse_content_range(header: Option<&str>) -> Result<u64, TransportError> {
    let malformed = || TransportError::ContentRange(header.map(str::to_string));
    let (_, total) = header.and_then(|h| h.rsplit_once('/')).ok_or_else(malformed)?;
    total.trim().parse().map_err(|_| malformed())
}

fn map_ureq_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Status(status, response) => {
            let message = response.into_string().unwrap_or_default();
            TransportError::Status { status, message }
        }
        ureq::Error::Transport(transport) => {
            let timed_out = std::error::Error::source(&transport)
                .and_then(|source| source.downcast_ref::<std::io::Error>())
                .is_some_and(|io| {
                    matches!(
                        io.kind(),
                        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                    )
                });
            if timed_out || transport.to_string().contains("timed out") {
                TransportError::Timeout
            } else {
                TransportError::Connection(transport.to_string())
            }
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
