//! Transport and retrieval errors.
//!
//! [`TransportError`] describes what went wrong with one HTTP exchange.
//! [`RetrievalError`] wraps it with enough context (kind, filters, page or id)
//! for the caller to retry the exact same request.

use mangal_types::EntityKind;
use thiserror::Error;

use crate::query::Query;

/// Failure of a single request against the REST API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("server returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("missing or malformed Content-Range header: {0:?}")]
    ContentRange(Option<String>),
}

impl TransportError {
    /// Whether repeating the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Timeout | TransportError::Connection(_) => true,
            TransportError::Status { status, .. } => *status == 429 || *status >= 500,
            TransportError::Decode(_) | TransportError::ContentRange(_) => false,
        }
    }
}

/// A retrieval step that failed, with the parameters needed to retry it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RetrievalError {
    #[error("fetching {kind} page {page} ({query}) failed: {source}")]
    Page {
        kind: EntityKind,
        query: Query,
        page: u64,
        source: TransportError,
    },

    #[error("counting {kind} ({query}) failed: {source}")]
    Count {
        kind: EntityKind,
        query: Query,
        source: TransportError,
    },

    #[error("fetching {kind} {id} failed: {source}")]
    Entity {
        kind: EntityKind,
        id: u64,
        source: TransportError,
    },

    #[error("retrieval cancelled")]
    Cancelled,
}

impl RetrievalError {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        self.transport().is_some_and(TransportError::is_transient)
    }

    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            RetrievalError::Page { source, .. }
            | RetrievalError::Count { source, .. }
            | RetrievalError::Entity { source, .. } => Some(source),
            RetrievalError::Cancelled => None,
        }
    }

    /// Page index of a failed listing request.
    pub fn page(&self) -> Option<u64> {
        match self {
            RetrievalError::Page { page, .. } => Some(*page),
            _ => None,
        }
    }
}
