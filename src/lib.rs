//! Mangal
//!
//! Retrieval of ecological interaction networks from the Mangal database:
//!
//! - **Querying**: ordered filter pairs, paginated listings and counts ([`mangal_transport`])
//! - **Resolution**: foreign keys hydrated into typed entities, each fetched once per
//!   session ([`mangal_resolver`])
//! - **Materialization**: one network's interactions as nodes and weighted edges ([`network`])
//! - **Counting**: global or parent-scoped counts and network summaries ([`count`])
//!
//! See [`session::Session`] for the entry point.

pub mod config;
pub mod count;
pub mod network;
pub mod session;

pub use config::SessionConfig;
pub use count::{CountAggregator, NetworkSummary, INTERACTION_TYPES};
pub use network::{materialize, Edge, MaterializedNetwork, WeightMatrix};
pub use session::{BulkNetworks, EntityStream, Failure, Session};

pub use mangal_resolver::{ReferenceResolver, ResolveError, SessionCache};
pub use mangal_transport::{
    CancelToken, MockSource, Paginator, Query, RecordSource, RestClient, RetrievalError,
    TransportError,
};
pub use mangal_types::{
    ConversionError, Entity, EntityKey, EntityKind, HydrationError, SchemaError, Strength,
};

use thiserror::Error;

/// Errors returned by [`Session`] operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A request failed; the error carries what is needed to retry it.
    #[error(transparent)]
    Retrieval(RetrievalError),

    #[error(transparent)]
    Schema(SchemaError),

    #[error("{0} not found")]
    NotFound(EntityKey),

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Whether repeating the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Retrieval(e) if e.is_retryable())
    }
}

impl From<RetrievalError> for Error {
    fn from(err: RetrievalError) -> Self {
        match err {
            RetrievalError::Cancelled => Error::Cancelled,
            other => Error::Retrieval(other),
        }
    }
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        Error::Schema(err)
    }
}

impl From<ResolveError> for Error {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound(key) => Error::NotFound(key),
            ResolveError::Retrieval(e) => e.into(),
            ResolveError::Schema(e) => Error::Schema(e),
            ResolveError::Cancelled => Error::Cancelled,
        }
    }
}
