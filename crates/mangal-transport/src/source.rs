//! The REST boundary.
//!
//! Everything above the transport talks to the remote database through
//! [`RecordSource`]. Requests are idempotent: the same kind, filters and page
//! always address the same slice of records, which is what makes caller-driven
//! retries and parallel page fetches safe.

use std::sync::Arc;

use mangal_types::EntityKind;
use serde_json::Value;

use crate::error::TransportError;
use crate::query::Query;

/// One page of a listing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRequest {
    /// Zero-based page index.
    pub index: u64,
    /// Records per page.
    pub size: usize,
}

impl PageRequest {
    pub fn new(index: u64, size: usize) -> Self {
        Self { index, size }
    }

    /// Offset of the first record of this page.
    pub fn offset(&self) -> u64 {
        self.index.saturating_mul(self.size as u64)
    }
}

/// Listing, count and single-entity endpoints for every entity kind.
pub trait RecordSource: Send + Sync {
    /// Records of one page, in server order.
    fn list(
        &self,
        kind: EntityKind,
        query: &Query,
        page: PageRequest,
    ) -> Result<Vec<Value>, TransportError>;

    /// Total number of records matching `query`.
    fn count(&self, kind: EntityKind, query: &Query) -> Result<u64, TransportError>;

    /// One record by identifier; `None` when the server has no such record.
    fn get(&self, kind: EntityKind, id: u64) -> Result<Option<Value>, TransportError>;
}

impl<S: RecordSource + ?Sized> RecordSource for Arc<S> {
    fn list(
        &self,
        kind: EntityKind,
        query: &Query,
        page: PageRequest,
    ) -> Result<Vec<Value>, TransportError> {
        (**self).list(kind, query, page)
    }

    fn count(&self, kind: EntityKind, query: &Query) -> Result<u64, TransportError> {
        (**self).count(kind, query)
    }

    fn get(&self, kind: EntityKind, id: u64) -> Result<Option<Value>, TransportError> {
        (**self).get(kind, id)
    }
}

impl<S: RecordSource + ?Sized> RecordSource for &S {
    fn list(
        &self,
        kind: EntityKind,
        query: &Query,
        page: PageRequest,
    ) -> Result<Vec<Value>, TransportError> {
        (**self).list(kind, query, page)
    }

    fn count(&self, kind: EntityKind, query: &Query) -> Result<u64, TransportError> {
        (**self).count(kind, query)
    }

    fn get(&self, kind: EntityKind, id: u64) -> Result<Option<Value>, TransportError> {
        (**self).get(kind, id)
    }
}
