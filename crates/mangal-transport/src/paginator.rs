//! Page-index pagination.
//!
//! A [`Paginator`] is an immutable description of a listing (source, kind,
//! filters, page size). It first asks the count endpoint for the total and
//! then requests exactly `ceil(total / page_size)` pages, indices `0..n`, even
//! if the last page is partially filled. The page index is a plain argument
//! of each request; there is no cursor shared between fetches, so the same
//! paginator can be iterated again from the start or fetched in parallel.
//!
//! ```ignore
//! let paginator = Paginator::new(&client, EntityKind::Network, Query::new())
//!     .with_page_size(100);
//!
//! // Lazily, page by page
//! for page in paginator.pages() {
//!     for record in page? { /* ... */ }
//! }
//!
//! // Or everything at once on a worker pool, still in page order
//! let pool = rayon::ThreadPoolBuilder::new().num_threads(4).build()?;
//! let records = paginator.collect_parallel(&pool)?;
//! ```

use mangal_types::EntityKind;
use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::RetrievalError;
use crate::query::Query;
use crate::source::{PageRequest, RecordSource};

/// Records per page unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Largest page the API serves.
pub const MAX_PAGE_SIZE: usize = 1000;

/// A restartable listing of one entity kind.
pub struct Paginator<'a, S: RecordSource + ?Sized> {
    source: &'a S,
    kind: EntityKind,
    query: Query,
    page_size: usize,
    cancel: CancelToken,
}

impl<'a, S: RecordSource + ?Sized> Clone for Paginator<'a, S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source,
            kind: self.kind,
            query: self.query.clone(),
            page_size: self.page_size,
            cancel: self.cancel.clone(),
        }
    }
}

impl<'a, S: RecordSource + ?Sized> Paginator<'a, S> {
    /// Create a paginator with the default page size.
    ///
    /// Filter pairs named `count` or `page` are dropped: those parameters
    /// belong to the paginator.
    pub fn new(source: &'a S, kind: EntityKind, query: Query) -> Self {
        let (query, reserved) = query.without_reserved();
        for (key, value) in reserved {
            warn!(%kind, key = %key, value = %value, "dropping reserved pagination key from filters");
        }
        Self {
            source,
            kind,
            query,
            page_size: DEFAULT_PAGE_SIZE,
            cancel: CancelToken::new(),
        }
    }

    /// Set the page size, clamped to `1..=MAX_PAGE_SIZE`.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Stop before the next page request once `cancel` is triggered.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of records matching the filters.
    pub fn total(&self) -> Result<u64, RetrievalError> {
        self.source
            .count(self.kind, &self.query)
            .map_err(|source| RetrievalError::Count {
                kind: self.kind,
                query: self.query.clone(),
                source,
            })
    }

    /// Number of pages needed for `total` records.
    pub fn pages_for(&self, total: u64) -> u64 {
        total.div_ceil(self.page_size as u64)
    }

    /// Fetch one page by index.
    pub fn fetch_page(&self, index: u64) -> Result<Vec<Value>, RetrievalError> {
        if self.cancel.is_cancelled() {
            return Err(RetrievalError::Cancelled);
        }
        let request = PageRequest::new(index, self.page_size);
        let records = self
            .source
            .list(self.kind, &self.query, request)
            .map_err(|source| RetrievalError::Page {
                kind: self.kind,
                query: self.query.clone(),
                page: index,
                source,
            })?;
        debug!(kind = %self.kind, page = index, records = records.len(), "fetched page");
        Ok(records)
    }

    /// Lazy iterator over pages. Each call starts again from page 0.
    pub fn pages(&self) -> Pages<'a, S> {
        Pages {
            paginator: self.clone(),
            total_pages: None,
            next: 0,
            done: false,
        }
    }

    /// Lazy iterator over individual records, in page order.
    pub fn records(&self) -> impl Iterator<Item = Result<Value, RetrievalError>> + 'a {
        self.pages().flat_map(|page| match page {
            Ok(records) => records.into_iter().map(Ok).collect::<Vec<_>>(),
            Err(err) => vec![Err(err)],
        })
    }

    /// Fetch every page sequentially.
    pub fn collect_all(&self) -> Result<Vec<Value>, RetrievalError> {
        let mut all = Vec::new();
        for page in self.pages() {
            all.extend(page?);
        }
        Ok(all)
    }

    /// Fetch every page on `pool`, returning records in page order.
    ///
    /// The first failing page (lowest index) is reported.
    pub fn collect_parallel(&self, pool: &rayon::ThreadPool) -> Result<Vec<Value>, RetrievalError> {
        let total = self.total()?;
        let page_count = self.pages_for(total);
        debug!(kind = %self.kind, total, pages = page_count, threads = pool.current_num_threads(), "parallel pagination");

        let pages: Vec<Result<Vec<Value>, RetrievalError>> = pool.install(|| {
            (0..page_count)
                .into_par_iter()
                .map(|index| self.fetch_page(index))
                .collect()
        });

        let fetched = pages.iter().map(|p| p.as_ref().map_or(0, Vec::len)).sum();
        let mut all = Vec::with_capacity(fetched);
        for page in pages {
            all.extend(page?);
        }
        Ok(all)
    }
}

/// Iterator over the pages of a [`Paginator`].
///
/// Yields `Err` at most once; iteration ends after a failure.
pub struct Pages<'a, S: RecordSource + ?Sized> {
    paginator: Paginator<'a, S>,
    total_pages: Option<u64>,
    next: u64,
    done: bool,
}

impl<'a, S: RecordSource + ?Sized> Pages<'a, S> {
    /// Total page count, once the count request has been made.
    pub fn total_pages(&self) -> Option<u64> {
        self.total_pages
    }
}

impl<'a, S: RecordSource + ?Sized> Iterator for Pages<'a, S> {
    type Item = Result<Vec<Value>, RetrievalError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let total_pages = match self.total_pages {
            Some(n) => n,
            None => {
                if self.paginator.cancel.is_cancelled() {
                    self.done = true;
                    return Some(Err(RetrievalError::Cancelled));
                }
                match self.paginator.total() {
                    Ok(total) => {
                        let n = self.paginator.pages_for(total);
                        debug!(kind = %self.paginator.kind, total, pages = n, "pagination sized");
                        self.total_pages = Some(n);
                        n
                    }
                    Err(err) => {
                        self.done = true;
                        return Some(Err(err));
                    }
                }
            }
        };

        if self.next >= total_pages {
            self.done = true;
            return None;
        }

        let result = self.paginator.fetch_page(self.next);
        if result.is_err() {
            self.done = true;
        }
        self.next += 1;
        Some(result)
    }
}
