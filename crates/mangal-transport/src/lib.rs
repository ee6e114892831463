//! Mangal Transport Layer
//!
//! Network transport for the Mangal REST API.
//!
//! This crate provides:
//! - [`query`]: ordered key/value filters ([`Query`])
//! - [`source`]: the [`RecordSource`] boundary (listing, count, single entity)
//! - [`rest`]: [`RestClient`], the HTTP implementation of [`RecordSource`]
//! - [`paginator`]: page-index pagination with exact page counts ([`Paginator`])
//! - [`mock`]: an in-memory [`MockSource`] that records every request
//!
//! # Example
//!
//! ```ignore
//! use mangal_transport::{Paginator, Query, RestClient};
//! use mangal_types::EntityKind;
//!
//! let client = RestClient::mangal();
//! let query = Query::new().with("type", "predation");
//! let paginator = Paginator::new(&client, EntityKind::Interaction, query).with_page_size(200);
//!
//! for page in paginator.pages() {
//!     let records = page?;
//!     println!("{} records", records.len());
//! }
//! ```

pub mod cancel;
pub mod error;
pub mod mock;
pub mod paginator;
pub mod query;
pub mod rest;
pub mod source;

pub use cancel::CancelToken;
pub use error::{RetrievalError, TransportError};
pub use mock::MockSource;
pub use paginator::{Pages, Paginator, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use query::{FilterValue, Query};
pub use rest::RestClient;
pub use source::{PageRequest, RecordSource};
