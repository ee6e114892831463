//! Mangal Resolver
//!
//! Turns raw records into hydrated entities for one session.
//!
//! This crate provides:
//! - [`cache`]: the [`SessionCache`], keyed by `(kind, id)`, with a per-key fill lock
//! - [`resolver`]: the [`ReferenceResolver`], which follows foreign keys through the
//!   entity hierarchy and attaches a diagnostic to every relation it could not resolve
//!
//! # At-most-once fetching
//!
//! Each `(kind, id)` is requested from the API at most once per session, also
//! when many records referring to it are hydrated concurrently: the first
//! caller fetches while the others wait on the same key, then read the cached
//! value. Only successful fetches are cached, so a failed relation can be
//! retried by resolving it again.

pub mod cache;
pub mod resolver;

pub use cache::{CacheStats, SessionCache};
pub use resolver::{ReferenceResolver, ResolveError};
