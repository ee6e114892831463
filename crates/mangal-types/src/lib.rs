//! Shared types for the mangal workspace.
//!
//! This crate provides the foundational vocabulary used by the transport,
//! resolver and materialization layers:
//!
//! - [`kind`]: the seven entity kinds and the fixed reference hierarchy between them
//! - [`record`]: raw JSON records as returned by the API, validated against the hierarchy
//! - [`entity`]: hydrated, immutable entities with their relations populated
//! - [`error`]: data-shape diagnostics (schema, hydration and conversion failures)
//! - [`env_utils`]: environment variable helpers used for configuration

pub mod entity;
pub mod env_utils;
pub mod error;
pub mod kind;
pub mod record;

pub use entity::{
    Attribute, Dataset, Direction, Entity, EntityRecord, Interaction, Link, Network, Node,
    Reference, ReferenceTaxon, Strength,
};
pub use env_utils::{env_secs_or, env_string_or, env_var, env_var_or};
pub use error::{
    ConversionError, ConversionFailure, Endpoint, HydrationError, HydrationFailure, SchemaError,
};
pub use kind::{EntityKey, EntityKind, ReferenceField, ALL_KINDS};
pub use record::RawRecord;

use std::time::Duration;

/// Configuration for retry behavior on network operations.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Number of retry attempts after the first failure.
    pub retries: usize,
    /// Initial backoff duration between retries.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
}

impl RetryConfig {
    /// Create a new RetryConfig with the specified parameters.
    pub fn new(retries: usize, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            retries,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms),
        }
    }

    /// No automatic retries; failures surface to the caller immediately.
    pub fn none() -> Self {
        Self::new(0, 0, 0)
    }

    /// Read the retry count from `MANGAL_RETRIES`, keeping the default backoff.
    pub fn from_env() -> Self {
        Self {
            retries: env_var_or(env_utils::RETRIES_VAR, 0),
            ..Self::default()
        }
    }

    /// Backoff before the given retry attempt (0-based), doubling up to `max_backoff`.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16) as u32).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 0,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_millis(5000),
        }
    }
}
