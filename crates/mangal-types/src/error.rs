//! Data-shape diagnostics.
//!
//! These errors describe problems with individual records rather than with
//! the transport. They are collected next to partial results instead of
//! aborting a bulk operation:
//!
//! | Error | Scope |
//! |-------|-------|
//! | [`SchemaError`] | one record violates the entity hierarchy; that record is dropped |
//! | [`HydrationError`] | one relation could not be resolved; attached to the owning record |
//! | [`ConversionError`] | one interaction cannot become an edge; skipped during materialization |

use std::fmt;

use thiserror::Error;

use crate::kind::EntityKind;

/// A record whose shape violates the fixed entity hierarchy.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("{kind} record is not a JSON object")]
    NotAnObject { kind: EntityKind },

    #[error("{kind} record has no integer `id`")]
    MissingId { kind: EntityKind },

    #[error("{kind} {id}: field `{field}` is not an identifier")]
    InvalidReference {
        kind: EntityKind,
        id: u64,
        field: &'static str,
    },

    #[error("{kind} {id}: {message}")]
    Malformed {
        kind: EntityKind,
        id: u64,
        message: String,
    },

    #[error("requested {kind} {requested} but the server returned {kind} {returned}")]
    IdentifierMismatch {
        kind: EntityKind,
        requested: u64,
        returned: u64,
    },

    #[error("{kind} {id}: `{field}` should reference a {expected}, resolved a {found}")]
    RelationMismatch {
        kind: EntityKind,
        id: u64,
        field: &'static str,
        expected: EntityKind,
        found: EntityKind,
    },

    #[error("{parent} is not a parent of {kind}")]
    UnrelatedParent {
        kind: EntityKind,
        parent: EntityKind,
    },
}

impl SchemaError {
    /// Kind of the offending record.
    pub fn kind(&self) -> EntityKind {
        match self {
            SchemaError::NotAnObject { kind }
            | SchemaError::MissingId { kind }
            | SchemaError::InvalidReference { kind, .. }
            | SchemaError::Malformed { kind, .. }
            | SchemaError::IdentifierMismatch { kind, .. }
            | SchemaError::RelationMismatch { kind, .. }
            | SchemaError::UnrelatedParent { kind, .. } => *kind,
        }
    }

    /// Identifier of the offending record, when it could be read.
    pub fn id(&self) -> Option<u64> {
        match self {
            SchemaError::InvalidReference { id, .. }
            | SchemaError::Malformed { id, .. }
            | SchemaError::RelationMismatch { id, .. } => Some(*id),
            SchemaError::IdentifierMismatch { requested, .. } => Some(*requested),
            SchemaError::NotAnObject { .. }
            | SchemaError::MissingId { .. }
            | SchemaError::UnrelatedParent { .. } => None,
        }
    }
}

/// Why a relation could not be resolved.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HydrationFailure {
    #[error("not found")]
    NotFound,

    #[error("retrieval failed: {0}")]
    Retrieval(String),

    #[error("malformed payload: {0}")]
    Schema(SchemaError),

    #[error("cancelled")]
    Cancelled,
}

impl HydrationFailure {
    /// Whether resolving the relation again may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, HydrationFailure::Retrieval(_) | HydrationFailure::Cancelled)
    }
}

/// A reference field of one record that could not be resolved.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{owner} {owner_id}: cannot resolve `{field}` -> {target} {target_id}: {reason}")]
pub struct HydrationError {
    pub owner: EntityKind,
    pub owner_id: u64,
    pub field: &'static str,
    pub target: EntityKind,
    pub target_id: u64,
    pub reason: HydrationFailure,
}

/// Which end of an interaction a diagnostic refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Source,
    Target,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Source => f.write_str("source"),
            Endpoint::Target => f.write_str("target"),
        }
    }
}

/// Why an interaction could not be turned into an edge.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionFailure {
    #[error("{endpoint} node is missing")]
    MissingEndpoint { endpoint: Endpoint },

    #[error("{endpoint} node could not be resolved: {reason}")]
    UnresolvedEndpoint {
        endpoint: Endpoint,
        reason: HydrationFailure,
    },

    #[error("{endpoint} node {node} belongs to network {found:?}, expected {expected}")]
    ForeignEndpoint {
        endpoint: Endpoint,
        node: u64,
        found: Option<u64>,
        expected: u64,
    },

    #[error("interaction belongs to network {found:?}, expected {expected}")]
    ForeignInteraction { found: Option<u64>, expected: u64 },

    #[error("{strength} interaction has no value")]
    MissingValue { strength: &'static str },

    #[error("probability {0} is outside [0, 1]")]
    InvalidProbability(f64),

    #[error("magnitude {0} is negative or not finite")]
    InvalidMagnitude(f64),
}

/// One interaction skipped during materialization.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("interaction {interaction}: {reason}")]
pub struct ConversionError {
    pub interaction: u64,
    pub reason: ConversionFailure,
}
