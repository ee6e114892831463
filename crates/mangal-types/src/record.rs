//! Raw records as served by the listing and single-entity endpoints.
//!
//! A [`RawRecord`] is a JSON object that has been checked against the entity
//! hierarchy: it has an integer `id`, and every declared foreign-key field is
//! either absent, `null`, or an integer identifier. Kind-specific metadata is
//! decoded later, when the record is hydrated.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::SchemaError;
use crate::kind::{EntityKey, EntityKind, ReferenceField};

/// A validated, not yet hydrated record.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    kind: EntityKind,
    id: u64,
    body: Map<String, Value>,
}

impl RawRecord {
    /// Validate a JSON value against the hierarchy entry for `kind`.
    pub fn parse(kind: EntityKind, value: Value) -> Result<Self, SchemaError> {
        let Value::Object(body) = value else {
            return Err(SchemaError::NotAnObject { kind });
        };

        let id = body
            .get("id")
            .and_then(as_identifier)
            .ok_or(SchemaError::MissingId { kind })?;

        for reference in kind.references() {
            match body.get(reference.field) {
                None | Some(Value::Null) => {}
                Some(v) if as_identifier(v).is_some() => {}
                Some(_) => {
                    return Err(SchemaError::InvalidReference {
                        kind,
                        id,
                        field: reference.field,
                    })
                }
            }
        }

        Ok(Self { kind, id, body })
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.kind, self.id)
    }

    /// Untyped field access.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }

    /// Identifier stored in a foreign-key field, if set.
    pub fn reference(&self, field: &str) -> Option<u64> {
        self.body.get(field).and_then(as_identifier)
    }

    /// All set foreign keys with their declared target kinds.
    pub fn references(&self) -> Vec<(ReferenceField, u64)> {
        self.kind
            .references()
            .iter()
            .filter_map(|r| self.reference(r.field).map(|id| (*r, id)))
            .collect()
    }

    /// Decode the kind-specific metadata into a typed struct.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, SchemaError> {
        serde_json::from_value(Value::Object(self.body.clone())).map_err(|e| {
            SchemaError::Malformed {
                kind: self.kind,
                id: self.id,
                message: e.to_string(),
            }
        })
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.body)
    }
}

// The API serves identifiers as JSON integers; integral floats and numeric
// strings show up in older datasets and are accepted too.
fn as_identifier(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
