//! Ordered key/value filters for listing and count requests.
//!
//! The API accepts arbitrary query parameters, so a [`Query`] is a permissive
//! list of pairs: keys may repeat, insertion order is kept, and unknown keys
//! are passed through verbatim. Only the helpers that derive keys from the
//! entity hierarchy ([`Query::parent`]) know anything about field names.

use std::fmt;

use mangal_types::{EntityKey, EntityKind, SchemaError};

/// Parameters owned by the paginator; callers cannot set them through a query.
pub const RESERVED_KEYS: [&str; 2] = ["count", "page"];

/// Key of the API's full-text search parameter.
pub const SEARCH_KEY: &str = "q";

/// A typed filter value, rendered canonically on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FilterValue {
    Text(String),
    Int(i64),
    Bool(bool),
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Text(s) => f.write_str(s),
            FilterValue::Int(i) => write!(f, "{i}"),
            FilterValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::Text(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        FilterValue::Text(v)
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Int(v)
    }
}

impl From<i32> for FilterValue {
    fn from(v: i32) -> Self {
        FilterValue::Int(v.into())
    }
}

impl From<u64> for FilterValue {
    fn from(v: u64) -> Self {
        i64::try_from(v)
            .map(FilterValue::Int)
            .unwrap_or_else(|_| FilterValue::Text(v.to_string()))
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        FilterValue::Bool(v)
    }
}

/// Ordered collection of filter pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Query {
    pairs: Vec<(String, FilterValue)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pair. Existing pairs with the same key are kept.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<FilterValue>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// Full-text search across the searchable fields of a kind.
    pub fn search(text: impl Into<String>) -> Self {
        Self::new().with(SEARCH_KEY, text.into())
    }

    /// Filter interactions by ecological type.
    pub fn interaction_type(self, interaction_type: impl Into<String>) -> Self {
        self.with("type", interaction_type.into())
    }

    /// Scope a query for `kind` to the records owned by `parent`.
    pub fn parent(self, kind: EntityKind, parent: EntityKey) -> Result<Self, SchemaError> {
        let field = kind
            .parent_field(parent.kind)
            .ok_or(SchemaError::UnrelatedParent {
                kind,
                parent: parent.kind,
            })?;
        Ok(self.with(field, parent.id))
    }

    /// Append every pair of `other`, keeping order.
    pub fn extend(mut self, other: &Query) -> Self {
        self.pairs.extend(other.pairs.iter().cloned());
        self
    }

    pub fn pairs(&self) -> &[(String, FilterValue)] {
        &self.pairs
    }

    /// Values for one key, in insertion order.
    pub fn values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a FilterValue> + 'a {
        self.pairs
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Canonical string pairs, in insertion order.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.pairs
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect()
    }

    /// Split off pairs whose keys collide with pagination parameters.
    pub fn without_reserved(&self) -> (Query, Vec<(String, FilterValue)>) {
        let (reserved, kept): (Vec<_>, Vec<_>) = self
            .pairs
            .iter()
            .cloned()
            .partition(|(k, _)| RESERVED_KEYS.contains(&k.as_str()));
        (Query { pairs: kept }, reserved)
    }
}

impl<K: Into<String>, V: Into<FilterValue>> FromIterator<(K, V)> for Query {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pairs.is_empty() {
            return f.write_str("<no filters>");
        }
        for (i, (k, v)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str("&")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}
