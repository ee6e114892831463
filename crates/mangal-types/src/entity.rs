//! Hydrated entities.
//!
//! Each entity kind has a typed struct whose metadata is decoded from the raw
//! record and whose relations are [`Link`]s filled in by the resolver. Once a
//! struct is wrapped in an [`Arc`] and handed out it is never mutated; the
//! session cache shares the same allocation with every record that refers to it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::HydrationError;
use crate::kind::{EntityKey, EntityKind};

/// A relation from one entity to another.
#[derive(Debug)]
pub enum Link<T> {
    /// The foreign-key field was absent or null.
    Absent,
    Resolved(Arc<T>),
    Failed(HydrationError),
}

impl<T> Default for Link<T> {
    fn default() -> Self {
        Link::Absent
    }
}

impl<T> Clone for Link<T> {
    fn clone(&self) -> Self {
        match self {
            Link::Absent => Link::Absent,
            Link::Resolved(v) => Link::Resolved(Arc::clone(v)),
            Link::Failed(e) => Link::Failed(e.clone()),
        }
    }
}

impl<T: EntityRecord> Link<T> {
    pub fn get(&self) -> Option<&Arc<T>> {
        match self {
            Link::Resolved(v) => Some(v),
            _ => None,
        }
    }

    /// Identifier of the related entity, known even when resolution failed.
    pub fn id(&self) -> Option<u64> {
        match self {
            Link::Absent => None,
            Link::Resolved(v) => Some(v.id()),
            Link::Failed(e) => Some(e.target_id),
        }
    }

    pub fn error(&self) -> Option<&HydrationError> {
        match self {
            Link::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Link::Resolved(_))
    }

    /// False when this relation, or one further down the chain, failed for
    /// a reason that may not recur (timeout, cancellation).
    pub fn is_settled(&self) -> bool {
        match self {
            Link::Absent => true,
            Link::Resolved(v) => T::entity(v).is_settled(),
            Link::Failed(e) => !e.reason.is_transient(),
        }
    }
}

/// Typed entity structs that can be decoded from a raw record.
pub trait EntityRecord: DeserializeOwned + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> u64;

    /// Borrow the typed value out of an [`Entity`] of the matching kind.
    fn from_entity(entity: &Entity) -> Option<Arc<Self>>;

    fn into_entity(self) -> Entity;

    /// Wrap a shared value back into an [`Entity`].
    fn entity(this: &Arc<Self>) -> Entity;
}

macro_rules! entity_record {
    ($($ty:ident),+ $(,)?) => {
        $(
            impl EntityRecord for $ty {
                const KIND: EntityKind = EntityKind::$ty;

                fn id(&self) -> u64 {
                    self.id
                }

                fn from_entity(entity: &Entity) -> Option<Arc<Self>> {
                    match entity {
                        Entity::$ty(v) => Some(Arc::clone(v)),
                        _ => None,
                    }
                }

                fn into_entity(self) -> Entity {
                    Entity::$ty(Arc::new(self))
                }

                fn entity(this: &Arc<Self>) -> Entity {
                    Entity::$ty(Arc::clone(this))
                }
            }
        )+
    };
}

/// Bibliographic citation for a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub id: u64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub doi: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub jstor: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub pmid: Option<String>,
    #[serde(default)]
    pub paper_url: Option<String>,
    #[serde(default)]
    pub data_url: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub year: Option<String>,
    #[serde(default)]
    pub bibtex: Option<String>,
}

/// A published collection of networks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: u64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub public: bool,
    #[serde(skip)]
    pub reference: Link<Reference>,
}

/// Metadata of one ecological network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub id: u64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub public: bool,
    /// Whether every interaction between the sampled taxa was recorded.
    #[serde(default, deserialize_with = "lenient_bool")]
    pub all_interactions: bool,
    /// GeoJSON geometry of the sampling location.
    #[serde(default, rename = "geom")]
    pub geometry: Option<Value>,
    #[serde(skip)]
    pub dataset: Link<Dataset>,
}

impl Network {
    /// `(longitude, latitude)` when the geometry is a GeoJSON point.
    pub fn point(&self) -> Option<(f64, f64)> {
        let geometry = self.geometry.as_ref()?;
        if geometry.get("type").and_then(Value::as_str) != Some("Point") {
            return None;
        }
        let coordinates = geometry.get("coordinates")?.as_array()?;
        match coordinates.as_slice() {
            [lon, lat, ..] => Some((lon.as_f64()?, lat.as_f64()?)),
            _ => None,
        }
    }
}

/// Semantic type of an interaction value (e.g. "biomass flow", "frequency").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub id: u64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
}

/// Canonical taxonomic name with external database identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceTaxon {
    pub id: u64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default)]
    pub rank: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub ncbi: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub tsn: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub eol: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub bold: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub gbif: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub col: Option<u64>,
}

/// One taxon's observation record within a network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: u64,
    /// Name as reported by the original study.
    #[serde(default, rename = "original_name", deserialize_with = "lenient_string")]
    pub name: Option<String>,
    /// Organisation level: `population`, `taxon` or `individual`.
    #[serde(default, rename = "node_level")]
    pub level: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub network_id: Option<u64>,
    #[serde(skip)]
    pub taxon: Link<ReferenceTaxon>,
}

/// Whether an interaction is oriented from source to target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Directed,
    Undirected,
    #[default]
    #[serde(other)]
    Unknown,
}

/// How the value of an interaction encodes its strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strength {
    /// Presence only; the edge weight is 1.
    Boolean,
    /// Link probability in [0, 1].
    Probabilistic,
    /// Raw non-negative magnitude.
    Quantitative,
}

impl Strength {
    pub fn name(&self) -> &'static str {
        match self {
            Strength::Boolean => "boolean",
            Strength::Probabilistic => "probabilistic",
            Strength::Quantitative => "quantitative",
        }
    }
}

/// A pairwise link recorded in one network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: u64,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_direction")]
    pub direction: Direction,
    /// Ecological type, e.g. `predation` or `mutualism`.
    #[serde(
        rename = "type",
        default = "unspecified",
        deserialize_with = "type_or_unspecified"
    )]
    pub interaction_type: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub value: Option<f64>,
    /// Explicit strength encoding; see [`Interaction::strength_kind`].
    #[serde(default)]
    pub strength: Option<Strength>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub public: bool,
    #[serde(skip)]
    pub network: Link<Network>,
    #[serde(skip)]
    pub source: Link<Node>,
    #[serde(skip)]
    pub target: Link<Node>,
    #[serde(skip)]
    pub attribute: Link<Attribute>,
}

impl Interaction {
    /// Strength encoding of this interaction.
    ///
    /// The explicit `strength` field wins. Without it, a record with no value
    /// is a boolean (presence) record and a record with a value is quantitative.
    pub fn strength_kind(&self) -> Strength {
        match (self.strength, self.value) {
            (Some(strength), _) => strength,
            (None, None) => Strength::Boolean,
            (None, Some(_)) => Strength::Quantitative,
        }
    }

    pub fn is_directed(&self) -> bool {
        self.direction == Direction::Directed
    }
}

entity_record!(
    Dataset,
    Reference,
    Network,
    Interaction,
    Attribute,
    Node,
    ReferenceTaxon
);

/// Any hydrated entity.
#[derive(Debug, Clone)]
pub enum Entity {
    Dataset(Arc<Dataset>),
    Reference(Arc<Reference>),
    Network(Arc<Network>),
    Interaction(Arc<Interaction>),
    Attribute(Arc<Attribute>),
    Node(Arc<Node>),
    ReferenceTaxon(Arc<ReferenceTaxon>),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Dataset(_) => EntityKind::Dataset,
            Entity::Reference(_) => EntityKind::Reference,
            Entity::Network(_) => EntityKind::Network,
            Entity::Interaction(_) => EntityKind::Interaction,
            Entity::Attribute(_) => EntityKind::Attribute,
            Entity::Node(_) => EntityKind::Node,
            Entity::ReferenceTaxon(_) => EntityKind::ReferenceTaxon,
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            Entity::Dataset(v) => v.id,
            Entity::Reference(v) => v.id,
            Entity::Network(v) => v.id,
            Entity::Interaction(v) => v.id,
            Entity::Attribute(v) => v.id,
            Entity::Node(v) => v.id,
            Entity::ReferenceTaxon(v) => v.id,
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.kind(), self.id())
    }

    /// Typed view of this entity, if it is of kind `T`.
    pub fn downcast<T: EntityRecord>(&self) -> Option<Arc<T>> {
        T::from_entity(self)
    }

    /// Relations of this entity that failed to resolve.
    pub fn hydration_errors(&self) -> Vec<&HydrationError> {
        match self {
            Entity::Dataset(v) => v.reference.error().into_iter().collect(),
            Entity::Network(v) => v.dataset.error().into_iter().collect(),
            Entity::Node(v) => v.taxon.error().into_iter().collect(),
            Entity::Interaction(v) => [
                v.network.error(),
                v.source.error(),
                v.target.error(),
                v.attribute.error(),
            ]
            .into_iter()
            .flatten()
            .collect(),
            Entity::Reference(_) | Entity::Attribute(_) | Entity::ReferenceTaxon(_) => Vec::new(),
        }
    }

    /// Whether every set relation was resolved.
    pub fn is_complete(&self) -> bool {
        self.hydration_errors().is_empty()
    }

    /// Whether the hydrated state is final.
    ///
    /// An entity that is not settled has a relation, possibly a few hops
    /// down, that failed transiently; resolving it again may complete it.
    /// Missing and malformed relations are final.
    pub fn is_settled(&self) -> bool {
        match self {
            Entity::Dataset(v) => v.reference.is_settled(),
            Entity::Network(v) => v.dataset.is_settled(),
            Entity::Node(v) => v.taxon.is_settled(),
            Entity::Interaction(v) => {
                v.network.is_settled()
                    && v.source.is_settled()
                    && v.target.is_settled()
                    && v.attribute.is_settled()
            }
            Entity::Reference(_) | Entity::Attribute(_) | Entity::ReferenceTaxon(_) => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Lenient field decoding
// ---------------------------------------------------------------------------

fn unspecified() -> String {
    "unspecified".to_string()
}

fn type_or_unspecified<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(unspecified))
}

fn lenient_direction<'de, D: Deserializer<'de>>(d: D) -> Result<Direction, D::Error> {
    Ok(Option::<Direction>::deserialize(d)?.unwrap_or_default())
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    use serde::de::Error;
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("expected an unsigned integer, got {n}"))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("expected an unsigned integer, got {s:?}"))),
        Some(other) => Err(D::Error::custom(format!(
            "expected an unsigned integer, got {other}"
        ))),
    }
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    use serde::de::Error;
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("expected a number, got {s:?}"))),
        Some(other) => Err(D::Error::custom(format!("expected a number, got {other}"))),
    }
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => matches!(s.to_lowercase().as_str(), "true" | "t" | "1" | "yes"),
        _ => false,
    })
}
