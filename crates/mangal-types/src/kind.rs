//! Entity kinds and the fixed reference hierarchy.
//!
//! The hierarchy is a closed, static table: each kind declares which of its
//! record fields are foreign keys and which kind they point to.
//!
//! | Kind | Endpoint | Reference fields |
//! |------|----------|------------------|
//! | Dataset | `dataset` | `ref_id` → Reference |
//! | Reference | `reference` | |
//! | Network | `network` | `dataset_id` → Dataset |
//! | Interaction | `interaction` | `network_id` → Network, `node_from`/`node_to` → Node, `attr_id` → Attribute |
//! | Attribute | `attribute` | |
//! | Node | `node` | `taxonomy_id` → ReferenceTaxon |
//! | ReferenceTaxon | `taxonomy` | |
//!
//! The reference graph between kinds is acyclic, so recursive hydration always
//! terminates after at most [`EntityKind::depth`] hops.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the seven record types served by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Dataset,
    Reference,
    Network,
    Interaction,
    Attribute,
    Node,
    ReferenceTaxon,
}

pub const ALL_KINDS: [EntityKind; 7] = [
    EntityKind::Dataset,
    EntityKind::Reference,
    EntityKind::Network,
    EntityKind::Interaction,
    EntityKind::Attribute,
    EntityKind::Node,
    EntityKind::ReferenceTaxon,
];

/// A foreign-key field declared on an entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceField {
    /// Name of the field in the raw record.
    pub field: &'static str,
    /// Kind of the entity the field points to.
    pub target: EntityKind,
}

const fn reference(field: &'static str, target: EntityKind) -> ReferenceField {
    ReferenceField { field, target }
}

const DATASET_REFERENCES: &[ReferenceField] = &[reference("ref_id", EntityKind::Reference)];
const NETWORK_REFERENCES: &[ReferenceField] = &[reference("dataset_id", EntityKind::Dataset)];
const INTERACTION_REFERENCES: &[ReferenceField] = &[
    reference("network_id", EntityKind::Network),
    reference("node_from", EntityKind::Node),
    reference("node_to", EntityKind::Node),
    reference("attr_id", EntityKind::Attribute),
];
const NODE_REFERENCES: &[ReferenceField] =
    &[reference("taxonomy_id", EntityKind::ReferenceTaxon)];

// Ownership fields that scope a listing without being resolved as relations.
const NODE_SCOPES: &[ReferenceField] = &[reference("network_id", EntityKind::Network)];

impl EntityKind {
    /// Path segment of the listing and single-entity endpoints.
    pub fn endpoint(&self) -> &'static str {
        match self {
            EntityKind::Dataset => "dataset",
            EntityKind::Reference => "reference",
            EntityKind::Network => "network",
            EntityKind::Interaction => "interaction",
            EntityKind::Attribute => "attribute",
            EntityKind::Node => "node",
            EntityKind::ReferenceTaxon => "taxonomy",
        }
    }

    /// Inverse of [`endpoint`](Self::endpoint).
    pub fn from_endpoint(endpoint: &str) -> Option<Self> {
        ALL_KINDS.into_iter().find(|kind| kind.endpoint() == endpoint)
    }

    /// Foreign-key fields of this kind, in declaration order.
    pub fn references(&self) -> &'static [ReferenceField] {
        match self {
            EntityKind::Dataset => DATASET_REFERENCES,
            EntityKind::Network => NETWORK_REFERENCES,
            EntityKind::Interaction => INTERACTION_REFERENCES,
            EntityKind::Node => NODE_REFERENCES,
            EntityKind::Reference | EntityKind::Attribute | EntityKind::ReferenceTaxon => &[],
        }
    }

    /// Look up a declared foreign-key field by name.
    pub fn reference_field(&self, field: &str) -> Option<ReferenceField> {
        self.references().iter().copied().find(|r| r.field == field)
    }

    /// Whether `target` is a kind this kind references directly.
    pub fn references_kind(&self, target: EntityKind) -> bool {
        self.references().iter().any(|r| r.target == target)
    }

    /// Field used to scope a listing or count of this kind to one `parent`.
    ///
    /// Returns `None` when `parent` is not related to this kind, or when more
    /// than one field points at it (an interaction has two node fields).
    pub fn parent_field(&self, parent: EntityKind) -> Option<&'static str> {
        let scopes: &[ReferenceField] = match self {
            EntityKind::Node => NODE_SCOPES,
            _ => &[],
        };
        if let Some(scope) = scopes.iter().find(|s| s.target == parent) {
            return Some(scope.field);
        }

        let mut matching = self.references().iter().filter(|r| r.target == parent);
        match (matching.next(), matching.next()) {
            (Some(only), None) => Some(only.field),
            _ => None,
        }
    }

    /// Longest chain of references starting at this kind.
    pub fn depth(&self) -> usize {
        self.references()
            .iter()
            .map(|r| 1 + r.target.depth())
            .max()
            .unwrap_or(0)
    }

    /// Human-readable name used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Dataset => "dataset",
            EntityKind::Reference => "reference",
            EntityKind::Network => "network",
            EntityKind::Interaction => "interaction",
            EntityKind::Attribute => "attribute",
            EntityKind::Node => "node",
            EntityKind::ReferenceTaxon => "reference taxon",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identity of one remote entity. Identifiers are only unique within a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: u64,
}

impl EntityKey {
    pub fn new(kind: EntityKind, id: u64) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hierarchy_is_shallow() {
        for kind in ALL_KINDS {
            assert!(kind.depth() <= 3, "{kind} has depth {}", kind.depth());
        }
        assert_eq!(EntityKind::Interaction.depth(), 3);
        assert_eq!(EntityKind::Node.depth(), 1);
        assert_eq!(EntityKind::Reference.depth(), 0);
    }

    #[test]
    fn test_no_kind_references_itself() {
        fn reaches(from: EntityKind, to: EntityKind) -> bool {
            from.references()
                .iter()
                .any(|r| r.target == to || reaches(r.target, to))
        }
        for kind in ALL_KINDS {
            assert!(!reaches(kind, kind), "{kind} is self-referential");
        }
    }

    #[test]
    fn test_endpoints_round_trip() {
        for kind in ALL_KINDS {
            assert_eq!(EntityKind::from_endpoint(kind.endpoint()), Some(kind));
        }
        assert_eq!(
            EntityKind::from_endpoint("taxonomy"),
            Some(EntityKind::ReferenceTaxon)
        );
        assert_eq!(EntityKind::from_endpoint("taxon"), None);
    }

    #[test]
    fn test_parent_fields() {
        assert_eq!(
            EntityKind::Interaction.parent_field(EntityKind::Network),
            Some("network_id")
        );
        assert_eq!(
            EntityKind::Node.parent_field(EntityKind::Network),
            Some("network_id")
        );
        assert_eq!(
            EntityKind::Network.parent_field(EntityKind::Dataset),
            Some("dataset_id")
        );
        // Ambiguous: source and target both point at nodes.
        assert_eq!(EntityKind::Interaction.parent_field(EntityKind::Node), None);
        assert_eq!(EntityKind::Dataset.parent_field(EntityKind::Network), None);
    }

    #[test]
    fn test_key_display_keeps_kinds_apart() {
        let node = EntityKey::new(EntityKind::Node, 7);
        let taxon = EntityKey::new(EntityKind::ReferenceTaxon, 7);
        assert_ne!(node, taxon);
        assert_eq!(node.to_string(), "node 7");
        assert_eq!(taxon.to_string(), "reference taxon 7");
    }
}
