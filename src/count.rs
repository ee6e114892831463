//! Record counts without fetching bodies.
//!
//! Counts come from the API's count endpoint, so they are cheap enough to
//! size pagination and to summarise networks before deciding what to fetch.

use std::collections::BTreeMap;

use mangal_transport::{CancelToken, Paginator, Query, RecordSource};
use mangal_types::{EntityKey, EntityKind};
use serde::Serialize;
use tracing::debug;

use crate::Error;

/// Interaction types known to the Mangal database.
pub const INTERACTION_TYPES: [&str; 12] = [
    "competition",
    "amensalism",
    "neutralism",
    "commensalism",
    "mutualism",
    "parasitism",
    "predation",
    "herbivory",
    "symbiosis",
    "scavenger",
    "detritivore",
    "unspecified",
];

/// Size of one network, from count requests only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkSummary {
    pub network: u64,
    pub nodes: u64,
    pub links: u64,
    /// Links per interaction type; types with no links are omitted.
    pub links_by_type: BTreeMap<String, u64>,
}

/// Counts records of any kind, globally or within one parent.
pub struct CountAggregator<'a> {
    source: &'a dyn RecordSource,
    cancel: CancelToken,
}

impl<'a> CountAggregator<'a> {
    pub fn new(source: &'a dyn RecordSource) -> Self {
        Self {
            source,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Number of `kind` records matching `filters`.
    ///
    /// With a `parent`, only records owned by it are counted; the parent's
    /// kind must be one `kind` refers to.
    pub fn count(
        &self,
        kind: EntityKind,
        filters: &Query,
        parent: Option<EntityKey>,
    ) -> Result<u64, Error> {
        let query = match parent {
            Some(parent) => filters.clone().parent(kind, parent)?,
            None => filters.clone(),
        };
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let total = Paginator::new(self.source, kind, query).total()?;
        debug!(%kind, ?parent, total, "counted");
        Ok(total)
    }

    /// Node and link counts of one network, with links broken down by type.
    pub fn network_summary(&self, network: u64) -> Result<NetworkSummary, Error> {
        let scope = Some(EntityKey::new(EntityKind::Network, network));
        let nodes = self.count(EntityKind::Node, &Query::new(), scope)?;
        let links = self.count(EntityKind::Interaction, &Query::new(), scope)?;

        let mut links_by_type = BTreeMap::new();
        if links > 0 {
            for interaction_type in INTERACTION_TYPES {
                let query = Query::new().interaction_type(interaction_type);
                let n = self.count(EntityKind::Interaction, &query, scope)?;
                if n > 0 {
                    links_by_type.insert(interaction_type.to_string(), n);
                }
            }
        }

        Ok(NetworkSummary {
            network,
            nodes,
            links,
            links_by_type,
        })
    }
}
