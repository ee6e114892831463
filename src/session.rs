//! The consumer-facing entry point.
//!
//! A [`Session`] owns one record source, one entity cache and one worker
//! configuration. Everything fetched through it is cached until the session
//! is dropped, so fetching several networks of the same dataset requests
//! shared entities (datasets, references, taxa) only once. A cancelled
//! session's cache can be handed to a new one with [`Session::with_cache`].
//!
//! ```ignore
//! let session = Session::mangal();
//!
//! let summary = session.network_summary(19)?;
//! println!("{} nodes, {} links", summary.nodes, summary.links);
//!
//! let network = session.fetch_network(19)?;
//! let matrix = network.adjacency();
//!
//! for taxon in session.fetch_entities(EntityKind::ReferenceTaxon, Query::search("lupus")) {
//!     println!("{:?}", taxon?);
//! }
//! ```

use std::sync::Arc;

use mangal_resolver::{ReferenceResolver, SessionCache};
use mangal_transport::{CancelToken, Pages, Paginator, Query, RecordSource, RestClient};
use mangal_types::{Entity, EntityKey, EntityKind, Interaction, Network, SchemaError};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::count::{CountAggregator, NetworkSummary};
use crate::network::{materialize, MaterializedNetwork};
use crate::Error;

/// A network that could not be materialized during a bulk fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    /// Network identifier, when the listed record had a readable one.
    pub id: Option<u64>,
    pub reason: String,
}

/// Result of [`Session::fetch_networks`].
#[derive(Debug, Clone, Default)]
pub struct BulkNetworks {
    pub networks: Vec<MaterializedNetwork>,
    pub failures: Vec<Failure>,
}

/// Retrieval session over one [`RecordSource`].
pub struct Session {
    source: Arc<dyn RecordSource>,
    resolver: ReferenceResolver,
    config: SessionConfig,
    pool: Option<rayon::ThreadPool>,
    cancel: CancelToken,
}

impl Session {
    /// Session against the public API, configured from the environment.
    pub fn mangal() -> Self {
        Self::new(Arc::new(RestClient::mangal())).with_config(SessionConfig::from_env())
    }

    /// Sequential session with default page size.
    pub fn new(source: Arc<dyn RecordSource>) -> Self {
        Self::with_cache(source, Arc::new(SessionCache::new()))
    }

    /// Session that continues from `cache`, e.g. the cache of a session that
    /// was cancelled.
    pub fn with_cache(source: Arc<dyn RecordSource>, cache: Arc<SessionCache>) -> Self {
        let cancel = CancelToken::new();
        let resolver =
            ReferenceResolver::with_cache(Arc::clone(&source), cache).with_cancel(cancel.clone());
        Self {
            source,
            resolver,
            config: SessionConfig::default(),
            pool: None,
            cancel,
        }
    }

    /// Replace the cancel token, keeping the cache.
    pub fn with_cancel(self, cancel: CancelToken) -> Self {
        let resolver =
            ReferenceResolver::with_cache(Arc::clone(&self.source), Arc::clone(self.cache()))
                .with_cancel(cancel.clone());
        Self {
            resolver,
            cancel,
            ..self
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.pool = config.build_pool();
        self.config = config;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Token that stops this session's fetches; clone it to cancel from another thread.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn cache(&self) -> &Arc<SessionCache> {
        self.resolver.cache()
    }

    pub fn resolver(&self) -> &ReferenceResolver {
        &self.resolver
    }

    /// Paginator for `kind` using the session's page size and cancel token.
    pub fn paginator(&self, kind: EntityKind, query: Query) -> Paginator<'_, dyn RecordSource> {
        Paginator::new(self.source.as_ref(), kind, query)
            .with_page_size(self.config.page_size)
            .with_cancel(self.cancel.clone())
    }

    /// Lazy sequence of hydrated entities matching `query`.
    ///
    /// Records that violate the hierarchy are yielded as `Err` and iteration
    /// continues; a failed page is yielded as `Err` and ends iteration.
    /// Calling this again restarts from the first page.
    pub fn fetch_entities(&self, kind: EntityKind, query: Query) -> EntityStream<'_> {
        EntityStream {
            resolver: &self.resolver,
            pool: self.pool.as_ref(),
            kind,
            pages: self.paginator(kind, query).pages(),
            buffer: Vec::new().into_iter(),
        }
    }

    /// Hydrated entity by key.
    pub fn resolve(&self, kind: EntityKind, id: u64) -> Result<Entity, Error> {
        Ok(self.resolver.resolve(kind, id)?)
    }

    /// Number of `kind` records matching `filters`, optionally within `parent`.
    pub fn count(
        &self,
        kind: EntityKind,
        filters: &Query,
        parent: Option<EntityKey>,
    ) -> Result<u64, Error> {
        self.counter().count(kind, filters, parent)
    }

    pub fn network_summary(&self, network: u64) -> Result<NetworkSummary, Error> {
        self.counter().network_summary(network)
    }

    fn counter(&self) -> CountAggregator<'_> {
        CountAggregator::new(self.source.as_ref()).with_cancel(self.cancel.clone())
    }

    /// Fetch one network with its nodes and interactions and build its graph.
    pub fn fetch_network(&self, network: u64) -> Result<MaterializedNetwork, Error> {
        let network = self.resolver.resolve_as::<Network>(network)?;
        self.materialize_network(network)
    }

    /// Fetch and materialize every network matching `query`.
    ///
    /// Networks that are missing or malformed are reported in
    /// [`BulkNetworks::failures`]; retrieval failures and cancellation abort
    /// the whole call.
    pub fn fetch_networks(&self, query: Query) -> Result<BulkNetworks, Error> {
        let mut bulk = BulkNetworks::default();

        for record in self.paginator(EntityKind::Network, query).records() {
            let record = record?;
            let listed_id = record.get("id").and_then(Value::as_u64);

            let outcome = self
                .resolver
                .hydrate_value(EntityKind::Network, record)
                .map_err(Error::from)
                .and_then(|entity| {
                    let network = entity
                        .downcast::<Network>()
                        .ok_or(Error::NotFound(entity.key()))?;
                    self.materialize_network(network)
                });

            match outcome {
                Ok(network) => bulk.networks.push(network),
                Err(err @ (Error::Retrieval(_) | Error::Cancelled)) => return Err(err),
                Err(err) => {
                    warn!(network = ?listed_id, error = %err, "network not materialized");
                    bulk.failures.push(Failure {
                        id: listed_id,
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            networks = bulk.networks.len(),
            failures = bulk.failures.len(),
            "bulk network fetch finished"
        );
        Ok(bulk)
    }

    fn materialize_network(&self, network: Arc<Network>) -> Result<MaterializedNetwork, Error> {
        let scope = EntityKey::new(EntityKind::Network, network.id);

        // Listing the nodes up front fills the cache, so interaction
        // endpoints resolve without one request per node.
        let nodes = self.collect(EntityKind::Node, Query::new().parent(EntityKind::Node, scope)?)?;
        for result in self.resolver.hydrate_all(EntityKind::Node, nodes, self.pool.as_ref()) {
            if let Err(err) = result {
                warn!(network = network.id, error = %err, "skipping malformed node");
            }
        }

        let records = self.collect(
            EntityKind::Interaction,
            Query::new().parent(EntityKind::Interaction, scope)?,
        )?;
        let mut interactions: Vec<Arc<Interaction>> = Vec::with_capacity(records.len());
        let mut rejected: Vec<SchemaError> = Vec::new();
        for result in self
            .resolver
            .hydrate_all(EntityKind::Interaction, records, self.pool.as_ref())
        {
            match result {
                Ok(entity) => interactions.extend(entity.downcast::<Interaction>()),
                Err(err) => {
                    warn!(network = network.id, error = %err, "rejecting interaction record");
                    rejected.push(err);
                }
            }
        }
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        debug!(
            network = network.id,
            interactions = interactions.len(),
            rejected = rejected.len(),
            "hydrated interactions"
        );
        let mut materialized = materialize(network, interactions);
        materialized.rejected = rejected;
        Ok(materialized)
    }

    fn collect(&self, kind: EntityKind, query: Query) -> Result<Vec<Value>, Error> {
        let paginator = self.paginator(kind, query);
        let records = match &self.pool {
            Some(pool) => paginator.collect_parallel(pool)?,
            None => paginator.collect_all()?,
        };
        Ok(records)
    }
}

/// Iterator returned by [`Session::fetch_entities`].
pub struct EntityStream<'s> {
    resolver: &'s ReferenceResolver,
    pool: Option<&'s rayon::ThreadPool>,
    kind: EntityKind,
    pages: Pages<'s, dyn RecordSource>,
    buffer: std::vec::IntoIter<Result<Entity, SchemaError>>,
}

impl Iterator for EntityStream<'_> {
    type Item = Result<Entity, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(result) = self.buffer.next() {
                if let Err(err) = &result {
                    warn!(kind = %self.kind, error = %err, "rejecting record");
                }
                return Some(result.map_err(Error::from));
            }
            match self.pages.next()? {
                Ok(records) => {
                    self.buffer = self
                        .resolver
                        .hydrate_all(self.kind, records, self.pool)
                        .into_iter();
                }
                Err(err) => return Some(Err(err.into())),
            }
        }
    }
}
