//! Reference resolution.
//!
//! [`ReferenceResolver::resolve`] returns the hydrated entity for a key,
//! fetching it on a cache miss. Hydration decodes a record's metadata and then
//! resolves every declared foreign key of its kind, recursively, into a
//! [`Link`]. A relation that cannot be resolved becomes a [`Link::Failed`]
//! carrying a [`HydrationError`]; the owning record and its other relations
//! are still returned. A record whose relations failed transiently is not
//! cached, so resolving it again retries those relations.
//!
//! ```ignore
//! let resolver = ReferenceResolver::new(Arc::new(RestClient::mangal()));
//! let interaction = resolver.resolve(EntityKind::Interaction, 1234)?;
//! for err in interaction.hydration_errors() {
//!     warn!("{err}");
//! }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mangal_transport::{CancelToken, RecordSource, RetrievalError};
use mangal_types::{
    Attribute, Dataset, Entity, EntityKey, EntityKind, EntityRecord, HydrationError,
    HydrationFailure, Interaction, Link, Network, Node, RawRecord, Reference, ReferenceTaxon,
    SchemaError,
};
use rayon::prelude::*;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::SessionCache;

/// Why an entity could not be resolved.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    #[error("{0} not found")]
    NotFound(EntityKey),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("resolution cancelled")]
    Cancelled,
}

impl From<ResolveError> for HydrationFailure {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound(_) => HydrationFailure::NotFound,
            ResolveError::Retrieval(RetrievalError::Cancelled) | ResolveError::Cancelled => {
                HydrationFailure::Cancelled
            }
            ResolveError::Retrieval(e) => HydrationFailure::Retrieval(e.to_string()),
            ResolveError::Schema(e) => HydrationFailure::Schema(e),
        }
    }
}

/// Hydrates records against one session cache.
pub struct ReferenceResolver {
    source: Arc<dyn RecordSource>,
    cache: Arc<SessionCache>,
    cancel: CancelToken,
    fetches: AtomicUsize,
}

impl ReferenceResolver {
    /// Resolver with a fresh cache.
    pub fn new(source: Arc<dyn RecordSource>) -> Self {
        Self::with_cache(source, Arc::new(SessionCache::new()))
    }

    pub fn with_cache(source: Arc<dyn RecordSource>, cache: Arc<SessionCache>) -> Self {
        Self {
            source,
            cache,
            cancel: CancelToken::new(),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Refuse new fetches once `cancel` is triggered.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cache(&self) -> &Arc<SessionCache> {
        &self.cache
    }

    pub fn source(&self) -> &Arc<dyn RecordSource> {
        &self.source
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Single-entity requests sent so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Hydrated entity for `(kind, id)`, from the cache or the API.
    pub fn resolve(&self, kind: EntityKind, id: u64) -> Result<Entity, ResolveError> {
        self.cache
            .get_or_fetch(EntityKey::new(kind, id), || self.fetch(kind, id))
    }

    /// Typed variant of [`resolve`](Self::resolve).
    pub fn resolve_as<T: EntityRecord>(&self, id: u64) -> Result<Arc<T>, ResolveError> {
        let entity = self.resolve(T::KIND, id)?;
        T::from_entity(&entity).ok_or(ResolveError::Schema(SchemaError::IdentifierMismatch {
            kind: T::KIND,
            requested: id,
            returned: entity.id(),
        }))
    }

    fn fetch(&self, kind: EntityKind, id: u64) -> Result<Entity, ResolveError> {
        if self.cancel.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }

        self.fetches.fetch_add(1, Ordering::Relaxed);
        debug!(%kind, id, "fetching entity");
        let value = self
            .source
            .get(kind, id)
            .map_err(|source| RetrievalError::Entity { kind, id, source })?
            .ok_or(ResolveError::NotFound(EntityKey::new(kind, id)))?;

        let raw = RawRecord::parse(kind, value)?;
        if raw.id() != id {
            return Err(SchemaError::IdentifierMismatch {
                kind,
                requested: id,
                returned: raw.id(),
            }
            .into());
        }
        Ok(self.hydrate(&raw)?)
    }

    /// Decode `raw` and resolve all of its relations.
    ///
    /// Only malformed metadata fails the whole record; relation failures are
    /// attached to the returned entity. The result is not cached.
    pub fn hydrate(&self, raw: &RawRecord) -> Result<Entity, SchemaError> {
        let entity = match raw.kind() {
            EntityKind::Reference => raw.decode::<Reference>()?.into_entity(),
            EntityKind::Attribute => raw.decode::<Attribute>()?.into_entity(),
            EntityKind::ReferenceTaxon => raw.decode::<ReferenceTaxon>()?.into_entity(),
            EntityKind::Dataset => {
                let mut dataset: Dataset = raw.decode()?;
                dataset.reference = self.link(raw, "ref_id");
                dataset.into_entity()
            }
            EntityKind::Network => {
                let mut network: Network = raw.decode()?;
                network.dataset = self.link(raw, "dataset_id");
                network.into_entity()
            }
            EntityKind::Node => {
                let mut node: Node = raw.decode()?;
                node.taxon = self.link(raw, "taxonomy_id");
                node.into_entity()
            }
            EntityKind::Interaction => {
                let mut interaction: Interaction = raw.decode()?;
                interaction.network = self.link(raw, "network_id");
                interaction.source = self.link(raw, "node_from");
                interaction.target = self.link(raw, "node_to");
                interaction.attribute = self.link(raw, "attr_id");
                interaction.into_entity()
            }
        };
        Ok(entity)
    }

    /// Hydrate a record served by a listing endpoint and cache it.
    ///
    /// When the key is already cached the cached entity is returned and the
    /// record is not hydrated again. Only settled entities are ever cached.
    pub fn hydrate_value(&self, kind: EntityKind, value: Value) -> Result<Entity, SchemaError> {
        let raw = RawRecord::parse(kind, value)?;
        if let Some(cached) = self.cache.get(&raw.key()) {
            return Ok(cached);
        }
        let entity = self.hydrate(&raw)?;
        Ok(self.prime(entity))
    }

    /// Hydrate listed records in order, on `pool` when given.
    ///
    /// Each element fails or succeeds on its own.
    pub fn hydrate_all(
        &self,
        kind: EntityKind,
        values: Vec<Value>,
        pool: Option<&rayon::ThreadPool>,
    ) -> Vec<Result<Entity, SchemaError>> {
        match pool {
            Some(pool) => pool.install(|| {
                values
                    .into_par_iter()
                    .map(|value| self.hydrate_value(kind, value))
                    .collect()
            }),
            None => values
                .into_iter()
                .map(|value| self.hydrate_value(kind, value))
                .collect(),
        }
    }

    /// Store an entity obtained elsewhere, keeping any earlier value.
    pub fn prime(&self, entity: Entity) -> Entity {
        self.cache.insert(entity)
    }

    fn link<T: EntityRecord>(&self, raw: &RawRecord, field: &'static str) -> Link<T> {
        debug_assert!(
            raw.kind()
                .reference_field(field)
                .is_some_and(|r| r.target == T::KIND),
            "{} has no reference field `{field}` to {}",
            raw.kind(),
            T::KIND
        );

        let Some(target_id) = raw.reference(field) else {
            return Link::Absent;
        };
        let failed = |reason: HydrationFailure| {
            let err = HydrationError {
                owner: raw.kind(),
                owner_id: raw.id(),
                field,
                target: T::KIND,
                target_id,
                reason,
            };
            warn!(error = %err, "relation not resolved");
            Link::Failed(err)
        };

        match self.resolve(T::KIND, target_id) {
            Ok(entity) => match T::from_entity(&entity) {
                Some(value) => Link::Resolved(value),
                None => failed(HydrationFailure::Schema(SchemaError::RelationMismatch {
                    kind: raw.kind(),
                    id: raw.id(),
                    field,
                    expected: T::KIND,
                    found: entity.kind(),
                })),
            },
            Err(err) => failed(err.into()),
        }
    }
}
