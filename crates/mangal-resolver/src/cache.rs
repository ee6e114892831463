//! Session cache for hydrated entities.
//!
//! Entries are keyed by [`EntityKey`] so identifiers of different kinds never
//! collide. The cache is keep-first: once a key holds an entity, later inserts
//! for the same key return the stored value instead of replacing it, so every
//! holder of an entity sees the same allocation for the whole session.
//!
//! # Example
//!
//! ```ignore
//! use mangal_resolver::SessionCache;
//!
//! let cache = SessionCache::new();
//! let node = cache.get_or_fetch(EntityKey::new(EntityKind::Node, 7), || fetch_node(7))?;
//!
//! // Served from memory from now on
//! assert!(cache.contains(&node.key()));
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mangal_types::{Entity, EntityKey, EntityKind};
use parking_lot::{Mutex, RwLock};

/// Hit and miss counters of a [`SessionCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: usize,
    pub misses: usize,
}

/// In-memory entity cache shared by everything in one session.
///
/// Thread-safe via internal locks.
#[derive(Debug, Default)]
pub struct SessionCache {
    entries: RwLock<HashMap<EntityKey, Entity>>,
    /// Fill locks for keys currently being fetched.
    fills: Mutex<HashMap<EntityKey, Arc<Mutex<()>>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &EntityKey) -> Option<Entity> {
        let found = self.entries.read().get(key).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Store an entity unless its key is already cached.
    ///
    /// Returns the entity that is cached after the call, which is the earlier
    /// value when one existed. An entity that is not
    /// [settled](Entity::is_settled) is returned without being stored, so the
    /// next lookup hydrates it again.
    pub fn insert(&self, entity: Entity) -> Entity {
        let key = entity.key();
        let settled = entity.is_settled();
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(&key) {
            return existing.clone();
        }
        if settled {
            entries.insert(key, entity.clone());
        }
        entity
    }

    /// Cached entity for `key`, calling `fetch` on a miss.
    ///
    /// Concurrent callers for the same key are serialized: one runs `fetch`,
    /// the others block until it finishes and then read its result from the
    /// cache. Errors and unsettled entities are returned to the caller that
    /// fetched and are not cached; a waiting caller retries the fetch itself.
    ///
    /// `fetch` may itself fill other keys. It must not wait on `key` again.
    pub fn get_or_fetch<E>(
        &self,
        key: EntityKey,
        fetch: impl FnOnce() -> Result<Entity, E>,
    ) -> Result<Entity, E> {
        if let Some(entity) = self.get(&key) {
            return Ok(entity);
        }

        let fill = Arc::clone(self.fills.lock().entry(key).or_default());
        let _guard = fill.lock();

        if let Some(entity) = self.entries.read().get(&key).cloned() {
            return Ok(entity);
        }

        let entity = self.insert(fetch()?);
        // Later callers hit the entry; anyone still holding `fill` rechecks it.
        self.fills.lock().remove(&key);
        Ok(entity)
    }

    /// Cached entities of one kind, in no particular order.
    pub fn entities_of(&self, kind: EntityKind) -> Vec<Entity> {
        self.entries
            .read()
            .iter()
            .filter(|(key, _)| key.kind == kind)
            .map(|(_, entity)| entity.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every entry and reset the counters.
    pub fn clear(&self) {
        self.entries.write().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mangal_types::{Attribute, Dataset, EntityRecord, HydrationError, HydrationFailure, Link};
    use std::time::Duration;

    fn attribute(id: u64, name: &str) -> Entity {
        Attribute {
            id,
            name: Some(name.to_string()),
            description: None,
            unit: None,
        }
        .into_entity()
    }

    fn attribute_name(entity: &Entity) -> Option<String> {
        entity.downcast::<Attribute>().and_then(|a| a.name.clone())
    }

    #[test]
    fn test_keep_first() {
        let cache = SessionCache::new();
        let first = cache.insert(attribute(1, "biomass"));
        let second = cache.insert(attribute(1, "frequency"));

        assert_eq!(attribute_name(&first).as_deref(), Some("biomass"));
        assert_eq!(attribute_name(&second).as_deref(), Some("biomass"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_kinds_do_not_collide() {
        let cache = SessionCache::new();
        cache.insert(attribute(1, "biomass"));
        assert!(cache.contains(&EntityKey::new(EntityKind::Attribute, 1)));
        assert!(!cache.contains(&EntityKey::new(EntityKind::Node, 1)));
        assert!(cache.get(&EntityKey::new(EntityKind::Node, 1)).is_none());
        assert_eq!(cache.entities_of(EntityKind::Attribute).len(), 1);
    }

    #[test]
    fn test_failed_fetch_is_not_cached() {
        let cache = SessionCache::new();
        let key = EntityKey::new(EntityKind::Attribute, 3);

        let err = cache
            .get_or_fetch(key, || Err::<Entity, _>("timed out"))
            .unwrap_err();
        assert_eq!(err, "timed out");
        assert!(!cache.contains(&key));

        let entity = cache
            .get_or_fetch(key, || Ok::<_, &str>(attribute(3, "unit")))
            .unwrap();
        assert_eq!(entity.key(), key);
    }

    fn dataset(id: u64, reference: HydrationFailure) -> Entity {
        Dataset {
            id,
            name: None,
            description: None,
            date: None,
            public: true,
            reference: Link::Failed(HydrationError {
                owner: EntityKind::Dataset,
                owner_id: id,
                field: "ref_id",
                target: EntityKind::Reference,
                target_id: 1,
                reason: reference,
            }),
        }
        .into_entity()
    }

    #[test]
    fn test_transient_relation_failure_is_not_cached() {
        let cache = SessionCache::new();
        let key = EntityKey::new(EntityKind::Dataset, 2);

        let returned = cache.insert(dataset(2, HydrationFailure::Cancelled));
        assert!(!returned.is_settled());
        assert!(!cache.contains(&key));

        let fetches = AtomicUsize::new(0);
        for _ in 0..2 {
            cache
                .get_or_fetch(key, || {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(dataset(2, HydrationFailure::Retrieval("request timed out".into())))
                })
                .unwrap();
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 2);

        // A missing reference is final and cached like any other entity.
        cache.insert(dataset(2, HydrationFailure::NotFound));
        assert!(cache.contains(&key));
        cache
            .get_or_fetch(key, || Err::<Entity, _>("not called"))
            .unwrap();
    }

    #[test]
    fn test_concurrent_fill_fetches_once() {
        let cache = SessionCache::new();
        let key = EntityKey::new(EntityKind::Attribute, 9);
        let fetches = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let entity = cache
                        .get_or_fetch(key, || {
                            fetches.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(Duration::from_millis(20));
                            Ok::<_, ()>(attribute(9, "biomass"))
                        })
                        .unwrap();
                    assert_eq!(entity.key(), key);
                });
            }
        });

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_stats_and_clear() {
        let cache = SessionCache::new();
        let key = EntityKey::new(EntityKind::Attribute, 1);
        assert!(cache.get(&key).is_none());
        cache.insert(attribute(1, "biomass"));
        assert!(cache.get(&key).is_some());

        assert_eq!(
            cache.stats(),
            CacheStats {
                entries: 1,
                hits: 1,
                misses: 1
            }
        );

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
