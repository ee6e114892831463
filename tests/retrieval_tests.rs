//! Retrieval Integration Tests
//!
//! Pagination, hydration and caching through a `Session`, against an
//! in-memory database that records every request.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::{
    assert_ok, catalogue, interaction, node_id, session, set, with_network, ATTRIBUTE_ID,
    DATASET_ID,
};
use mangal::{
    CancelToken, EntityKey, EntityKind, Error, MockSource, Query, RecordSource, RetrievalError,
    SchemaError, Session, SessionCache, TransportError,
};
use mangal_transport::PageRequest;
use mangal_types::Network;
use serde_json::{json, Value};

fn many_networks(n: u64) -> mangal::MockSource {
    catalogue().with_records(
        EntityKind::Network,
        (1..=n).map(|id| {
            json!({
                "id": id,
                "name": format!("network {id}"),
                "dataset_id": DATASET_ID,
                "public": id % 2 == 0
            })
        }),
    )
}

fn ids(entities: &[mangal::Entity]) -> Vec<u64> {
    entities.iter().map(|e| e.id()).collect()
}

#[test]
fn test_250_networks_fetch_exactly_three_pages() -> anyhow::Result<()> {
    let (source, session) = session(many_networks(250), 100, 1);

    let networks: Vec<_> = session
        .fetch_entities(EntityKind::Network, Query::new())
        .collect::<Result<_, _>>()?;

    assert_eq!(networks.len(), 250);
    let distinct: HashSet<u64> = ids(&networks).into_iter().collect();
    assert_eq!(distinct.len(), 250);
    assert_eq!(ids(&networks), (1..=250).collect::<Vec<_>>());
    assert_eq!(source.listed_pages(EntityKind::Network), vec![0, 1, 2]);
    assert_eq!(session.count(EntityKind::Network, &Query::new(), None)?, 250);
    Ok(())
}

#[test]
fn test_pages_concatenate_to_count() -> anyhow::Result<()> {
    let (_source, session) = session(many_networks(57), 10, 1);
    let public = Query::new().with("public", true);

    let expected = session.count(EntityKind::Network, &public, None)?;
    let networks: Vec<_> = session
        .fetch_entities(EntityKind::Network, public)
        .collect::<Result<_, _>>()?;

    assert_eq!(networks.len() as u64, expected);
    assert_eq!(expected, 28);
    assert!(networks
        .iter()
        .all(|e| e.downcast::<Network>().is_some_and(|n| n.public)));
    Ok(())
}

#[test]
fn test_parallel_pages_keep_order() -> anyhow::Result<()> {
    let (source, session) = session(many_networks(250), 7, 4);

    let networks: Vec<_> = session
        .fetch_entities(EntityKind::Network, Query::new())
        .collect::<Result<_, _>>()?;
    assert_eq!(ids(&networks), (1..=250).collect::<Vec<_>>());
    assert_eq!(source.get_calls(EntityKind::Dataset, DATASET_ID), 1);
    Ok(())
}

#[test]
fn test_restart_does_not_refetch_entities() -> anyhow::Result<()> {
    let (source, session) = session(many_networks(30), 10, 1);

    let first: Vec<_> = session
        .fetch_entities(EntityKind::Network, Query::new())
        .collect::<Result<_, _>>()?;
    let second: Vec<_> = session
        .fetch_entities(EntityKind::Network, Query::new())
        .collect::<Result<_, _>>()?;

    assert_eq!(ids(&first), ids(&second));
    assert_eq!(source.listed_pages(EntityKind::Network), vec![0, 1, 2, 0, 1, 2]);
    // Dataset and reference, once each for the whole session.
    assert_eq!(source.total_get_calls(), 2);
    Ok(())
}

#[test]
fn test_shared_references_fetched_once_under_concurrency() -> anyhow::Result<()> {
    let mut source = catalogue();
    for network in [1, 2, 3] {
        source = with_network(source, network, 6).with_records(
            EntityKind::Interaction,
            (1..6).map(|i| {
                interaction(
                    network * 100 + i,
                    network,
                    node_id(network, i),
                    node_id(network, i + 1),
                )
            }),
        );
    }
    let (source, session) = session(source, 2, 4);

    let bulk = session.fetch_networks(Query::new())?;
    assert_eq!(bulk.networks.len(), 3);
    assert!(bulk.failures.is_empty());

    for taxon in 1..=6 {
        assert_eq!(source.get_calls(EntityKind::ReferenceTaxon, taxon), 1, "taxon {taxon}");
    }
    assert_eq!(source.get_calls(EntityKind::Dataset, DATASET_ID), 1);
    assert_eq!(source.get_calls(EntityKind::Attribute, 1), 1);
    for network in [1, 2, 3] {
        assert_eq!(source.get_calls(EntityKind::Node, node_id(network, 1)), 0);
    }
    Ok(())
}

#[test]
fn test_scoped_predation_count() {
    let source = with_network(with_network(catalogue(), 42, 4), 7, 4).with_records(
        EntityKind::Interaction,
        [
            interaction(1, 42, node_id(42, 1), node_id(42, 2)),
            interaction(2, 42, node_id(42, 2), node_id(42, 3)),
            set(interaction(3, 42, node_id(42, 3), node_id(42, 4)), "type", json!("mutualism")),
            interaction(4, 7, node_id(7, 1), node_id(7, 2)),
        ],
    );
    let (source, session) = session(source, 100, 1);
    let predation = Query::new().interaction_type("predation");
    let network = EntityKey::new(EntityKind::Network, 42);

    let scoped = assert_ok(
        session.count(EntityKind::Interaction, &predation, Some(network)),
        "scoped count",
    );
    assert_eq!(scoped, 2);
    assert_eq!(
        session.count(EntityKind::Interaction, &predation, None).unwrap(),
        3
    );
    assert_eq!(source.total_get_calls(), 0, "counts never fetch bodies");
}

#[test]
fn test_failed_page_is_reported_with_its_index() {
    let source = many_networks(30).failing_page(
        EntityKind::Network,
        1,
        TransportError::Status {
            status: 503,
            message: "unavailable".into(),
        },
    );
    let (_source, session) = session(source, 10, 1);

    let results: Vec<_> = session
        .fetch_entities(EntityKind::Network, Query::new())
        .collect();
    assert_eq!(results.len(), 11);
    assert!(results[..10].iter().all(Result::is_ok));

    match &results[10] {
        Err(Error::Retrieval(err @ RetrievalError::Page { kind, page, .. })) => {
            assert_eq!(*kind, EntityKind::Network);
            assert_eq!(*page, 1);
            assert!(err.is_retryable());
        }
        other => panic!("expected a page error, got {other:?}"),
    }
}

#[test]
fn test_malformed_record_does_not_stop_iteration() {
    let source = many_networks(5).with_record(EntityKind::Network, json!({"name": "no id"}));
    let (_source, session) = session(source, 2, 1);

    let results: Vec<_> = session
        .fetch_entities(EntityKind::Network, Query::new())
        .collect();
    assert_eq!(results.len(), 6);
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 5);
    assert!(matches!(
        results[5],
        Err(Error::Schema(SchemaError::MissingId {
            kind: EntityKind::Network
        }))
    ));
}

#[test]
fn test_cancel_between_pages_keeps_cache() {
    let (source, session) = session(many_networks(30), 10, 1);
    let cancel = session.cancel_token().clone();

    let mut stream = session.fetch_entities(EntityKind::Network, Query::new());
    assert!(stream.next().unwrap().is_ok());
    cancel.cancel();

    let rest: Vec<_> = stream.collect();
    assert_eq!(rest.len(), 10);
    assert!(rest[..9].iter().all(Result::is_ok), "the fetched page is still delivered");
    assert!(matches!(rest[9], Err(Error::Cancelled)));
    assert_eq!(source.listed_pages(EntityKind::Network), vec![0]);

    assert!(session
        .resolve(EntityKind::Network, 3)
        .is_ok_and(|n| n.id() == 3));
    assert_eq!(session.resolve(EntityKind::Network, 25).unwrap_err(), Error::Cancelled);
}

#[test]
fn test_resolve_unknown_entity() {
    let (_source, session) = session(catalogue(), 100, 1);
    let err = session.resolve(EntityKind::Node, 404).unwrap_err();
    assert_eq!(err, Error::NotFound(EntityKey::new(EntityKind::Node, 404)));
    common::assert_error_contains(err, "not found", "resolving a missing node");
}

#[test]
fn test_timed_out_relation_recovers_in_same_session() -> anyhow::Result<()> {
    let source = with_network(catalogue(), 42, 3)
        .with_records(
            EntityKind::Interaction,
            [
                interaction(1, 42, node_id(42, 1), node_id(42, 2)),
                interaction(2, 42, node_id(42, 2), node_id(42, 3)),
            ],
        )
        .failing_get_times(EntityKind::Node, node_id(42, 2), TransportError::Timeout, 1);
    let (source, session) = session(source, 100, 1);

    let listed: Vec<_> = session
        .fetch_entities(EntityKind::Interaction, Query::new())
        .collect::<Result<_, _>>()?;
    assert!(!listed[0].is_complete(), "first request for the target timed out");
    assert!(listed[1].is_complete());
    assert!(!session
        .cache()
        .contains(&EntityKey::new(EntityKind::Interaction, 1)));

    let network = session.fetch_network(42)?;
    assert_eq!(network.edges.len(), 2);
    assert!(network.skipped.is_empty());
    assert!(network.is_complete());
    assert_eq!(source.get_calls(EntityKind::Node, node_id(42, 2)), 2);
    Ok(())
}

/// Cancels its token as soon as interactions are listed.
struct CancelOnInteractions {
    inner: Arc<MockSource>,
    cancel: CancelToken,
}

impl RecordSource for CancelOnInteractions {
    fn list(
        &self,
        kind: EntityKind,
        query: &Query,
        page: PageRequest,
    ) -> Result<Vec<Value>, TransportError> {
        let records = self.inner.list(kind, query, page)?;
        if kind == EntityKind::Interaction {
            self.cancel.cancel();
        }
        Ok(records)
    }

    fn count(&self, kind: EntityKind, query: &Query) -> Result<u64, TransportError> {
        self.inner.count(kind, query)
    }

    fn get(&self, kind: EntityKind, id: u64) -> Result<Option<Value>, TransportError> {
        self.inner.get(kind, id)
    }
}

#[test]
fn test_cancelled_session_cache_is_reused() -> anyhow::Result<()> {
    let source = Arc::new(with_network(catalogue(), 42, 3).with_records(
        EntityKind::Interaction,
        [
            interaction(1, 42, node_id(42, 1), node_id(42, 2)),
            interaction(2, 42, node_id(42, 2), node_id(42, 3)),
        ],
    ));
    let cache = Arc::new(SessionCache::new());
    let cancel = CancelToken::new();
    let interrupting = Arc::new(CancelOnInteractions {
        inner: source.clone(),
        cancel: cancel.clone(),
    });

    let cancelled = Session::with_cache(interrupting, cache.clone()).with_cancel(cancel);
    assert_eq!(cancelled.fetch_network(42).unwrap_err(), Error::Cancelled);
    assert!(cache.contains(&EntityKey::new(EntityKind::Network, 42)));
    assert!(cache.contains(&EntityKey::new(EntityKind::Node, node_id(42, 1))));
    assert!(
        !cache.contains(&EntityKey::new(EntityKind::Interaction, 1)),
        "interactions with a cancelled relation are not kept"
    );
    // network, dataset, reference and three taxa
    let fetched_before = source.total_get_calls();
    assert_eq!(fetched_before, 6);

    let resumed = Session::with_cache(source.clone(), cache.clone());
    let network = resumed.fetch_network(42)?;
    assert_eq!(network.edges.len(), 2);
    assert!(network.is_complete());
    assert_eq!(source.total_get_calls(), fetched_before + 1, "only the attribute is new");
    assert_eq!(source.get_calls(EntityKind::Attribute, ATTRIBUTE_ID), 1);
    assert_eq!(source.get_calls(EntityKind::Network, 42), 1);
    Ok(())
}
