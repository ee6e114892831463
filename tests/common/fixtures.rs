//! In-memory Mangal databases for integration tests.
//!
//! ```ignore
//! let source = with_network(catalogue(), 42, 5)
//!     .with_records(EntityKind::Interaction, [interaction(1, 42, node_id(42, 1), node_id(42, 2))]);
//! let (source, session) = session(source, 100, 1);
//! ```

use std::sync::Arc;

use mangal::{MockSource, Session, SessionConfig};
use mangal_types::EntityKind;
use serde_json::{json, Value};

pub const REFERENCE_ID: u64 = 1;
pub const DATASET_ID: u64 = 1;
pub const ATTRIBUTE_ID: u64 = 1;

/// Taxa shared by every fixture network; node `i` of any network maps to taxon `i`.
pub const TAXA: u64 = 20;

/// Identifier of the `i`-th node (1-based) of a fixture network.
#[allow(dead_code)]
pub fn node_id(network: u64, i: u64) -> u64 {
    network * 1000 + i
}

/// Reference, dataset, attribute and taxa, without any network.
#[allow(dead_code)]
pub fn catalogue() -> MockSource {
    MockSource::new()
        .with_record(
            EntityKind::Reference,
            json!({"id": REFERENCE_ID, "doi": "10.2307/1940591", "year": 1991}),
        )
        .with_record(
            EntityKind::Dataset,
            json!({"id": DATASET_ID, "name": "test dataset", "ref_id": REFERENCE_ID, "public": true}),
        )
        .with_record(
            EntityKind::Attribute,
            json!({"id": ATTRIBUTE_ID, "name": "presence/absence", "unit": null}),
        )
        .with_records(
            EntityKind::ReferenceTaxon,
            (1..=TAXA).map(|i| json!({"id": i, "name": format!("Taxon {i}"), "rank": "species"})),
        )
}

/// Add a network with `nodes` nodes to `source`.
#[allow(dead_code)]
pub fn with_network(source: MockSource, network: u64, nodes: u64) -> MockSource {
    assert!(nodes <= TAXA, "fixture networks have at most {TAXA} nodes");
    source
        .with_record(
            EntityKind::Network,
            json!({
                "id": network,
                "name": format!("network {network}"),
                "dataset_id": DATASET_ID,
                "public": true,
                "geom": {"type": "Point", "coordinates": [-2.0, 57.3]}
            }),
        )
        .with_records(
            EntityKind::Node,
            (1..=nodes).map(|i| {
                json!({
                    "id": node_id(network, i),
                    "original_name": format!("node {i}"),
                    "node_level": "taxon",
                    "network_id": network,
                    "taxonomy_id": i
                })
            }),
        )
}

/// A directed boolean predation record.
#[allow(dead_code)]
pub fn interaction(id: u64, network: u64, from: u64, to: u64) -> Value {
    json!({
        "id": id,
        "network_id": network,
        "node_from": from,
        "node_to": to,
        "attr_id": ATTRIBUTE_ID,
        "type": "predation",
        "direction": "directed",
        "method": "gut content",
        "value": null,
        "public": true
    })
}

/// Replace one field of a JSON record.
#[allow(dead_code)]
pub fn set(mut record: Value, field: &str, value: Value) -> Value {
    record[field] = value;
    record
}

/// Session over `source` with the given page size and worker count.
#[allow(dead_code)]
pub fn session(source: MockSource, page_size: usize, workers: usize) -> (Arc<MockSource>, Session) {
    let source = Arc::new(source);
    let config = SessionConfig::default()
        .with_page_size(page_size)
        .with_workers(workers);
    let session = Session::new(source.clone()).with_config(config);
    (source, session)
}
