//! Network materialization.
//!
//! Turns the hydrated interactions of one network into a node set and a list
//! of weighted, typed edges. Every interaction either becomes exactly one
//! [`Edge`] or is skipped with a [`ConversionError`]; one bad record never
//! prevents the rest of the network from being built.
//!
//! # Edge weights
//!
//! | Strength | Weight | Rejected when |
//! |----------|--------|---------------|
//! | boolean | 1 | never (the value is ignored) |
//! | probabilistic | the value | missing, NaN or outside `[0, 1]` |
//! | quantitative | the value | missing, negative or not finite |
//!
//! A quantitative value of 0 is a recorded link of zero magnitude and still
//! produces an edge.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use mangal_types::{
    Attribute, ConversionError, ConversionFailure, Endpoint, HydrationError, Interaction, Link,
    Network, Node, SchemaError, Strength,
};
use petgraph::graph::{Graph, NodeIndex};
use serde::Serialize;
use tracing::{info, warn};

/// One interaction, ready for graph algorithms.
#[derive(Debug, Clone)]
pub struct Edge {
    /// Identifier of the interaction this edge was built from.
    pub interaction: u64,
    /// Source node id.
    pub source: u64,
    /// Target node id.
    pub target: u64,
    pub interaction_type: String,
    pub attribute: Option<Arc<Attribute>>,
    pub strength: Strength,
    pub weight: f64,
    pub directed: bool,
}

/// A network's nodes and edges, with the diagnostics produced building them.
#[derive(Debug, Clone)]
pub struct MaterializedNetwork {
    pub network: Arc<Network>,
    /// Distinct endpoints of the retained edges, in order of first use.
    pub nodes: Vec<Arc<Node>>,
    pub edges: Vec<Edge>,
    /// Interactions that could not become edges.
    pub skipped: Vec<ConversionError>,
    /// Interaction records rejected before hydration.
    pub rejected: Vec<SchemaError>,
    /// Relations of retained edges that could not be resolved (attributes).
    pub diagnostics: Vec<HydrationError>,
    node_index: HashMap<u64, usize>,
}

/// Build the node set and edges of `network` from its interactions.
pub fn materialize(
    network: Arc<Network>,
    interactions: impl IntoIterator<Item = Arc<Interaction>>,
) -> MaterializedNetwork {
    let mut materialized = MaterializedNetwork {
        network,
        nodes: Vec::new(),
        edges: Vec::new(),
        skipped: Vec::new(),
        rejected: Vec::new(),
        diagnostics: Vec::new(),
        node_index: HashMap::new(),
    };

    for interaction in interactions {
        match convert(&materialized.network, &interaction) {
            Ok((edge, source, target)) => {
                materialized.add_node(source);
                materialized.add_node(target);
                if let Some(err) = interaction.attribute.error() {
                    materialized.diagnostics.push(err.clone());
                }
                materialized.edges.push(edge);
            }
            Err(reason) => {
                let err = ConversionError {
                    interaction: interaction.id,
                    reason,
                };
                warn!(network = materialized.network.id, error = %err, "skipping interaction");
                materialized.skipped.push(err);
            }
        }
    }

    info!(
        network = materialized.network.id,
        nodes = materialized.nodes.len(),
        edges = materialized.edges.len(),
        skipped = materialized.skipped.len(),
        "materialized network"
    );
    materialized
}

fn convert(
    network: &Network,
    interaction: &Interaction,
) -> Result<(Edge, Arc<Node>, Arc<Node>), ConversionFailure> {
    let found = interaction.network.id();
    if found != Some(network.id) {
        return Err(ConversionFailure::ForeignInteraction {
            found,
            expected: network.id,
        });
    }

    let source = resolved_endpoint(network, &interaction.source, Endpoint::Source)?;
    let target = resolved_endpoint(network, &interaction.target, Endpoint::Target)?;
    let strength = interaction.strength_kind();
    let weight = edge_weight(strength, interaction.value)?;

    let edge = Edge {
        interaction: interaction.id,
        source: source.id,
        target: target.id,
        interaction_type: interaction.interaction_type.clone(),
        attribute: interaction.attribute.get().cloned(),
        strength,
        weight,
        directed: interaction.is_directed(),
    };
    Ok((edge, source, target))
}

fn resolved_endpoint(
    network: &Network,
    link: &Link<Node>,
    endpoint: Endpoint,
) -> Result<Arc<Node>, ConversionFailure> {
    match link {
        Link::Absent => Err(ConversionFailure::MissingEndpoint { endpoint }),
        Link::Failed(err) => Err(ConversionFailure::UnresolvedEndpoint {
            endpoint,
            reason: err.reason.clone(),
        }),
        Link::Resolved(node) if node.network_id == Some(network.id) => Ok(Arc::clone(node)),
        Link::Resolved(node) => Err(ConversionFailure::ForeignEndpoint {
            endpoint,
            node: node.id,
            found: node.network_id,
            expected: network.id,
        }),
    }
}

fn edge_weight(strength: Strength, value: Option<f64>) -> Result<f64, ConversionFailure> {
    match strength {
        Strength::Boolean => Ok(1.0),
        Strength::Probabilistic => {
            let p = value.ok_or(ConversionFailure::MissingValue {
                strength: strength.name(),
            })?;
            if (0.0..=1.0).contains(&p) {
                Ok(p)
            } else {
                Err(ConversionFailure::InvalidProbability(p))
            }
        }
        Strength::Quantitative => {
            let v = value.ok_or(ConversionFailure::MissingValue {
                strength: strength.name(),
            })?;
            if v.is_finite() && v >= 0.0 {
                Ok(v)
            } else {
                Err(ConversionFailure::InvalidMagnitude(v))
            }
        }
    }
}

impl MaterializedNetwork {
    fn add_node(&mut self, node: Arc<Node>) {
        if !self.node_index.contains_key(&node.id) {
            self.node_index.insert(node.id, self.nodes.len());
            self.nodes.push(node);
        }
    }

    /// Position of a node in [`nodes`](Self::nodes) and in matrix rows.
    pub fn node_index(&self, node: u64) -> Option<usize> {
        self.node_index.get(&node).copied()
    }

    pub fn node_ids(&self) -> Vec<u64> {
        self.nodes.iter().map(|n| n.id).collect()
    }

    /// Edges whose interaction type is `interaction_type`.
    pub fn edges_of_type<'a>(&'a self, interaction_type: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.interaction_type == interaction_type)
    }

    /// Edge count per interaction type.
    pub fn links_by_type(&self) -> BTreeMap<String, u64> {
        let mut counts = BTreeMap::new();
        for edge in &self.edges {
            *counts.entry(edge.interaction_type.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Whether every interaction became an edge.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty() && self.rejected.is_empty()
    }

    /// Dense weight matrix over [`nodes`](Self::nodes).
    ///
    /// Edges between the same pair are combined by strength: boolean edges
    /// set the cell to at least 1, probabilistic edges combine as independent
    /// events (`1 - (1 - a)(1 - b)`), quantitative edges add up. Undirected
    /// edges fill both cells.
    pub fn adjacency(&self) -> WeightMatrix {
        let n = self.nodes.len();
        let mut weights = vec![0.0; n * n];

        for edge in &self.edges {
            let (Some(s), Some(t)) = (self.node_index(edge.source), self.node_index(edge.target))
            else {
                continue;
            };
            combine(&mut weights[s * n + t], edge);
            if !edge.directed && s != t {
                combine(&mut weights[t * n + s], edge);
            }
        }

        WeightMatrix {
            nodes: self.node_ids(),
            weights,
        }
    }

    /// The network as a `petgraph` graph with node and edge payloads.
    ///
    /// Every edge is added from source to target; undirected interactions
    /// keep `directed == false` on the payload.
    pub fn to_petgraph(&self) -> Graph<Arc<Node>, Edge> {
        let mut graph = Graph::with_capacity(self.nodes.len(), self.edges.len());
        let indices: Vec<NodeIndex> = self
            .nodes
            .iter()
            .map(|node| graph.add_node(Arc::clone(node)))
            .collect();

        for edge in &self.edges {
            if let (Some(s), Some(t)) = (self.node_index(edge.source), self.node_index(edge.target)) {
                graph.add_edge(indices[s], indices[t], edge.clone());
            }
        }
        graph
    }
}

fn combine(cell: &mut f64, edge: &Edge) {
    *cell = match edge.strength {
        Strength::Boolean => cell.max(1.0),
        Strength::Probabilistic => 1.0 - (1.0 - *cell) * (1.0 - edge.weight),
        Strength::Quantitative => *cell + edge.weight,
    };
}

/// Row-major `n × n` weights, rows and columns in node order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightMatrix {
    pub nodes: Vec<u64>,
    pub weights: Vec<f64>,
}

impl WeightMatrix {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Outgoing weights of the node at `index`, `None` past the last node.
    pub fn row(&self, index: usize) -> Option<&[f64]> {
        let n = self.len();
        if index >= n {
            return None;
        }
        self.weights.get(index * n..(index + 1) * n)
    }

    /// Weight from one node id to another.
    pub fn get(&self, source: u64, target: u64) -> Option<f64> {
        let s = self.nodes.iter().position(|&id| id == source)?;
        let t = self.nodes.iter().position(|&id| id == target)?;
        self.weights.get(s * self.len() + t).copied()
    }
}
