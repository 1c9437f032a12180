//! Centrality scoring.
//!
//! A node's centrality is its weighted degree over dependency edges,
//! scaled up for complex nodes. High scores mark bottlenecks: code that
//! much of the project routes through.

use crate::graph::CodeGraph;
use lattice_core::GraphNode;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Centrality per node plus its raw connection count.
#[derive(Debug, Default, Clone)]
pub struct CentralityScores {
    scores: HashMap<NodeIndex, (f64, usize)>,
}

impl CentralityScores {
    pub fn get(&self, index: NodeIndex) -> f64 {
        self.scores.get(&index).map(|(s, _)| *s).unwrap_or(0.0)
    }

    pub fn connections(&self, index: NodeIndex) -> usize {
        self.scores.get(&index).map(|(_, c)| *c).unwrap_or(0)
    }
}

/// A node ranked by centrality.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bottleneck {
    pub node: GraphNode,
    pub centrality: f64,
    /// Incoming plus outgoing dependency edges.
    pub total_connections: usize,
}

/// Computes `(Σ in+out edge weights) × (1 + complexity / 10)` for every
/// node, ignoring CONTAINS edges.
pub fn compute_centrality(graph: &CodeGraph) -> CentralityScores {
    let mut scores = HashMap::with_capacity(graph.node_count());

    for index in graph.graph.node_indices() {
        let mut weight = 0.0;
        let mut connections = 0;
        for direction in [Direction::Incoming, Direction::Outgoing] {
            for edge in graph.graph.edges_directed(index, direction) {
                if edge.weight().edge_type.is_dependency() {
                    weight += edge.weight().weight;
                    connections += 1;
                }
            }
        }

        let complexity = graph.node(index).complexity() as f64;
        scores.insert(index, (weight * (1.0 + complexity / 10.0), connections));
    }

    CentralityScores { scores }
}

impl CodeGraph {
    /// Every node ranked by centrality, highest first, ties by key.
    pub fn bottlenecks(&self, limit: Option<usize>) -> Vec<Bottleneck> {
        let scores = compute_centrality(self);

        let mut ranked: Vec<NodeIndex> = self.graph.node_indices().collect();
        ranked.sort_by(|a, b| {
            scores
                .get(*b)
                .total_cmp(&scores.get(*a))
                .then_with(|| self.node(*a).key().cmp(self.node(*b).key()))
        });

        ranked
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|index| Bottleneck {
                node: self.node(index).clone(),
                centrality: scores.get(index),
                total_connections: scores.connections(index),
            })
            .collect()
    }
}
