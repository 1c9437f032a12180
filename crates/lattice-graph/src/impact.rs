//! Impact analysis for code changes.
//!
//! This module provides bidirectional BFS traversal to find all nodes
//! affected by a change to a target node. It answers the question:
//! "What breaks if I change this?"

use crate::graph::CodeGraph;
use lattice_core::{EdgeType, GraphNode};
use petgraph::graph::NodeIndex;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::time::Instant;

/// How far impact analysis walks from the target.
pub const IMPACT_MAX_HOPS: usize = 3;

/// Complexity at which a node counts as hard to change.
pub const HIGH_COMPLEXITY: u32 = 15;

/// Bucketed risk of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Buckets a count of impacted nodes: <5 low, <15 medium, <30 high.
    pub fn from_impacted(count: usize) -> Self {
        match count {
            0..=4 => Self::Low,
            5..=14 => Self::Medium,
            15..=29 => Self::High,
            _ => Self::Critical,
        }
    }

    /// One level higher, never above `ceiling`.
    pub fn escalate(self, ceiling: RiskLevel) -> Self {
        let next = match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Critical => Self::Critical,
        };
        next.min(ceiling).max(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of impact from the target node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactDirection {
    /// Nodes that depend on the target (incoming edges).
    /// These break if the target's interface changes.
    Upstream,
    /// Nodes the target depends on (outgoing edges).
    /// Changes here may require updating the target.
    Downstream,
}

impl std::fmt::Display for ImpactDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImpactDirection::Upstream => write!(f, "upstream"),
            ImpactDirection::Downstream => write!(f, "downstream"),
        }
    }
}

/// A node affected by a change to the target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedNode {
    pub node: GraphNode,
    /// Number of edges between target and this node.
    pub hop_distance: usize,
    /// The edge type of the first hop that led to this node.
    pub entry_edge: EdgeType,
    pub direction: ImpactDirection,
}

/// Complete impact analysis result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactAnalysis {
    pub target: GraphNode,
    /// One hop away in either direction.
    pub directly_affected: Vec<AffectedNode>,
    /// Two to three hops away, excluding direct ones and the target.
    pub indirectly_affected: Vec<AffectedNode>,
    /// Files of the target and every affected node, sorted.
    pub affected_files: Vec<String>,
    pub risk_level: RiskLevel,
    pub total_affected: usize,
    pub query_time_ms: u64,
}

impl ImpactAnalysis {
    /// Returns a summary suitable for CLI output.
    pub fn summary(&self) -> String {
        format!(
            "Blast Radius: {} nodes (direct: {}, indirect: {}) across {} files, risk {}",
            self.total_affected,
            self.directly_affected.len(),
            self.indirectly_affected.len(),
            self.affected_files.len(),
            self.risk_level
        )
    }
}

/// First arrival of the BFS at a node.
#[derive(Debug, Clone, Copy)]
struct Arrival {
    hops: usize,
    entry_edge: EdgeType,
    direction: ImpactDirection,
}

impl CodeGraph {
    /// Analyzes the impact of changing a node.
    ///
    /// Performs bidirectional BFS from the target over dependency edges:
    /// - Upstream: nodes that depend on target (would break if target changes)
    /// - Downstream: nodes target depends on (may require target updates)
    ///
    /// A node reachable both ways is reported once, at its smaller hop
    /// distance (upstream on ties).
    pub fn analyze_impact(&self, target: NodeIndex) -> ImpactAnalysis {
        let start = Instant::now();

        let upstream = self.bfs_impact(target, Direction::Incoming, IMPACT_MAX_HOPS);
        let downstream = self.bfs_impact(target, Direction::Outgoing, IMPACT_MAX_HOPS);

        let mut merged: HashMap<NodeIndex, Arrival> = upstream;
        for (index, arrival) in downstream {
            merged
                .entry(index)
                .and_modify(|existing| {
                    if arrival.hops < existing.hops {
                        *existing = arrival;
                    }
                })
                .or_insert(arrival);
        }

        let mut affected: Vec<(NodeIndex, Arrival)> = merged.into_iter().collect();
        affected.sort_by(|(a, x), (b, y)| {
            x.hops
                .cmp(&y.hops)
                .then_with(|| self.node(*a).key().cmp(self.node(*b).key()))
        });

        let target_node = self.node(target);
        let mut files: BTreeSet<String> = BTreeSet::new();
        files.insert(target_node.file_path().to_string());

        let mut directly_affected = Vec::new();
        let mut indirectly_affected = Vec::new();
        for (index, arrival) in affected {
            let node = self.node(index);
            files.insert(node.file_path().to_string());
            let entry = AffectedNode {
                node: node.clone(),
                hop_distance: arrival.hops,
                entry_edge: arrival.entry_edge,
                direction: arrival.direction,
            };
            if arrival.hops == 1 {
                directly_affected.push(entry);
            } else {
                indirectly_affected.push(entry);
            }
        }

        let total_affected = directly_affected.len() + indirectly_affected.len();
        let mut risk_level = RiskLevel::from_impacted(total_affected);
        if target_node.complexity() >= HIGH_COMPLEXITY {
            risk_level = risk_level.escalate(RiskLevel::Critical);
        }

        ImpactAnalysis {
            target: target_node.clone(),
            directly_affected,
            indirectly_affected,
            affected_files: files.into_iter().collect(),
            risk_level,
            total_affected,
            query_time_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// BFS traversal in one direction from target.
    fn bfs_impact(
        &self,
        target: NodeIndex,
        direction: Direction,
        max_depth: usize,
    ) -> HashMap<NodeIndex, Arrival> {
        let impact_direction = match direction {
            Direction::Incoming => ImpactDirection::Upstream,
            Direction::Outgoing => ImpactDirection::Downstream,
        };

        let mut result = HashMap::new();
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<(NodeIndex, usize, Option<EdgeType>)> = VecDeque::new();

        visited.insert(target);
        queue.push_back((target, 0, None));

        while let Some((current, depth, entry_edge)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for neighbor in self.neighbors(current, direction, |t| t.is_dependency()) {
                if !visited.insert(neighbor.index) {
                    continue;
                }
                // The first hop explains why everything behind it is affected
                let entry = entry_edge.unwrap_or(neighbor.edge.edge_type);
                result.insert(
                    neighbor.index,
                    Arrival {
                        hops: depth + 1,
                        entry_edge: entry,
                        direction: impact_direction,
                    },
                );
                queue.push_back((neighbor.index, depth + 1, Some(entry)));
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::fixtures::{idx, GraphFixture};
    use lattice_core::NodeType;

    fn affected_names(nodes: &[AffectedNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.node.name()).collect()
    }

    #[test]
    fn test_risk_buckets() {
        assert_eq!(RiskLevel::from_impacted(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_impacted(4), RiskLevel::Low);
        assert_eq!(RiskLevel::from_impacted(5), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_impacted(14), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_impacted(15), RiskLevel::High);
        assert_eq!(RiskLevel::from_impacted(30), RiskLevel::Critical);

        assert_eq!(RiskLevel::Low.escalate(RiskLevel::Critical), RiskLevel::Medium);
        assert_eq!(RiskLevel::Critical.escalate(RiskLevel::Critical), RiskLevel::Critical);
        assert_eq!(RiskLevel::High.escalate(RiskLevel::High), RiskLevel::High);
    }

    #[test]
    fn test_single_node() {
        let graph = GraphFixture::new().node("a.ts", "lonely").build();
        let result = graph.analyze_impact(idx(&graph, "lonely"));
        assert_eq!(result.total_affected, 0);
        assert_eq!(result.target.name(), "lonely");
        assert_eq!(result.affected_files, vec!["a.ts"]);
        assert_eq!(result.risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_linear_chain() {
        // A → B → C
        let graph = GraphFixture::new()
            .node("a.ts", "A")
            .node("b.ts", "B")
            .node("c.ts", "C")
            .edge("A", "B", EdgeType::Calls)
            .edge("B", "C", EdgeType::Calls)
            .build();

        let result = graph.analyze_impact(idx(&graph, "A"));
        assert_eq!(affected_names(&result.directly_affected), vec!["B"]);
        assert_eq!(affected_names(&result.indirectly_affected), vec!["C"]);
        assert_eq!(result.indirectly_affected[0].entry_edge, EdgeType::Calls);
        assert!(result.affected_files.contains(&"a.ts".to_string()));
        assert_eq!(result.affected_files.len(), 3);

        // Impact of B sees both sides
        let result = graph.analyze_impact(idx(&graph, "B"));
        let direct = &result.directly_affected;
        assert_eq!(direct.len(), 2);
        assert_eq!(direct[0].node.name(), "A");
        assert_eq!(direct[0].direction, ImpactDirection::Upstream);
        assert_eq!(direct[1].direction, ImpactDirection::Downstream);
    }

    #[test]
    fn test_bound_and_containment_ignored() {
        // A → B → C → D → E, and A contains F
        let graph = GraphFixture::new()
            .node("x.ts", "A")
            .node("x.ts", "B")
            .node("x.ts", "C")
            .node("x.ts", "D")
            .node("x.ts", "E")
            .node("x.ts", "F")
            .edge("A", "B", EdgeType::Calls)
            .edge("B", "C", EdgeType::Uses)
            .edge("C", "D", EdgeType::Calls)
            .edge("D", "E", EdgeType::Calls)
            .edge("A", "F", EdgeType::Contains)
            .build();

        let result = graph.analyze_impact(idx(&graph, "A"));
        assert_eq!(affected_names(&result.directly_affected), vec!["B"]);
        assert_eq!(affected_names(&result.indirectly_affected), vec!["C", "D"]);
    }

    #[test]
    fn test_cycle_reports_each_node_once() {
        // A → B → C → A
        let graph = GraphFixture::new()
            .node("x.ts", "A")
            .node("x.ts", "B")
            .node("x.ts", "C")
            .edge("A", "B", EdgeType::Calls)
            .edge("B", "C", EdgeType::Calls)
            .edge("C", "A", EdgeType::Calls)
            .build();

        let result = graph.analyze_impact(idx(&graph, "A"));
        assert_eq!(result.total_affected, 2);
        // B is downstream at 1 hop, C upstream at 1 hop
        assert_eq!(affected_names(&result.directly_affected), vec!["B", "C"]);
        assert!(result.indirectly_affected.is_empty());
    }

    #[test]
    fn test_complex_target_escalates_risk() {
        let graph = GraphFixture::new()
            .node_with("x.ts", "core", NodeType::Function, Some(20))
            .node("x.ts", "user")
            .edge("user", "core", EdgeType::Calls)
            .build();

        let result = graph.analyze_impact(idx(&graph, "core"));
        assert_eq!(result.total_affected, 1);
        assert_eq!(result.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn test_many_callers_are_high_risk() {
        let mut fixture = GraphFixture::new().node("hub.ts", "hub");
        for i in 0..16 {
            let name = format!("caller{}", i);
            fixture = fixture.node("callers.ts", &name).edge(&name, "hub", EdgeType::Calls);
        }
        let graph = fixture.build();

        let result = graph.analyze_impact(idx(&graph, "hub"));
        assert_eq!(result.directly_affected.len(), 16);
        assert_eq!(result.risk_level, RiskLevel::High);
        assert!(result.summary().contains("16 nodes"));
    }
}
