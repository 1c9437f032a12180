//! Circular dependency detection.
//!
//! Three-colour depth-first search over dependency edges. A back edge to a
//! node still on the stack closes a cycle, which is read off the stack,
//! rotated to start at its smallest key and deduplicated.

use crate::graph::CodeGraph;
use crate::impact::{RiskLevel, HIGH_COMPLEXITY};
use lattice_core::{GraphNode, NodeKey};
use petgraph::graph::NodeIndex;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// On the current DFS path.
    Gray,
    /// Fully explored.
    Black,
}

/// One dependency cycle, starting at its smallest key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cycle {
    pub nodes: Vec<GraphNode>,
    pub length: usize,
    /// Low, medium or high.
    pub severity: RiskLevel,
}

impl Cycle {
    /// Length ≤3 low, ≤6 medium, else high; one level higher when any
    /// member is complex.
    pub fn classify(length: usize, max_complexity: u32) -> RiskLevel {
        let base = match length {
            0..=3 => RiskLevel::Low,
            4..=6 => RiskLevel::Medium,
            _ => RiskLevel::High,
        };
        if max_complexity >= HIGH_COMPLEXITY {
            base.escalate(RiskLevel::High)
        } else {
            base
        }
    }
}

/// DFS frame: a node and the position in its neighbour list.
struct Frame {
    index: NodeIndex,
    neighbors: Vec<NodeIndex>,
    next: usize,
}

impl CodeGraph {
    /// Finds dependency cycles, ignoring CONTAINS edges.
    ///
    /// Roots and neighbours are visited in key order, so the result does not
    /// depend on storage order. Cycles are sorted by their key sequence.
    pub fn find_cycles(&self) -> Vec<Cycle> {
        let mut color: HashMap<NodeIndex, Color> = HashMap::new();
        let mut seen: HashSet<Vec<NodeKey>> = HashSet::new();
        let mut found: Vec<(Vec<NodeKey>, Vec<NodeIndex>)> = Vec::new();

        for root in self.indexes_by_key() {
            if color.contains_key(&root) {
                continue;
            }

            let mut stack: Vec<Frame> = vec![self.frame(root)];
            color.insert(root, Color::Gray);

            while let Some(top) = stack.last_mut() {
                let Some(&next) = top.neighbors.get(top.next) else {
                    color.insert(top.index, Color::Black);
                    stack.pop();
                    continue;
                };
                top.next += 1;

                match color.get(&next) {
                    None => {
                        color.insert(next, Color::Gray);
                        stack.push(self.frame(next));
                    }
                    Some(Color::Gray) => {
                        // Back edge: the cycle is the stack from `next` up
                        let Some(start) = stack.iter().position(|f| f.index == next) else {
                            continue;
                        };
                        let members: Vec<NodeIndex> =
                            stack[start..].iter().map(|f| f.index).collect();
                        let canonical = self.canonicalize(members);
                        let keys: Vec<NodeKey> =
                            canonical.iter().map(|i| self.node(*i).key().clone()).collect();
                        if seen.insert(keys.clone()) {
                            found.push((keys, canonical));
                        }
                    }
                    Some(Color::Black) => {}
                }
            }
        }

        found.sort_by(|a, b| a.0.cmp(&b.0));
        found
            .into_iter()
            .map(|(_, members)| {
                let max_complexity = members
                    .iter()
                    .map(|i| self.node(*i).complexity())
                    .max()
                    .unwrap_or(0);
                Cycle {
                    length: members.len(),
                    severity: Cycle::classify(members.len(), max_complexity),
                    nodes: members.iter().map(|i| self.node(*i).clone()).collect(),
                }
            })
            .collect()
    }

    fn frame(&self, index: NodeIndex) -> Frame {
        let mut neighbors: Vec<NodeIndex> = self
            .neighbors(index, Direction::Outgoing, |t| t.is_dependency())
            .into_iter()
            .map(|n| n.index)
            .collect();
        neighbors.dedup();
        Frame {
            index,
            neighbors,
            next: 0,
        }
    }

    /// Rotates a cycle to start at its smallest key, keeping cyclic order.
    fn canonicalize(&self, mut members: Vec<NodeIndex>) -> Vec<NodeIndex> {
        let smallest = members
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| self.node(**a).key().cmp(self.node(**b).key()))
            .map(|(pos, _)| pos)
            .unwrap_or(0);
        members.rotate_left(smallest);
        members
    }
}
