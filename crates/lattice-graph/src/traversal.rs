//! Bounded traversals: call neighbours, dependency closure, shortest path.

use crate::graph::CodeGraph;
use lattice_core::{EdgeType, GraphEdge};
use petgraph::graph::NodeIndex;
use petgraph::Direction;
use std::collections::{HashMap, HashSet, VecDeque};

/// A node reached by a dependency traversal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reached {
    pub index: NodeIndex,
    pub depth: usize,
    /// Type of the edge that first reached the node.
    pub via: EdgeType,
}

/// A shortest path: `nodes.len() == edges.len() + 1`.
#[derive(Debug, Clone)]
pub struct Route<'a> {
    pub nodes: Vec<NodeIndex>,
    pub edges: Vec<&'a GraphEdge>,
}

impl CodeGraph {
    /// Gets nodes that call the given node, deduplicated and ordered by key.
    pub fn callers(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.call_neighbors(index, Direction::Incoming)
    }

    /// Gets nodes that this node calls, deduplicated and ordered by key.
    pub fn callees(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.call_neighbors(index, Direction::Outgoing)
    }

    fn call_neighbors(&self, index: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
        let mut seen = HashSet::new();
        self.neighbors(index, direction, |t| t == EdgeType::Calls)
            .into_iter()
            .map(|n| n.index)
            .filter(|i| seen.insert(*i))
            .collect()
    }

    /// Breadth-first walk over outgoing CALLS/IMPORTS/USES edges.
    ///
    /// Returns nodes in discovery order, excluding the start node. Nodes
    /// deeper than `max_depth` are not visited.
    pub fn dependencies(&self, start: NodeIndex, max_depth: usize) -> Vec<Reached> {
        let mut result = Vec::new();
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<(NodeIndex, usize)> = VecDeque::new();

        visited.insert(start);
        queue.push_back((start, 0));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for neighbor in self.neighbors(current, Direction::Outgoing, |t| t.is_dependency()) {
                if visited.insert(neighbor.index) {
                    result.push(Reached {
                        index: neighbor.index,
                        depth: depth + 1,
                        via: neighbor.edge.edge_type,
                    });
                    queue.push_back((neighbor.index, depth + 1));
                }
            }
        }

        result
    }

    /// Unweighted shortest path over outgoing edges of every type.
    ///
    /// Returns `None` when the target is not reachable within `max_depth`
    /// edges. A node reaches itself with an empty path.
    pub fn shortest_path(&self, from: NodeIndex, to: NodeIndex, max_depth: usize) -> Option<Route<'_>> {
        if from == to {
            return Some(Route {
                nodes: vec![from],
                edges: Vec::new(),
            });
        }

        let mut parent: HashMap<NodeIndex, (NodeIndex, &GraphEdge)> = HashMap::new();
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<(NodeIndex, usize)> = VecDeque::new();

        visited.insert(from);
        queue.push_back((from, 0));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for neighbor in self.neighbors(current, Direction::Outgoing, |_| true) {
                if !visited.insert(neighbor.index) {
                    continue;
                }
                parent.insert(neighbor.index, (current, neighbor.edge));
                if neighbor.index == to {
                    return Some(Self::unwind(&parent, from, to));
                }
                queue.push_back((neighbor.index, depth + 1));
            }
        }

        None
    }

    fn unwind<'a>(
        parent: &HashMap<NodeIndex, (NodeIndex, &'a GraphEdge)>,
        from: NodeIndex,
        to: NodeIndex,
    ) -> Route<'a> {
        let mut nodes = vec![to];
        let mut edges = Vec::new();
        let mut current = to;

        while current != from {
            let Some(&(previous, edge)) = parent.get(&current) else {
                break;
            };
            edges.push(edge);
            nodes.push(previous);
            current = previous;
        }

        nodes.reverse();
        edges.reverse();
        Route { nodes, edges }
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::fixtures::{idx, names, GraphFixture};
    use lattice_core::EdgeType;

    #[test]
    fn test_callers_and_callees() {
        let graph = GraphFixture::new()
            .node("a.ts", "main")
            .node("a.ts", "parse")
            .node("b.ts", "render")
            .node("b.ts", "Config")
            .edge("main", "parse", EdgeType::Calls)
            .edge("main", "render", EdgeType::Calls)
            .edge("render", "parse", EdgeType::Calls)
            .edge("main", "Config", EdgeType::Uses)
            .build();

        let callees = graph.callees(idx(&graph, "main"));
        assert_eq!(names(&graph, &callees), vec!["parse", "render"]);

        let callers = graph.callers(idx(&graph, "parse"));
        assert_eq!(names(&graph, &callers), vec!["main", "render"]);

        assert!(graph.callers(idx(&graph, "Config")).is_empty());
    }

    #[test]
    fn test_dependencies_bounded_by_depth() {
        // a → b → c → d, a contains e
        let graph = GraphFixture::new()
            .node("x.ts", "a")
            .node("x.ts", "b")
            .node("x.ts", "c")
            .node("x.ts", "d")
            .node("x.ts", "e")
            .edge("a", "b", EdgeType::Calls)
            .edge("b", "c", EdgeType::Imports)
            .edge("c", "d", EdgeType::Uses)
            .edge("a", "e", EdgeType::Contains)
            .build();

        let deps = graph.dependencies(idx(&graph, "a"), 2);
        let found: Vec<_> = deps.iter().map(|r| r.index).collect();
        assert_eq!(names(&graph, &found), vec!["b", "c"]);
        assert_eq!(deps[1].depth, 2);
        assert_eq!(deps[1].via, EdgeType::Imports);

        assert_eq!(graph.dependencies(idx(&graph, "a"), 10).len(), 3);
        assert!(graph.dependencies(idx(&graph, "a"), 0).is_empty());
    }

    #[test]
    fn test_dependencies_terminate_on_cycles() {
        let graph = GraphFixture::new()
            .node("x.ts", "a")
            .node("x.ts", "b")
            .edge("a", "b", EdgeType::Calls)
            .edge("b", "a", EdgeType::Calls)
            .build();

        let deps = graph.dependencies(idx(&graph, "a"), 50);
        assert_eq!(deps.len(), 1);
    }

    #[test]
    fn test_shortest_path_respects_bound() {
        // a → b → c → d, and a shorter a → x → d
        let graph = GraphFixture::new()
            .node("p.ts", "a")
            .node("p.ts", "b")
            .node("p.ts", "c")
            .node("p.ts", "d")
            .node("p.ts", "x")
            .edge("a", "b", EdgeType::Calls)
            .edge("b", "c", EdgeType::Calls)
            .edge("c", "d", EdgeType::Calls)
            .edge("a", "x", EdgeType::Contains)
            .edge("x", "d", EdgeType::Uses)
            .build();

        let (a, d) = (idx(&graph, "a"), idx(&graph, "d"));

        let route = graph.shortest_path(a, d, 10).unwrap();
        assert_eq!(names(&graph, &route.nodes), vec!["a", "x", "d"]);
        assert_eq!(route.edges.len(), 2);
        assert_eq!(route.edges[0].edge_type, EdgeType::Contains);

        assert!(graph.shortest_path(a, d, 2).is_some());
        assert!(graph.shortest_path(a, d, 1).is_none());
        // Edges are directed
        assert!(graph.shortest_path(d, a, 10).is_none());

        let self_route = graph.shortest_path(a, a, 0).unwrap();
        assert_eq!(self_route.nodes.len(), 1);
        assert!(self_route.edges.is_empty());
    }
}
