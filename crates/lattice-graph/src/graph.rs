//! Core graph data structure.
//!
//! A `CodeGraph` is one committed version materialized in memory: petgraph
//! for the topology plus indexes for fast lookups. It is immutable once
//! built, so it can be shared between readers behind an `Arc`.

use crate::search_index::SearchIndex;
use crate::store::{self, GraphStore};
use lattice_core::{EdgeType, GraphEdge, GraphNode, GraphVersion, NodeId, NodeKey};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// An adjacent node reached over one edge.
#[derive(Debug, Clone, Copy)]
pub struct Neighbor<'a> {
    pub index: NodeIndex,
    pub edge: &'a GraphEdge,
}

/// The code relationship graph of one version.
#[derive(Debug)]
pub struct CodeGraph {
    version: GraphVersion,

    /// The underlying petgraph graph.
    pub(crate) graph: DiGraph<GraphNode, GraphEdge>,

    /// Maps storage ids to graph indexes.
    by_id: HashMap<NodeId, NodeIndex>,

    /// Maps stable keys to graph indexes.
    by_key: HashMap<NodeKey, NodeIndex>,

    /// Maps node names to graph indexes.
    by_name: HashMap<String, Vec<NodeIndex>>,

    /// Maps file paths to graph indexes.
    by_file: BTreeMap<String, Vec<NodeIndex>>,

    /// Purpose text index for semantic search.
    purpose_index: SearchIndex,
}

impl CodeGraph {
    /// Builds the graph from a version's rows.
    ///
    /// Edges whose endpoints are not in `nodes` are skipped.
    pub fn from_parts(version: GraphVersion, nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) -> Self {
        let mut graph = DiGraph::with_capacity(nodes.len(), edges.len());
        let mut by_id = HashMap::with_capacity(nodes.len());
        let mut by_key = HashMap::with_capacity(nodes.len());
        let mut by_name: HashMap<String, Vec<NodeIndex>> = HashMap::new();
        let mut by_file: BTreeMap<String, Vec<NodeIndex>> = BTreeMap::new();
        let mut purpose_index = SearchIndex::new();

        for node in nodes {
            let id = node.id;
            let key = node.key().clone();
            let name = node.entity.name.clone();
            let file = node.file_path().to_string();
            let purpose = node.entity.purpose.clone();

            let index = graph.add_node(node);

            by_id.insert(id, index);
            by_key.insert(key, index);
            if let Some(name) = name {
                by_name.entry(name).or_default().push(index);
            }
            by_file.entry(file).or_default().push(index);
            if let Some(purpose) = purpose {
                purpose_index.insert(&purpose, index);
            }
        }

        for edge in edges {
            let (Some(&from), Some(&to)) = (
                by_id.get(&edge.source_node_id),
                by_id.get(&edge.target_node_id),
            ) else {
                warn!("Skipping dangling edge {} in version {}", edge.id, version.id);
                continue;
            };
            graph.add_edge(from, to, edge);
        }

        debug!(
            "Materialized version {} ({} nodes, {} edges)",
            version.id,
            graph.node_count(),
            graph.edge_count()
        );

        Self {
            version,
            graph,
            by_id,
            by_key,
            by_name,
            by_file,
            purpose_index,
        }
    }

    /// Loads a version from the store.
    pub fn load<S: GraphStore + ?Sized>(store: &S, version: &GraphVersion) -> store::Result<Self> {
        let nodes = store.version_nodes(version.id)?;
        let edges = store.version_edges(version.id)?;
        Ok(Self::from_parts(version.clone(), nodes, edges))
    }

    pub fn version(&self) -> &GraphVersion {
        &self.version
    }

    /// Gets a node by its graph index.
    ///
    /// Indexes are only valid for the graph that produced them.
    pub fn node(&self, index: NodeIndex) -> &GraphNode {
        &self.graph[index]
    }

    /// Gets the graph index for a storage id of this version.
    pub fn index_of(&self, id: NodeId) -> Option<NodeIndex> {
        self.by_id.get(&id).copied()
    }

    /// Gets the graph index for a stable key.
    pub fn index_of_key(&self, key: &NodeKey) -> Option<NodeIndex> {
        self.by_key.get(key).copied()
    }

    /// Finds all nodes with a given name, ordered by key.
    pub fn find_by_name(&self, name: &str) -> Vec<NodeIndex> {
        let mut found = self.by_name.get(name).cloned().unwrap_or_default();
        self.sort_by_key(&mut found);
        found
    }

    /// Finds all nodes in a file.
    pub fn find_by_file(&self, file: &str) -> &[NodeIndex] {
        self.by_file.get(file).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Distinct file paths, sorted.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.by_file.keys().map(String::as_str)
    }

    /// Nodes whose purpose text may match the query.
    pub fn purpose_candidates(&self, query: &str) -> Vec<NodeIndex> {
        self.purpose_index.candidates(query)
    }

    /// Iterates over all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.graph.node_weights()
    }

    /// Iterates over all edges.
    pub fn edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.graph.edge_weights()
    }

    /// All node indexes ordered by key.
    pub fn indexes_by_key(&self) -> Vec<NodeIndex> {
        let mut all: Vec<NodeIndex> = self.graph.node_indices().collect();
        self.sort_by_key(&mut all);
        all
    }

    /// Edges of one node in one direction that pass `filter`, ordered by
    /// neighbor key, then edge type, then edge id.
    pub fn neighbors(
        &self,
        index: NodeIndex,
        direction: Direction,
        filter: impl Fn(EdgeType) -> bool,
    ) -> Vec<Neighbor<'_>> {
        let mut found: Vec<Neighbor<'_>> = self
            .graph
            .edges_directed(index, direction)
            .filter(|e| filter(e.weight().edge_type))
            .map(|e| Neighbor {
                index: match direction {
                    Direction::Outgoing => e.target(),
                    Direction::Incoming => e.source(),
                },
                edge: e.weight(),
            })
            .collect();

        found.sort_by(|a, b| {
            self.graph[a.index]
                .key()
                .cmp(self.graph[b.index].key())
                .then_with(|| a.edge.edge_type.cmp(&b.edge.edge_type))
                .then_with(|| a.edge.id.cmp(&b.edge.id))
        });
        found
    }

    /// Returns the number of nodes.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub(crate) fn sort_by_key(&self, indexes: &mut [NodeIndex]) {
        indexes.sort_by(|a, b| self.graph[*a].key().cmp(self.graph[*b].key()));
    }
}

/// Test fixtures shared by the analysis modules.
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::Utc;
    use lattice_core::{
        CodeEntity, EdgeId, Location, NodeType, ProjectId, VersionId, VersionState,
    };

    /// Builds graphs by hand: nodes named by key, edges by name pairs.
    #[derive(Default)]
    pub(crate) struct GraphFixture {
        nodes: Vec<GraphNode>,
        edges: Vec<GraphEdge>,
    }

    impl GraphFixture {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Adds a FUNCTION `name` in `file`, keyed `{file}:{n}:{name}`.
        pub(crate) fn node(self, file: &str, name: &str) -> Self {
            self.node_with(file, name, NodeType::Function, None)
        }

        pub(crate) fn node_with(
            mut self,
            file: &str,
            name: &str,
            node_type: NodeType,
            complexity: Option<u32>,
        ) -> Self {
            let id = self.nodes.len() as u64 + 1;
            self.nodes.push(GraphNode {
                id: NodeId(id),
                project_id: ProjectId::new("test"),
                version_id: VersionId(1),
                entity: CodeEntity {
                    node_key: NodeKey::declaration(file, id as u32, name),
                    node_type,
                    name: Some(name.to_string()),
                    location: Location::new(file, id as u32, id as u32 + 1),
                    language: "typescript".to_string(),
                    content_hash: format!("h-{}", name),
                    signature: None,
                    complexity,
                    purpose: None,
                    parameters: Vec::new(),
                    return_type: None,
                },
            });
            self
        }

        pub(crate) fn purpose(mut self, name: &str, purpose: &str) -> Self {
            if let Some(node) = self.nodes.iter_mut().find(|n| n.name() == name) {
                node.entity.purpose = Some(purpose.to_string());
            }
            self
        }

        pub(crate) fn edge(self, from: &str, to: &str, edge_type: EdgeType) -> Self {
            self.weighted_edge(from, to, edge_type, 1.0)
        }

        pub(crate) fn weighted_edge(mut self, from: &str, to: &str, edge_type: EdgeType, weight: f64) -> Self {
            let source = self.id(from);
            let target = self.id(to);
            self.edges.push(GraphEdge {
                id: EdgeId(1000 + self.edges.len() as u64),
                project_id: ProjectId::new("test"),
                version_id: VersionId(1),
                source_node_id: source,
                target_node_id: target,
                edge_type,
                weight,
                call_type: None,
            });
            self
        }

        pub(crate) fn id(&self, name: &str) -> NodeId {
            self.nodes
                .iter()
                .find(|n| n.name() == name)
                .map(|n| n.id)
                .unwrap_or_else(|| panic!("fixture has no node {}", name))
        }

        pub(crate) fn build(self) -> CodeGraph {
            let version = GraphVersion {
                id: VersionId(1),
                project_id: ProjectId::new("test"),
                version_number: 1,
                checksum: String::new(),
                operations_count: 0,
                created_at: Utc::now(),
                state: VersionState::Committed,
            };
            CodeGraph::from_parts(version, self.nodes, self.edges)
        }
    }

    /// Graph index of the node named `name`.
    pub(crate) fn idx(graph: &CodeGraph, name: &str) -> NodeIndex {
        graph
            .find_by_name(name)
            .first()
            .copied()
            .unwrap_or_else(|| panic!("graph has no node {}", name))
    }

    pub(crate) fn names(graph: &CodeGraph, indexes: &[NodeIndex]) -> Vec<String> {
        indexes.iter().map(|i| graph.node(*i).name().to_string()).collect()
    }
}
