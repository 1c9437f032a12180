//! Edge types for the code graph.
//!
//! Edges represent relationships between code entities. We keep
//! the set of edge kinds focused on what's useful for understanding
//! code architecture.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::node::NodeId;
use crate::version::{ProjectId, VersionId};

/// Storage handle of an edge row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub u64);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The type of relationship between two code entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    /// Function A calls function B (or instantiates class B).
    Calls,

    /// Module A imports module B.
    Imports,

    /// Entity A refers to type or value B.
    Uses,

    /// Container relationship (module contains class, class contains method).
    Contains,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calls => "CALLS",
            Self::Imports => "IMPORTS",
            Self::Uses => "USES",
            Self::Contains => "CONTAINS",
        }
    }

    /// Whether this edge expresses a dependency of source on target.
    ///
    /// Containment is structural and excluded from dependency analyses.
    pub fn is_dependency(&self) -> bool {
        !matches!(self, Self::Contains)
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An edge to be inserted into a pending version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEdge {
    pub source_node_id: NodeId,
    pub target_node_id: NodeId,
    pub edge_type: EdgeType,
    pub weight: f64,
    pub call_type: Option<String>,
}

impl NewEdge {
    /// Creates an edge with the default weight of 1.0.
    pub fn new(source: NodeId, target: NodeId, edge_type: EdgeType) -> Self {
        Self {
            source_node_id: source,
            target_node_id: target,
            edge_type,
            weight: 1.0,
            call_type: None,
        }
    }

    pub fn with_call_type(mut self, call_type: impl Into<String>) -> Self {
        self.call_type = Some(call_type.into());
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// An edge as stored in one version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub id: EdgeId,
    pub project_id: ProjectId,
    pub version_id: VersionId,
    pub source_node_id: NodeId,
    pub target_node_id: NodeId,
    pub edge_type: EdgeType,
    pub weight: f64,
    pub call_type: Option<String>,
}

impl GraphEdge {
    /// Builds the stored form of a new edge.
    pub fn from_new(id: EdgeId, project_id: ProjectId, version_id: VersionId, edge: NewEdge) -> Self {
        Self {
            id,
            project_id,
            version_id,
            source_node_id: edge.source_node_id,
            target_node_id: edge.target_node_id,
            edge_type: edge.edge_type,
            weight: edge.weight,
            call_type: edge.call_type,
        }
    }
}
