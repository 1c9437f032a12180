//! Persistence interface.
//!
//! Everything the indexer and the query engine know about storage goes
//! through [`GraphStore`]. Versions are written while pending and sealed by
//! [`GraphStore::commit_version`]; readers only ever see committed ones.

use lattice_core::{
    CodeEntity, EdgeId, GraphEdge, GraphNode, GraphVersion, NewEdge, NewVersion, NodeId, NodeKey,
    NodeType, ProjectId, Statistics, VersionId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("version {0} not found")]
    VersionNotFound(VersionId),

    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("edge {0} not found")]
    EdgeNotFound(EdgeId),

    #[error("version number {version_number} already exists for project {project_id}")]
    VersionConflict {
        project_id: ProjectId,
        version_number: u64,
    },

    #[error("version {0} is committed and cannot be modified")]
    Immutable(VersionId),

    #[error("node key {key} already exists in version {version}")]
    DuplicateKey { version: VersionId, key: NodeKey },

    #[error("edge endpoints {source_node} -> {target_node} are not nodes of version {version}")]
    DanglingEdge {
        version: VersionId,
        source_node: NodeId,
        target_node: NodeId,
    },

    #[error("Database error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// True for the "does not exist" family.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::VersionNotFound(_) | Self::NodeNotFound(_) | Self::EdgeNotFound(_)
        )
    }
}

/// Filter for [`GraphStore::query_nodes`].
///
/// Without a version the project's current version is scanned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFilter {
    pub project_id: ProjectId,
    pub version_id: Option<VersionId>,
    pub node_type: Option<NodeType>,
    /// Exact name.
    pub name: Option<String>,
    pub file_path: Option<String>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl NodeFilter {
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            project_id,
            ..Default::default()
        }
    }

    pub fn matches(&self, node: &GraphNode) -> bool {
        self.node_type.map_or(true, |t| node.node_type() == t)
            && self
                .name
                .as_deref()
                .map_or(true, |n| node.entity.name.as_deref() == Some(n))
            && self
                .file_path
                .as_deref()
                .map_or(true, |f| node.file_path() == f)
    }
}

/// One page of a filtered scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total_count: usize,
    pub execution_time_ms: u64,
}

/// Storage capability consumed by the engine.
///
/// Implementations must be safe to share across threads. Nodes and edges can
/// only be inserted into, updated in or deleted from a pending version.
pub trait GraphStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────
    // Versions
    // ─────────────────────────────────────────────────────────────────────

    /// Allocates a pending version. Fails with `VersionConflict` if the
    /// number is already taken for the project.
    fn create_version(&self, new: NewVersion) -> Result<GraphVersion>;

    /// Seals a pending version, making it visible to readers.
    fn commit_version(
        &self,
        id: VersionId,
        checksum: String,
        operations_count: u64,
    ) -> Result<GraphVersion>;

    /// Drops a pending version with all its nodes and edges.
    fn discard_version(&self, id: VersionId) -> Result<()>;

    fn get_version(&self, id: VersionId) -> Result<Option<GraphVersion>>;

    /// All versions of a project (pending included), by version number.
    fn list_versions(&self, project_id: &ProjectId) -> Result<Vec<GraphVersion>>;

    // ─────────────────────────────────────────────────────────────────────
    // Nodes
    // ─────────────────────────────────────────────────────────────────────

    /// Inserts entities into a pending version, returning the stored nodes
    /// in input order.
    fn insert_nodes(&self, version: VersionId, entities: Vec<CodeEntity>) -> Result<Vec<GraphNode>>;

    fn get_node(&self, id: NodeId) -> Result<Option<GraphNode>>;

    fn update_node(&self, id: NodeId, entity: CodeEntity) -> Result<GraphNode>;

    /// Deletes a node and every edge touching it.
    fn delete_node(&self, id: NodeId) -> Result<()>;

    /// Every node of a version, ordered by id.
    fn version_nodes(&self, version: VersionId) -> Result<Vec<GraphNode>>;

    // ─────────────────────────────────────────────────────────────────────
    // Edges
    // ─────────────────────────────────────────────────────────────────────

    /// Inserts edges into a pending version. Both endpoints must be nodes
    /// of that version.
    fn insert_edges(&self, version: VersionId, edges: Vec<NewEdge>) -> Result<Vec<GraphEdge>>;

    fn get_edge(&self, id: EdgeId) -> Result<Option<GraphEdge>>;

    fn delete_edge(&self, id: EdgeId) -> Result<()>;

    /// Every edge of a version, ordered by id.
    fn version_edges(&self, version: VersionId) -> Result<Vec<GraphEdge>>;

    // ─────────────────────────────────────────────────────────────────────
    // Provided
    // ─────────────────────────────────────────────────────────────────────

    /// Highest committed version of a project.
    fn current_version(&self, project_id: &ProjectId) -> Result<Option<GraphVersion>> {
        Ok(self
            .list_versions(project_id)?
            .into_iter()
            .filter(GraphVersion::is_committed)
            .max_by_key(|v| v.version_number))
    }

    /// One past the highest allocated number, pending versions included.
    fn next_version_number(&self, project_id: &ProjectId) -> Result<u64> {
        Ok(self
            .list_versions(project_id)?
            .iter()
            .map(|v| v.version_number)
            .max()
            .unwrap_or(0)
            + 1)
    }

    /// Filtered, paginated node scan.
    fn query_nodes(&self, filter: &NodeFilter) -> Result<Page<GraphNode>> {
        let start = Instant::now();

        let version = match filter.version_id {
            Some(id) => Some(id),
            None => self.current_version(&filter.project_id)?.map(|v| v.id),
        };
        let Some(version) = version else {
            return Ok(Page {
                data: Vec::new(),
                total_count: 0,
                execution_time_ms: start.elapsed().as_millis() as u64,
            });
        };

        let matching: Vec<GraphNode> = self
            .version_nodes(version)?
            .into_iter()
            .filter(|n| n.project_id == filter.project_id && filter.matches(n))
            .collect();
        let total_count = matching.len();

        let data = matching
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect();

        Ok(Page {
            data,
            total_count,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Aggregates over the project's current version, `None` if it has none.
    fn statistics(&self, project_id: &ProjectId) -> Result<Option<Statistics>> {
        let Some(version) = self.current_version(project_id)? else {
            return Ok(None);
        };

        let nodes = self.version_nodes(version.id)?;
        let total_edges = self.version_edges(version.id)?.len();

        let files: HashSet<&str> = nodes.iter().map(|n| n.file_path()).collect();
        let complexities: Vec<u32> = nodes.iter().filter_map(|n| n.entity.complexity).collect();
        let average_complexity = if complexities.is_empty() {
            0.0
        } else {
            complexities.iter().map(|&c| c as f64).sum::<f64>() / complexities.len() as f64
        };

        Ok(Some(Statistics {
            project_id: project_id.clone(),
            total_nodes: nodes.len(),
            total_edges,
            total_files: files.len(),
            version_number: version.version_number,
            version_created: version.created_at,
            average_complexity,
        }))
    }
}
