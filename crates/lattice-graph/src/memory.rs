//! In-memory graph store.
//!
//! Used by tests and one-shot CLI runs. All state sits behind a single
//! `RwLock`, so reads of committed versions run concurrently.

use crate::store::{GraphStore, Result, StoreError};
use chrono::Utc;
use lattice_core::{
    CodeEntity, EdgeId, GraphEdge, GraphNode, GraphVersion, NewEdge, NewVersion, NodeId, NodeKey,
    ProjectId, VersionId, VersionState,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    versions: BTreeMap<VersionId, GraphVersion>,
    nodes: HashMap<NodeId, GraphNode>,
    edges: HashMap<EdgeId, GraphEdge>,
    version_nodes: HashMap<VersionId, BTreeSet<NodeId>>,
    version_edges: HashMap<VersionId, BTreeSet<EdgeId>>,
    version_keys: HashMap<VersionId, HashMap<NodeKey, NodeId>>,
}

impl Inner {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn pending_version(&self, id: VersionId) -> Result<&GraphVersion> {
        let version = self
            .versions
            .get(&id)
            .ok_or(StoreError::VersionNotFound(id))?;
        if version.is_committed() {
            return Err(StoreError::Immutable(id));
        }
        Ok(version)
    }

    fn remove_edge(&mut self, id: EdgeId) -> Option<GraphEdge> {
        let edge = self.edges.remove(&id)?;
        if let Some(ids) = self.version_edges.get_mut(&edge.version_id) {
            ids.remove(&id);
        }
        Some(edge)
    }
}

/// Volatile [`GraphStore`] backed by hash maps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read()
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write()
    }
}

impl GraphStore for MemoryStore {
    fn create_version(&self, new: NewVersion) -> Result<GraphVersion> {
        let mut inner = self.write();

        let taken = inner
            .versions
            .values()
            .any(|v| v.project_id == new.project_id && v.version_number == new.version_number);
        if taken {
            return Err(StoreError::VersionConflict {
                project_id: new.project_id,
                version_number: new.version_number,
            });
        }

        let id = VersionId(inner.allocate_id());
        let version = GraphVersion {
            id,
            project_id: new.project_id,
            version_number: new.version_number,
            checksum: String::new(),
            operations_count: 0,
            created_at: Utc::now(),
            state: VersionState::Pending,
        };
        inner.versions.insert(id, version.clone());
        inner.version_nodes.insert(id, BTreeSet::new());
        inner.version_edges.insert(id, BTreeSet::new());
        inner.version_keys.insert(id, HashMap::new());
        Ok(version)
    }

    fn commit_version(
        &self,
        id: VersionId,
        checksum: String,
        operations_count: u64,
    ) -> Result<GraphVersion> {
        let mut inner = self.write();
        inner.pending_version(id)?;

        let version = inner
            .versions
            .get_mut(&id)
            .ok_or(StoreError::VersionNotFound(id))?;
        version.checksum = checksum;
        version.operations_count = operations_count;
        version.state = VersionState::Committed;
        Ok(version.clone())
    }

    fn discard_version(&self, id: VersionId) -> Result<()> {
        let mut inner = self.write();
        inner.pending_version(id)?;

        inner.versions.remove(&id);
        for node_id in inner.version_nodes.remove(&id).unwrap_or_default() {
            inner.nodes.remove(&node_id);
        }
        for edge_id in inner.version_edges.remove(&id).unwrap_or_default() {
            inner.edges.remove(&edge_id);
        }
        inner.version_keys.remove(&id);
        Ok(())
    }

    fn get_version(&self, id: VersionId) -> Result<Option<GraphVersion>> {
        Ok(self.read().versions.get(&id).cloned())
    }

    fn list_versions(&self, project_id: &ProjectId) -> Result<Vec<GraphVersion>> {
        let inner = self.read();
        let mut versions: Vec<GraphVersion> = inner
            .versions
            .values()
            .filter(|v| &v.project_id == project_id)
            .cloned()
            .collect();
        versions.sort_by_key(|v| v.version_number);
        Ok(versions)
    }

    fn insert_nodes(&self, version: VersionId, entities: Vec<CodeEntity>) -> Result<Vec<GraphNode>> {
        let mut inner = self.write();
        let project_id = inner.pending_version(version)?.project_id.clone();

        // Validate the whole batch before touching anything
        {
            let keys = inner.version_keys.get(&version);
            let mut batch = std::collections::HashSet::new();
            for entity in &entities {
                let existing = keys.map_or(false, |k| k.contains_key(&entity.node_key));
                if existing || !batch.insert(&entity.node_key) {
                    return Err(StoreError::DuplicateKey {
                        version,
                        key: entity.node_key.clone(),
                    });
                }
            }
        }

        let mut stored = Vec::with_capacity(entities.len());
        for entity in entities {
            let id = NodeId(inner.allocate_id());
            let node = GraphNode {
                id,
                project_id: project_id.clone(),
                version_id: version,
                entity,
            };
            inner
                .version_keys
                .entry(version)
                .or_default()
                .insert(node.key().clone(), id);
            inner.version_nodes.entry(version).or_default().insert(id);
            inner.nodes.insert(id, node.clone());
            stored.push(node);
        }
        Ok(stored)
    }

    fn get_node(&self, id: NodeId) -> Result<Option<GraphNode>> {
        Ok(self.read().nodes.get(&id).cloned())
    }

    fn update_node(&self, id: NodeId, entity: CodeEntity) -> Result<GraphNode> {
        let mut inner = self.write();
        let current = inner
            .nodes
            .get(&id)
            .cloned()
            .ok_or(StoreError::NodeNotFound(id))?;
        inner.pending_version(current.version_id)?;

        if current.entity.node_key != entity.node_key {
            let keys = inner.version_keys.entry(current.version_id).or_default();
            if keys.contains_key(&entity.node_key) {
                return Err(StoreError::DuplicateKey {
                    version: current.version_id,
                    key: entity.node_key,
                });
            }
            keys.remove(&current.entity.node_key);
            keys.insert(entity.node_key.clone(), id);
        }

        let updated = GraphNode { entity, ..current };
        inner.nodes.insert(id, updated.clone());
        Ok(updated)
    }

    fn delete_node(&self, id: NodeId) -> Result<()> {
        let mut inner = self.write();
        let node = inner
            .nodes
            .get(&id)
            .cloned()
            .ok_or(StoreError::NodeNotFound(id))?;
        inner.pending_version(node.version_id)?;

        let incident: Vec<EdgeId> = inner
            .version_edges
            .get(&node.version_id)
            .into_iter()
            .flatten()
            .filter_map(|edge_id| inner.edges.get(edge_id))
            .filter(|e| e.source_node_id == id || e.target_node_id == id)
            .map(|e| e.id)
            .collect();
        for edge_id in incident {
            inner.remove_edge(edge_id);
        }

        inner.nodes.remove(&id);
        if let Some(ids) = inner.version_nodes.get_mut(&node.version_id) {
            ids.remove(&id);
        }
        if let Some(keys) = inner.version_keys.get_mut(&node.version_id) {
            keys.remove(node.key());
        }
        Ok(())
    }

    fn version_nodes(&self, version: VersionId) -> Result<Vec<GraphNode>> {
        let inner = self.read();
        let ids = inner
            .version_nodes
            .get(&version)
            .ok_or(StoreError::VersionNotFound(version))?;
        Ok(ids
            .iter()
            .filter_map(|id| inner.nodes.get(id))
            .cloned()
            .collect())
    }

    fn insert_edges(&self, version: VersionId, edges: Vec<NewEdge>) -> Result<Vec<GraphEdge>> {
        let mut inner = self.write();
        let project_id = inner.pending_version(version)?.project_id.clone();

        let in_version = |inner: &Inner, id: NodeId| {
            inner
                .version_nodes
                .get(&version)
                .map_or(false, |ids| ids.contains(&id))
        };
        for edge in &edges {
            if !in_version(&*inner, edge.source_node_id) || !in_version(&*inner, edge.target_node_id) {
                return Err(StoreError::DanglingEdge {
                    version,
                    source_node: edge.source_node_id,
                    target_node: edge.target_node_id,
                });
            }
        }

        let mut stored = Vec::with_capacity(edges.len());
        for edge in edges {
            let id = EdgeId(inner.allocate_id());
            let graph_edge = GraphEdge::from_new(id, project_id.clone(), version, edge);
            inner.version_edges.entry(version).or_default().insert(id);
            inner.edges.insert(id, graph_edge.clone());
            stored.push(graph_edge);
        }
        Ok(stored)
    }

    fn get_edge(&self, id: EdgeId) -> Result<Option<GraphEdge>> {
        Ok(self.read().edges.get(&id).cloned())
    }

    fn delete_edge(&self, id: EdgeId) -> Result<()> {
        let mut inner = self.write();
        let version = inner
            .edges
            .get(&id)
            .map(|e| e.version_id)
            .ok_or(StoreError::EdgeNotFound(id))?;
        inner.pending_version(version)?;
        inner.remove_edge(id);
        Ok(())
    }

    fn version_edges(&self, version: VersionId) -> Result<Vec<GraphEdge>> {
        let inner = self.read();
        let ids = inner
            .version_edges
            .get(&version)
            .ok_or(StoreError::VersionNotFound(version))?;
        Ok(ids
            .iter()
            .filter_map(|id| inner.edges.get(id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::conformance;

    #[test]
    fn test_version_lifecycle() {
        conformance::version_lifecycle(&MemoryStore::new());
    }

    #[test]
    fn test_nodes_and_edges() {
        conformance::nodes_and_edges(&MemoryStore::new());
    }

    #[test]
    fn test_committed_versions_are_immutable() {
        conformance::committed_versions_are_immutable(&MemoryStore::new());
    }

    #[test]
    fn test_discard_removes_rows() {
        conformance::discard_removes_rows(&MemoryStore::new());
    }

    #[test]
    fn test_query_and_statistics() {
        conformance::query_and_statistics(&MemoryStore::new());
    }
}
