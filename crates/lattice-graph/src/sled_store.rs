//! Durable graph store on sled.
//!
//! One tree per record kind, rows encoded with bincode. Membership trees
//! are keyed by `version ++ id` (big-endian) so a prefix scan yields a
//! version's rows in id order.

use crate::store::{GraphStore, Result, StoreError};
use chrono::Utc;
use lattice_core::{
    CodeEntity, EdgeId, GraphEdge, GraphNode, GraphVersion, NewEdge, NewVersion, NodeId,
    ProjectId, VersionId, VersionState,
};
use parking_lot::{Mutex, MutexGuard};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

const VERSIONS: &str = "versions";
const NODES: &str = "nodes";
const EDGES: &str = "edges";
const VERSION_NODES: &str = "version_nodes";
const VERSION_EDGES: &str = "version_edges";
const NODE_KEYS: &str = "node_keys";

/// [`GraphStore`] persisted in a sled database.
pub struct SledStore {
    db: Db,
    versions: Tree,
    nodes: Tree,
    edges: Tree,
    version_nodes: Tree,
    version_edges: Tree,
    node_keys: Tree,
    /// Serializes writers; sled itself only guarantees per-key atomicity.
    write_lock: Mutex<()>,
}

impl SledStore {
    /// Opens or creates a store at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Opens a throwaway store that is removed on drop.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self> {
        Ok(Self {
            versions: db.open_tree(VERSIONS)?,
            nodes: db.open_tree(NODES)?,
            edges: db.open_tree(EDGES)?,
            version_nodes: db.open_tree(VERSION_NODES)?,
            version_edges: db.open_tree(VERSION_EDGES)?,
            node_keys: db.open_tree(NODE_KEYS)?,
            db,
            write_lock: Mutex::new(()),
        })
    }

    /// Flushes dirty buffers to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock()
    }

    fn next_id(&self) -> Result<u64> {
        // generate_id starts at 0; keep 0 free so ids match the memory store
        Ok(self.db.generate_id()? + 1)
    }

    fn pending_version(&self, id: VersionId) -> Result<GraphVersion> {
        let version: GraphVersion =
            get(&self.versions, &id.0.to_be_bytes())?.ok_or(StoreError::VersionNotFound(id))?;
        if version.is_committed() {
            return Err(StoreError::Immutable(id));
        }
        Ok(version)
    }

    fn member_ids(&self, tree: &Tree, version: VersionId) -> Result<Vec<u64>> {
        let mut ids = Vec::new();
        for entry in tree.scan_prefix(version.0.to_be_bytes()) {
            let (key, _) = entry?;
            ids.push(id_suffix(&key)?);
        }
        Ok(ids)
    }

    fn remove_edge_row(&self, edge: &GraphEdge) -> Result<()> {
        self.edges.remove(edge.id.0.to_be_bytes())?;
        self.version_edges
            .remove(member_key(edge.version_id, edge.id.0))?;
        Ok(())
    }

    fn version_exists(&self, id: VersionId) -> Result<()> {
        if self.versions.contains_key(id.0.to_be_bytes())? {
            Ok(())
        } else {
            Err(StoreError::VersionNotFound(id))
        }
    }
}

impl GraphStore for SledStore {
    fn create_version(&self, new: NewVersion) -> Result<GraphVersion> {
        let _guard = self.lock();

        let taken = self
            .list_versions(&new.project_id)?
            .iter()
            .any(|v| v.version_number == new.version_number);
        if taken {
            return Err(StoreError::VersionConflict {
                project_id: new.project_id,
                version_number: new.version_number,
            });
        }

        let version = GraphVersion {
            id: VersionId(self.next_id()?),
            project_id: new.project_id,
            version_number: new.version_number,
            checksum: String::new(),
            operations_count: 0,
            created_at: Utc::now(),
            state: VersionState::Pending,
        };
        put(&self.versions, &version.id.0.to_be_bytes(), &version)?;
        debug!(
            "Allocated version {} (#{}) for {}",
            version.id, version.version_number, version.project_id
        );
        Ok(version)
    }

    fn commit_version(
        &self,
        id: VersionId,
        checksum: String,
        operations_count: u64,
    ) -> Result<GraphVersion> {
        let _guard = self.lock();
        let mut version = self.pending_version(id)?;

        version.checksum = checksum;
        version.operations_count = operations_count;
        version.state = VersionState::Committed;
        put(&self.versions, &id.0.to_be_bytes(), &version)?;
        self.db.flush()?;
        Ok(version)
    }

    fn discard_version(&self, id: VersionId) -> Result<()> {
        let _guard = self.lock();
        self.pending_version(id)?;

        for node_id in self.member_ids(&self.version_nodes, id)? {
            self.nodes.remove(node_id.to_be_bytes())?;
            self.version_nodes.remove(member_key(id, node_id))?;
        }
        for edge_id in self.member_ids(&self.version_edges, id)? {
            self.edges.remove(edge_id.to_be_bytes())?;
            self.version_edges.remove(member_key(id, edge_id))?;
        }
        let stale_keys: Vec<sled::IVec> = self
            .node_keys
            .scan_prefix(id.0.to_be_bytes())
            .keys()
            .collect::<std::result::Result<_, _>>()?;
        for key in stale_keys {
            self.node_keys.remove(key)?;
        }
        self.versions.remove(id.0.to_be_bytes())?;
        Ok(())
    }

    fn get_version(&self, id: VersionId) -> Result<Option<GraphVersion>> {
        get(&self.versions, &id.0.to_be_bytes())
    }

    fn list_versions(&self, project_id: &ProjectId) -> Result<Vec<GraphVersion>> {
        let mut versions = Vec::new();
        for entry in self.versions.iter() {
            let (_, bytes) = entry?;
            let version: GraphVersion = bincode::deserialize(&bytes)?;
            if &version.project_id == project_id {
                versions.push(version);
            }
        }
        versions.sort_by_key(|v| v.version_number);
        Ok(versions)
    }

    fn insert_nodes(&self, version: VersionId, entities: Vec<CodeEntity>) -> Result<Vec<GraphNode>> {
        let _guard = self.lock();
        let project_id = self.pending_version(version)?.project_id;

        {
            let mut batch = HashSet::new();
            for entity in &entities {
                let existing = self
                    .node_keys
                    .contains_key(node_key_key(version, entity.node_key.as_str()))?;
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
            let id = NodeId(self.next_id()?);
            let node = GraphNode {
                id,
                project_id: project_id.clone(),
                version_id: version,
                entity,
            };
            put(&self.nodes, &id.0.to_be_bytes(), &node)?;
            self.version_nodes.insert(member_key(version, id.0), Vec::<u8>::new())?;
            self.node_keys.insert(
                node_key_key(version, node.key().as_str()),
                id.0.to_be_bytes().to_vec(),
            )?;
            stored.push(node);
        }
        Ok(stored)
    }

    fn get_node(&self, id: NodeId) -> Result<Option<GraphNode>> {
        get(&self.nodes, &id.0.to_be_bytes())
    }

    fn update_node(&self, id: NodeId, entity: CodeEntity) -> Result<GraphNode> {
        let _guard = self.lock();
        let current: GraphNode =
            get(&self.nodes, &id.0.to_be_bytes())?.ok_or(StoreError::NodeNotFound(id))?;
        self.pending_version(current.version_id)?;

        if current.entity.node_key != entity.node_key {
            let new_key = node_key_key(current.version_id, entity.node_key.as_str());
            if self.node_keys.contains_key(&new_key)? {
                return Err(StoreError::DuplicateKey {
                    version: current.version_id,
                    key: entity.node_key,
                });
            }
            self.node_keys
                .remove(node_key_key(current.version_id, current.key().as_str()))?;
            self.node_keys.insert(new_key, id.0.to_be_bytes().to_vec())?;
        }

        let updated = GraphNode { entity, ..current };
        put(&self.nodes, &id.0.to_be_bytes(), &updated)?;
        Ok(updated)
    }

    fn delete_node(&self, id: NodeId) -> Result<()> {
        let _guard = self.lock();
        let node: GraphNode =
            get(&self.nodes, &id.0.to_be_bytes())?.ok_or(StoreError::NodeNotFound(id))?;
        self.pending_version(node.version_id)?;

        for edge_id in self.member_ids(&self.version_edges, node.version_id)? {
            let Some(edge) = get::<GraphEdge>(&self.edges, &edge_id.to_be_bytes())? else {
                continue;
            };
            if edge.source_node_id == id || edge.target_node_id == id {
                self.remove_edge_row(&edge)?;
            }
        }

        self.nodes.remove(id.0.to_be_bytes())?;
        self.version_nodes.remove(member_key(node.version_id, id.0))?;
        self.node_keys
            .remove(node_key_key(node.version_id, node.key().as_str()))?;
        Ok(())
    }

    fn version_nodes(&self, version: VersionId) -> Result<Vec<GraphNode>> {
        self.version_exists(version)?;
        let mut nodes = Vec::new();
        for id in self.member_ids(&self.version_nodes, version)? {
            if let Some(node) = get(&self.nodes, &id.to_be_bytes())? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    fn insert_edges(&self, version: VersionId, edges: Vec<NewEdge>) -> Result<Vec<GraphEdge>> {
        let _guard = self.lock();
        let project_id = self.pending_version(version)?.project_id;

        for edge in &edges {
            let source_ok = self
                .version_nodes
                .contains_key(member_key(version, edge.source_node_id.0))?;
            let target_ok = self
                .version_nodes
                .contains_key(member_key(version, edge.target_node_id.0))?;
            if !source_ok || !target_ok {
                return Err(StoreError::DanglingEdge {
                    version,
                    source_node: edge.source_node_id,
                    target_node: edge.target_node_id,
                });
            }
        }

        let mut stored = Vec::with_capacity(edges.len());
        for edge in edges {
            let id = EdgeId(self.next_id()?);
            let graph_edge = GraphEdge::from_new(id, project_id.clone(), version, edge);
            put(&self.edges, &id.0.to_be_bytes(), &graph_edge)?;
            self.version_edges.insert(member_key(version, id.0), Vec::<u8>::new())?;
            stored.push(graph_edge);
        }
        Ok(stored)
    }

    fn get_edge(&self, id: EdgeId) -> Result<Option<GraphEdge>> {
        get(&self.edges, &id.0.to_be_bytes())
    }

    fn delete_edge(&self, id: EdgeId) -> Result<()> {
        let _guard = self.lock();
        let edge: GraphEdge =
            get(&self.edges, &id.0.to_be_bytes())?.ok_or(StoreError::EdgeNotFound(id))?;
        self.pending_version(edge.version_id)?;
        self.remove_edge_row(&edge)
    }

    fn version_edges(&self, version: VersionId) -> Result<Vec<GraphEdge>> {
        self.version_exists(version)?;
        let mut edges = Vec::new();
        for id in self.member_ids(&self.version_edges, version)? {
            if let Some(edge) = get(&self.edges, &id.to_be_bytes())? {
                edges.push(edge);
            }
        }
        Ok(edges)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Encoding helpers
// ─────────────────────────────────────────────────────────────────────────────

fn get<T: DeserializeOwned>(tree: &Tree, key: &[u8]) -> Result<Option<T>> {
    match tree.get(key)? {
        Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
        None => Ok(None),
    }
}

fn put<T: Serialize>(tree: &Tree, key: &[u8], value: &T) -> Result<()> {
    let bytes = bincode::serialize(value)?;
    tree.insert(key, bytes)?;
    Ok(())
}

fn member_key(version: VersionId, id: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&version.0.to_be_bytes());
    key[8..].copy_from_slice(&id.to_be_bytes());
    key
}

fn node_key_key(version: VersionId, node_key: &str) -> Vec<u8> {
    let mut key = version.0.to_be_bytes().to_vec();
    key.extend_from_slice(node_key.as_bytes());
    key
}

fn id_suffix(key: &[u8]) -> Result<u64> {
    let suffix: [u8; 8] = key
        .get(8..16)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| StoreError::Backend("malformed membership key".into()))?;
    Ok(u64::from_be_bytes(suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::conformance;
    use tempfile::tempdir;

    #[test]
    fn test_version_lifecycle() {
        conformance::version_lifecycle(&SledStore::temporary().unwrap());
    }

    #[test]
    fn test_nodes_and_edges() {
        conformance::nodes_and_edges(&SledStore::temporary().unwrap());
    }

    #[test]
    fn test_committed_versions_are_immutable() {
        conformance::committed_versions_are_immutable(&SledStore::temporary().unwrap());
    }

    #[test]
    fn test_discard_removes_rows() {
        conformance::discard_removes_rows(&SledStore::temporary().unwrap());
    }

    #[test]
    fn test_query_and_statistics() {
        conformance::query_and_statistics(&SledStore::temporary().unwrap());
    }

    #[test]
    fn test_reopen_keeps_committed_versions() {
        let dir = tempdir().unwrap();
        let project = ProjectId::new("demo");

        let node_id = {
            let store = SledStore::open(dir.path()).unwrap();
            let v = store
                .create_version(NewVersion {
                    project_id: project.clone(),
                    version_number: 1,
                })
                .unwrap();
            let nodes = store
                .insert_nodes(v.id, vec![conformance::entity("a.ts", 1, "a")])
                .unwrap();
            store.commit_version(v.id, "sum".into(), 1).unwrap();
            store.flush().unwrap();
            nodes[0].id
        };

        let store = SledStore::open(dir.path()).unwrap();
        let current = store.current_version(&project).unwrap().unwrap();
        assert_eq!(current.checksum, "sum");
        let node = store.get_node(node_id).unwrap().unwrap();
        assert_eq!(node.name(), "a");
        assert_eq!(store.version_nodes(current.id).unwrap().len(), 1);
    }
}
