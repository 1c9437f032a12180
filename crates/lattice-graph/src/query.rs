//! Read-only query engine.
//!
//! Queries run against a [`Snapshot`]: one committed version materialized
//! as a [`CodeGraph`]. Readers take no locks on the store, and a version
//! being written is never visible to them.
//!
//! Node ids are storage handles of one version. An id from another version
//! of the same project is translated through its node key, so callers can
//! keep using ids across updates as long as the entity still exists.

use crate::cycles::Cycle;
use crate::graph::CodeGraph;
use crate::impact::ImpactAnalysis;
use crate::ranking::Bottleneck;
use crate::store::{GraphStore, StoreError};
use lattice_core::fuzzy::{name_similarity, text_similarity};
use lattice_core::{EdgeType, GraphEdge, GraphNode, GraphVersion, NodeId, NodeType, ProjectId, Statistics, VersionId};
use lru::LruCache;
use parking_lot::Mutex;
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.3;
pub const DEFAULT_SEARCH_LIMIT: usize = 20;
pub const DEFAULT_DEPENDENCY_DEPTH: usize = 3;
pub const DEFAULT_PATH_DEPTH: usize = 10;

/// Materialized graphs kept per engine, least recently used evicted first.
pub const DEFAULT_CACHE_CAPACITY: usize = 4;

pub type Result<T> = std::result::Result<T, QueryError>;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("project {0} has no committed version")]
    ProjectNotFound(ProjectId),

    #[error("version {0} not found")]
    VersionNotFound(VersionId),

    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("invalid query: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QueryError {
    /// True for the "does not exist" family, as opposed to bad input or a
    /// backend failure.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::ProjectNotFound(_) | Self::VersionNotFound(_) | Self::NodeNotFound(_) => true,
            Self::Store(e) => e.is_not_found(),
            Self::Validation(_) => false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request and response shapes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameOptions {
    pub fuzzy: bool,
    pub threshold: f64,
}

impl Default for NameOptions {
    fn default() -> Self {
        Self {
            fuzzy: false,
            threshold: DEFAULT_FUZZY_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMatch {
    pub node: GraphNode,
    pub similarity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOptions {
    /// Empty means every type.
    pub node_types: Vec<NodeType>,
    pub limit: usize,
    pub fuzzy_threshold: f64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            node_types: Vec::new(),
            limit: DEFAULT_SEARCH_LIMIT,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchReason {
    #[serde(rename = "name match")]
    NameMatch,
    #[serde(rename = "semantic similarity")]
    SemanticSimilarity,
}

impl MatchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NameMatch => "name match",
            Self::SemanticSimilarity => "semantic similarity",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub node: GraphNode,
    pub score: f64,
    pub match_reason: MatchReason,
}

/// A node reached by [`Snapshot::find_dependencies`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub node: GraphNode,
    pub depth: usize,
    pub via: EdgeType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathResult {
    /// Both endpoints included.
    pub path: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    /// Number of edges.
    pub length: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

/// Entry point for queries over a store.
pub struct QueryEngine<S> {
    store: Arc<S>,
    cache: Mutex<LruCache<VersionId, Arc<CodeGraph>>>,
}

impl<S: GraphStore> QueryEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_cache_capacity(store, DEFAULT_CACHE_CAPACITY)
    }

    /// Engine keeping at most `capacity` materialized versions (at least one).
    pub fn with_cache_capacity(store: Arc<S>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Versions currently materialized, most recently used first.
    pub fn cached_versions(&self) -> Vec<VersionId> {
        self.cache.lock().iter().map(|(id, _)| *id).collect()
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Snapshot of the project's current version.
    pub fn snapshot(&self, project_id: &ProjectId) -> Result<Snapshot<'_, S>> {
        let version = self
            .store
            .current_version(project_id)?
            .ok_or_else(|| QueryError::ProjectNotFound(project_id.clone()))?;
        self.open(version)
    }

    /// Snapshot of a pinned version. Pending versions are not visible.
    pub fn snapshot_at(&self, version_id: VersionId) -> Result<Snapshot<'_, S>> {
        let version = self
            .store
            .get_version(version_id)?
            .filter(GraphVersion::is_committed)
            .ok_or(QueryError::VersionNotFound(version_id))?;
        self.open(version)
    }

    /// Snapshot of the current version of the project a node belongs to.
    pub fn snapshot_for_node(&self, id: NodeId) -> Result<Snapshot<'_, S>> {
        let row = self.store.get_node(id)?.ok_or(QueryError::NodeNotFound(id))?;
        let version = self
            .store
            .current_version(&row.project_id)?
            .ok_or(QueryError::NodeNotFound(id))?;
        self.open(version)
    }

    fn open(&self, version: GraphVersion) -> Result<Snapshot<'_, S>> {
        let graph = self.materialize(version)?;
        Ok(Snapshot {
            store: &*self.store,
            graph,
        })
    }

    fn materialize(&self, version: GraphVersion) -> Result<Arc<CodeGraph>> {
        if let Some(graph) = self.cache.lock().get(&version.id) {
            return Ok(Arc::clone(graph));
        }

        // Loaded outside the lock; a concurrent load of the same version
        // just replaces an equal graph.
        let graph = Arc::new(CodeGraph::load(&*self.store, &version)?);
        debug!("Materialized {} v{}", version.project_id, version.version_number);
        self.cache.lock().put(version.id, Arc::clone(&graph));
        Ok(graph)
    }

    // Project-scoped queries

    pub fn find_nodes_by_name(&self, project_id: &ProjectId, name: &str, options: NameOptions) -> Result<Vec<NodeMatch>> {
        self.snapshot(project_id)?.find_nodes_by_name(name, options)
    }

    pub fn search_nodes(&self, project_id: &ProjectId, query: &str, options: &SearchOptions) -> Result<Vec<SearchHit>> {
        self.snapshot(project_id)?.search_nodes(query, options)
    }

    pub fn find_bottlenecks(&self, project_id: &ProjectId, limit: Option<usize>) -> Result<Vec<Bottleneck>> {
        Ok(self.snapshot(project_id)?.find_bottlenecks(limit))
    }

    pub fn find_circular_dependencies(&self, project_id: &ProjectId) -> Result<Vec<Cycle>> {
        Ok(self.snapshot(project_id)?.find_circular_dependencies())
    }

    pub fn statistics(&self, project_id: &ProjectId) -> Result<Statistics> {
        self.store
            .statistics(project_id)?
            .ok_or_else(|| QueryError::ProjectNotFound(project_id.clone()))
    }

    /// All versions of a project, oldest first.
    pub fn list_versions(&self, project_id: &ProjectId) -> Result<Vec<GraphVersion>> {
        let versions = self.store.list_versions(project_id)?;
        if versions.is_empty() {
            return Err(QueryError::ProjectNotFound(project_id.clone()));
        }
        Ok(versions)
    }

    // Node-scoped queries, answered in the node's current version

    pub fn get_node(&self, id: NodeId) -> Result<GraphNode> {
        self.snapshot_for_node(id)?.get_node(id)
    }

    pub fn find_callers(&self, id: NodeId) -> Result<Vec<GraphNode>> {
        self.snapshot_for_node(id)?.find_callers(id)
    }

    pub fn find_callees(&self, id: NodeId) -> Result<Vec<GraphNode>> {
        self.snapshot_for_node(id)?.find_callees(id)
    }

    pub fn find_dependencies(&self, id: NodeId, max_depth: Option<usize>) -> Result<Vec<Dependency>> {
        self.snapshot_for_node(id)?.find_dependencies(id, max_depth)
    }

    pub fn find_path(&self, from: NodeId, to: NodeId, max_depth: Option<usize>) -> Result<Option<PathResult>> {
        self.snapshot_for_node(from)?.find_path(from, to, max_depth)
    }

    pub fn analyze_impact(&self, id: NodeId) -> Result<ImpactAnalysis> {
        self.snapshot_for_node(id)?.analyze_impact(id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Queries over one committed version.
pub struct Snapshot<'a, S> {
    store: &'a S,
    graph: Arc<CodeGraph>,
}

impl<'a, S: GraphStore> Snapshot<'a, S> {
    pub fn version(&self) -> &GraphVersion {
        self.graph.version()
    }

    pub fn graph(&self) -> &CodeGraph {
        &self.graph
    }

    /// Maps a node id, possibly from another version, into this snapshot.
    pub fn resolve(&self, id: NodeId) -> Result<NodeIndex> {
        if let Some(index) = self.graph.index_of(id) {
            return Ok(index);
        }

        let row = self.store.get_node(id)?.ok_or(QueryError::NodeNotFound(id))?;
        if row.project_id != self.version().project_id {
            return Err(QueryError::NodeNotFound(id));
        }
        self.graph
            .index_of_key(row.key())
            .ok_or(QueryError::NodeNotFound(id))
    }

    pub fn get_node(&self, id: NodeId) -> Result<GraphNode> {
        let index = self.resolve(id)?;
        Ok(self.graph.node(index).clone())
    }

    /// Exact matches score 1.0. With `fuzzy`, every named node scoring at
    /// least the threshold is returned, best first, ties by key.
    pub fn find_nodes_by_name(&self, name: &str, options: NameOptions) -> Result<Vec<NodeMatch>> {
        let name = name.trim();
        require_text(name, "name")?;
        require_threshold(options.threshold)?;

        if !options.fuzzy {
            return Ok(self
                .graph
                .find_by_name(name)
                .into_iter()
                .map(|i| NodeMatch {
                    node: self.graph.node(i).clone(),
                    similarity: 1.0,
                })
                .collect());
        }

        let mut scored = self.name_scores(name, options.threshold);
        self.rank(&mut scored);
        debug!("Name query '{}' matched {} nodes", name, scored.len());

        Ok(scored
            .into_iter()
            .map(|(i, similarity)| NodeMatch {
                node: self.graph.node(i).clone(),
                similarity,
            })
            .collect())
    }

    /// Fuzzy name matches united with purpose-text matches.
    ///
    /// Each node is reported once with its better score. On equal scores the
    /// name match is kept.
    pub fn search_nodes(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchHit>> {
        let query = query.trim();
        require_text(query, "query")?;
        require_threshold(options.fuzzy_threshold)?;

        let mut best: HashMap<NodeIndex, (f64, MatchReason)> = HashMap::new();

        for (index, score) in self.name_scores(query, options.fuzzy_threshold) {
            best.insert(index, (score, MatchReason::NameMatch));
        }

        for index in self.graph.purpose_candidates(query) {
            let Some(purpose) = self.graph.node(index).entity.purpose.as_deref() else {
                continue;
            };
            let score = text_similarity(query, purpose);
            if score <= 0.0 || score < options.fuzzy_threshold {
                continue;
            }
            let entry = best.entry(index).or_insert((score, MatchReason::SemanticSimilarity));
            if score > entry.0 {
                *entry = (score, MatchReason::SemanticSimilarity);
            }
        }

        let mut hits: Vec<(NodeIndex, f64, MatchReason)> = best
            .into_iter()
            .filter(|(i, _)| {
                options.node_types.is_empty()
                    || options.node_types.contains(&self.graph.node(*i).node_type())
            })
            .map(|(i, (score, reason))| (i, score, reason))
            .collect();

        hits.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| self.graph.node(a.0).key().cmp(self.graph.node(b.0).key()))
        });
        hits.truncate(options.limit);
        debug!("Search '{}' returned {} hits", query, hits.len());

        Ok(hits
            .into_iter()
            .map(|(i, score, match_reason)| SearchHit {
                node: self.graph.node(i).clone(),
                score,
                match_reason,
            })
            .collect())
    }

    pub fn find_callers(&self, id: NodeId) -> Result<Vec<GraphNode>> {
        let index = self.resolve(id)?;
        Ok(self.nodes(self.graph.callers(index)))
    }

    pub fn find_callees(&self, id: NodeId) -> Result<Vec<GraphNode>> {
        let index = self.resolve(id)?;
        Ok(self.nodes(self.graph.callees(index)))
    }

    pub fn find_dependencies(&self, id: NodeId, max_depth: Option<usize>) -> Result<Vec<Dependency>> {
        let index = self.resolve(id)?;
        let max_depth = max_depth.unwrap_or(DEFAULT_DEPENDENCY_DEPTH);

        Ok(self
            .graph
            .dependencies(index, max_depth)
            .into_iter()
            .map(|r| Dependency {
                node: self.graph.node(r.index).clone(),
                depth: r.depth,
                via: r.via,
            })
            .collect())
    }

    /// `Ok(None)` means no path within the bound; unknown endpoints are
    /// `NodeNotFound`.
    pub fn find_path(&self, from: NodeId, to: NodeId, max_depth: Option<usize>) -> Result<Option<PathResult>> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        let max_depth = max_depth.unwrap_or(DEFAULT_PATH_DEPTH);

        Ok(self
            .graph
            .shortest_path(source, target, max_depth)
            .map(|route| PathResult {
                length: route.edges.len(),
                path: self.nodes(route.nodes),
                edges: route.edges.into_iter().cloned().collect(),
            }))
    }

    pub fn analyze_impact(&self, id: NodeId) -> Result<ImpactAnalysis> {
        let index = self.resolve(id)?;
        Ok(self.graph.analyze_impact(index))
    }

    pub fn find_bottlenecks(&self, limit: Option<usize>) -> Vec<Bottleneck> {
        self.graph.bottlenecks(limit)
    }

    pub fn find_circular_dependencies(&self) -> Vec<Cycle> {
        self.graph.find_cycles()
    }

    fn name_scores(&self, query: &str, threshold: f64) -> Vec<(NodeIndex, f64)> {
        self.graph
            .graph
            .node_indices()
            .filter_map(|i| {
                let name = self.graph.node(i).entity.name.as_deref()?;
                let score = name_similarity(query, name);
                (score > 0.0 && score >= threshold).then_some((i, score))
            })
            .collect()
    }

    fn rank(&self, scored: &mut [(NodeIndex, f64)]) {
        scored.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| self.graph.node(a.0).key().cmp(self.graph.node(b.0).key()))
        });
    }

    fn nodes(&self, indexes: Vec<NodeIndex>) -> Vec<GraphNode> {
        indexes
            .into_iter()
            .map(|i| self.graph.node(i).clone())
            .collect()
    }
}

fn require_text(value: &str, field: &str) -> Result<()> {
    if value.is_empty() {
        return Err(QueryError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn require_threshold(threshold: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(QueryError::Validation(format!(
            "threshold must be between 0 and 1, got {}",
            threshold
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::store::conformance::entity;
    use lattice_core::{CodeEntity, NewEdge, NewVersion};

    fn project() -> ProjectId {
        ProjectId::new("demo")
    }

    /// Commits one version and returns it with its nodes.
    fn commit(
        store: &MemoryStore,
        number: u64,
        entities: Vec<CodeEntity>,
        calls: &[(&str, &str)],
    ) -> (GraphVersion, Vec<GraphNode>) {
        let version = store
            .create_version(NewVersion {
                project_id: project(),
                version_number: number,
            })
            .unwrap();
        let nodes = store.insert_nodes(version.id, entities).unwrap();

        let id = |name: &str| nodes.iter().find(|n| n.name() == name).unwrap().id;
        let edges: Vec<NewEdge> = calls
            .iter()
            .map(|(from, to)| NewEdge::new(id(from), id(to), EdgeType::Calls))
            .collect();
        store.insert_edges(version.id, edges).unwrap();

        let version = store.commit_version(version.id, String::new(), 0).unwrap();
        (version, nodes)
    }

    fn id_of(nodes: &[GraphNode], name: &str) -> NodeId {
        nodes.iter().find(|n| n.name() == name).unwrap().id
    }

    fn names(nodes: &[GraphNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.name()).collect()
    }

    fn auth_entities(with_helper: bool) -> Vec<CodeEntity> {
        let mut entities = vec![
            entity("src/auth.ts", 3, "login"),
            entity("src/auth.ts", 9, "validateCredentials"),
        ];
        if with_helper {
            entities.push(entity("src/util.ts", 1, "helper"));
        }
        entities
    }

    #[test]
    fn test_exact_and_fuzzy_names() {
        let store = Arc::new(MemoryStore::new());
        commit(
            &store,
            1,
            vec![
                entity("a.ts", 1, "testFunction0"),
                entity("a.ts", 5, "testFunction1"),
                entity("b.ts", 1, "render"),
            ],
            &[],
        );
        let engine = QueryEngine::new(store);

        let exact = engine
            .find_nodes_by_name(&project(), "testFunction0", NameOptions::default())
            .unwrap();
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].similarity, 1.0);

        // Non-fuzzy lookups do not match partial names
        let none = engine
            .find_nodes_by_name(&project(), "testFunc", NameOptions::default())
            .unwrap();
        assert!(none.is_empty());

        let fuzzy = engine
            .find_nodes_by_name(
                &project(),
                "testFunc",
                NameOptions {
                    fuzzy: true,
                    threshold: 0.3,
                },
            )
            .unwrap();
        assert!(fuzzy.len() >= 2);
        assert_eq!(fuzzy[0].node.name(), "testFunction0");
        assert_eq!(fuzzy[1].node.name(), "testFunction1");
        assert!(fuzzy[0].similarity > 0.3);
        assert!(fuzzy.iter().all(|m| m.similarity >= 0.3));
    }

    #[test]
    fn test_validation_and_not_found() {
        let store = Arc::new(MemoryStore::new());
        commit(&store, 1, auth_entities(false), &[]);
        let engine = QueryEngine::new(store);

        let bad_threshold = engine.find_nodes_by_name(
            &project(),
            "login",
            NameOptions {
                fuzzy: true,
                threshold: 1.5,
            },
        );
        assert!(matches!(bad_threshold, Err(QueryError::Validation(_))));

        let empty = engine.search_nodes(&project(), "  ", &SearchOptions::default());
        assert!(matches!(empty, Err(QueryError::Validation(_))));

        let missing = engine
            .find_nodes_by_name(&ProjectId::new("nope"), "login", NameOptions::default())
            .unwrap_err();
        assert!(matches!(missing, QueryError::ProjectNotFound(_)));
        assert!(missing.is_not_found());

        let unknown = engine.get_node(NodeId(9999)).unwrap_err();
        assert!(matches!(unknown, QueryError::NodeNotFound(_)));
        assert!(engine.statistics(&ProjectId::new("nope")).unwrap_err().is_not_found());
    }

    #[test]
    fn test_identifier_query_matches_purpose_words() {
        let mut sign_in = entity("src/auth.ts", 1, "handleSignIn");
        sign_in.purpose = Some("Handles user login for the app".to_string());

        let store = Arc::new(MemoryStore::new());
        commit(&store, 1, vec![sign_in, entity("src/ui.ts", 1, "render")], &[]);
        let engine = QueryEngine::new(store);

        let hits = engine
            .search_nodes(&project(), "userLogin", &SearchOptions::default())
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node.name(), "handleSignIn");
        assert_eq!(hits[0].match_reason, MatchReason::SemanticSimilarity);
        assert!((hits[0].score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_search_merges_name_and_purpose() {
        let mut check = entity("src/auth.ts", 1, "checkPassword");
        check.purpose = Some("Validates user credentials against the store".to_string());
        let mut cache = entity("src/cache.ts", 1, "credentialsCache");
        cache.node_type = NodeType::Variable;

        let store = Arc::new(MemoryStore::new());
        commit(&store, 1, vec![check, cache, entity("src/ui.ts", 1, "render")], &[]);
        let engine = QueryEngine::new(store);

        let hits = engine
            .search_nodes(&project(), "credentials", &SearchOptions::default())
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].node.name(), "checkPassword");
        assert_eq!(hits[0].match_reason, MatchReason::SemanticSimilarity);
        assert!((hits[0].score - 0.9).abs() < 1e-9);
        assert_eq!(hits[1].node.name(), "credentialsCache");
        assert_eq!(hits[1].match_reason, MatchReason::NameMatch);

        let only_variables = engine
            .search_nodes(
                &project(),
                "credentials",
                &SearchOptions {
                    node_types: vec![NodeType::Variable],
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(only_variables.len(), 1);
        assert_eq!(only_variables[0].node.name(), "credentialsCache");

        let limited = engine
            .search_nodes(
                &project(),
                "credentials",
                &SearchOptions {
                    limit: 1,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(limited.len(), 1);

        // Zero hits is a result, not an error
        let nothing = engine
            .search_nodes(&project(), "zzzzzzzz", &SearchOptions::default())
            .unwrap();
        assert!(nothing.is_empty());
    }

    #[test]
    fn test_ids_translate_across_versions() {
        let store = Arc::new(MemoryStore::new());
        let calls = [("helper", "login"), ("login", "validateCredentials")];
        let (v1, old) = commit(&store, 1, auth_entities(true), &calls);
        let (v2, _) = commit(&store, 2, auth_entities(false), &[("login", "validateCredentials")]);
        let engine = QueryEngine::new(store);

        let login = id_of(&old, "login");

        // Answered in the current version through the node key
        let callees = engine.find_callees(login).unwrap();
        assert_eq!(names(&callees), vec!["validateCredentials"]);
        assert_eq!(callees[0].version_id, v2.id);
        assert!(engine.find_callers(login).unwrap().is_empty());
        assert_eq!(engine.get_node(login).unwrap().version_id, v2.id);

        // The removed node is gone from the current version
        let helper = id_of(&old, "helper");
        assert!(matches!(engine.get_node(helper), Err(QueryError::NodeNotFound(_))));

        // But still visible when the old version is pinned
        let pinned = engine.snapshot_at(v1.id).unwrap();
        assert_eq!(names(&pinned.find_callers(login).unwrap()), vec!["helper"]);

        let path = pinned
            .find_path(helper, id_of(&old, "validateCredentials"), None)
            .unwrap()
            .unwrap();
        assert_eq!(path.length, 2);
        assert_eq!(names(&path.path), vec!["helper", "login", "validateCredentials"]);
        assert!(pinned
            .find_path(helper, id_of(&old, "validateCredentials"), Some(1))
            .unwrap()
            .is_none());

        let deps = pinned.find_dependencies(helper, None).unwrap();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[1].depth, 2);
        assert_eq!(deps[1].via, EdgeType::Calls);
    }

    #[test]
    fn test_pending_versions_are_invisible() {
        let store = Arc::new(MemoryStore::new());
        let (v1, _) = commit(&store, 1, auth_entities(false), &[]);
        let pending = store
            .create_version(NewVersion {
                project_id: project(),
                version_number: 2,
            })
            .unwrap();
        store
            .insert_nodes(pending.id, vec![entity("src/new.ts", 1, "fresh")])
            .unwrap();
        let engine = QueryEngine::new(Arc::clone(&store));

        assert_eq!(engine.snapshot(&project()).unwrap().version().id, v1.id);
        assert!(matches!(
            engine.snapshot_at(pending.id),
            Err(QueryError::VersionNotFound(_))
        ));
        let found = engine
            .find_nodes_by_name(&project(), "fresh", NameOptions::default())
            .unwrap();
        assert!(found.is_empty());

        assert_eq!(engine.list_versions(&project()).unwrap().len(), 2);
        assert_eq!(engine.statistics(&project()).unwrap().version_number, 1);
    }

    #[test]
    fn test_snapshots_share_materialized_graph() {
        let store = Arc::new(MemoryStore::new());
        commit(&store, 1, auth_entities(true), &[("helper", "login")]);
        let engine = QueryEngine::new(store);

        let a = engine.snapshot(&project()).unwrap();
        let b = engine.snapshot(&project()).unwrap();
        assert!(Arc::ptr_eq(&a.graph, &b.graph));

        let impact = engine
            .analyze_impact(a.find_nodes_by_name("login", NameOptions::default()).unwrap()[0].node.id)
            .unwrap();
        assert_eq!(impact.directly_affected.len(), 1);
        assert!(impact.affected_files.contains(&"src/auth.ts".to_string()));

        assert!(engine.find_circular_dependencies(&project()).unwrap().is_empty());
        assert_eq!(engine.find_bottlenecks(&project(), Some(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_cache_evicts_least_recently_used_version() {
        let store = Arc::new(MemoryStore::new());
        let (v1, _) = commit(&store, 1, auth_entities(false), &[]);
        let (v2, _) = commit(&store, 2, auth_entities(false), &[]);
        let (v3, _) = commit(&store, 3, auth_entities(true), &[]);
        let engine = QueryEngine::with_cache_capacity(store, 2);

        let current = engine.snapshot(&project()).unwrap();
        engine.snapshot_at(v1.id).unwrap();
        let again = engine.snapshot(&project()).unwrap();
        assert!(Arc::ptr_eq(&current.graph, &again.graph));

        // The pinned old version goes first, not the current one
        engine.snapshot_at(v2.id).unwrap();
        assert_eq!(engine.cached_versions(), vec![v2.id, v3.id]);

        let kept = engine.snapshot(&project()).unwrap();
        assert!(Arc::ptr_eq(&current.graph, &kept.graph));
        assert_eq!(engine.cached_versions(), vec![v3.id, v2.id]);
    }
}
