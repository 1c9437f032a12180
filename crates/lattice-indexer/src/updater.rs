//! Incremental updates.
//!
//! A change list becomes a new version derived from a base version. Files
//! the changes do not touch are carried forward as they are; entities of
//! changed files whose content hash did not move are carried forward too.
//! Only new or edited entities are annotated.

use crate::error::{IndexError, Result};
use crate::indexer::{checksum, extraction_issue, key_triples, Indexer, Staging};
use crate::report::{ChangeType, FileChange, IndexIssue, IndexReport, UpdateContext};
use lattice_core::{
    content_hash, CodeEntity, EdgeType, Extraction, GraphEdge, GraphNode, GraphVersion, NewEdge,
    NodeId, NodeKey, NodeType, ProjectId,
};
use lattice_graph::{resolve_references, store, GraphStore, SymbolTable};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, info};

/// The rows a new version is derived from.
#[derive(Debug, Default)]
struct Base {
    version: Option<GraphVersion>,
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
}

/// What a write produced, before it is counted against the base.
struct Written {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
}

impl<S: GraphStore> Indexer<S> {
    /// Applies file changes on top of a base version, committing a new one.
    ///
    /// Returns `Err` only for invalid requests, before anything is written.
    /// A file that fails to extract keeps its previous nodes and is listed
    /// in the report's errors.
    pub fn update(
        &self,
        project_id: &ProjectId,
        changes: &[FileChange],
        context: &UpdateContext,
    ) -> Result<IndexReport> {
        let start = Instant::now();
        validate(project_id, changes)?;

        let effective = last_change_per_file(changes);
        let sources: Vec<(&str, &str)> = effective
            .iter()
            .filter(|c| c.change_type != ChangeType::Deleted)
            .filter_map(|c| Some((c.file_path.as_str(), c.new_content.as_deref()?)))
            .collect();

        let mut errors = Vec::new();
        let mut extracted: HashMap<&str, Extraction> = HashMap::new();
        for (path, result) in self.extract_all(sources) {
            match result {
                Ok(extraction) => {
                    extracted.insert(path, extraction);
                }
                Err(e) => errors.push(extraction_issue(path, &e)),
            }
        }

        // Changes that will take effect, in request order
        let mut applied: Vec<&FileChange> = Vec::new();
        let mut extractions: Vec<Extraction> = Vec::new();
        for change in effective {
            match change.change_type {
                ChangeType::Deleted => applied.push(change),
                ChangeType::Added | ChangeType::Modified => {
                    if let Some(extraction) = extracted.remove(change.file_path.as_str()) {
                        applied.push(change);
                        extractions.push(extraction);
                    }
                }
            }
        }

        self.locks.with_lock(project_id, || {
            self.write_update(project_id, &applied, &extractions, errors, context, start)
        })
    }

    fn write_update(
        &self,
        project_id: &ProjectId,
        applied: &[&FileChange],
        extractions: &[Extraction],
        errors: Vec<IndexIssue>,
        context: &UpdateContext,
        start: Instant,
    ) -> Result<IndexReport> {
        let base = match self.load_base(project_id, context) {
            Ok(base) => base?,
            Err(e) => return Ok(IndexReport::failed(IndexIssue::general(e), errors).finish(start)),
        };

        let version = match self.allocate_version(project_id) {
            Ok(version) => version,
            Err(e) => return Ok(IndexReport::failed(IndexIssue::general(e), errors).finish(start)),
        };

        let touched: HashSet<&str> = applied.iter().map(|c| c.file_path.as_str()).collect();
        let outcome = self
            .fill_update(&version, &base, &touched, extractions)
            .and_then(|written| {
                let checksum = checksum(&written.nodes, &written.edges);
                let committed =
                    self.store
                        .commit_version(version.id, checksum, applied.len() as u64)?;
                Ok((committed, written))
            });

        let (committed, written) = match outcome {
            Ok(done) => done,
            Err(e) => {
                self.abandon(version.id);
                return Ok(IndexReport::failed(IndexIssue::general(e), errors).finish(start));
            }
        };

        let nodes_affected = count_node_changes(&base.nodes, &written.nodes);
        let edges_affected = key_triples(&base.nodes, &base.edges)
            .symmetric_difference(&key_triples(&written.nodes, &written.edges))
            .count();

        info!(
            "Committed version {} of {}: {} changes, {} nodes and {} edges affected",
            committed.version_number,
            project_id,
            applied.len(),
            nodes_affected,
            edges_affected
        );

        Ok(IndexReport {
            success: true,
            nodes_affected,
            edges_affected,
            operations_applied: applied.len(),
            execution_time_ms: 0,
            errors,
            version_id: Some(committed.id),
            version_number: Some(committed.version_number),
        }
        .finish(start))
    }

    /// The pinned or current version with its rows. The outer result is
    /// the backend, the inner one the request.
    fn load_base(&self, project_id: &ProjectId, context: &UpdateContext) -> store::Result<Result<Base>> {
        let version = match context.base_version {
            Some(id) => match self.store.get_version(id)? {
                Some(v) if v.is_committed() && &v.project_id == project_id => Some(v),
                _ => {
                    return Ok(Err(IndexError::Validation(format!(
                        "base version {} is not a committed version of project {}",
                        id, project_id
                    ))))
                }
            },
            None => self.store.current_version(project_id)?,
        };

        let Some(version) = version else {
            debug!("Project {} has no committed version, starting empty", project_id);
            return Ok(Ok(Base::default()));
        };

        Ok(Ok(Base {
            nodes: self.store.version_nodes(version.id)?,
            edges: self.store.version_edges(version.id)?,
            version: Some(version),
        }))
    }

    fn fill_update(
        &self,
        version: &GraphVersion,
        base: &Base,
        touched: &HashSet<&str>,
        extractions: &[Extraction],
    ) -> store::Result<Written> {
        let base_by_key: HashMap<&NodeKey, &GraphNode> =
            base.nodes.iter().map(|n| (n.key(), n)).collect();

        // Phase 1: carried nodes, then the changed files' nodes
        let mut staging = Staging::new();
        for node in &base.nodes {
            if !touched.contains(node.file_path()) {
                staging.reserve(node.entity.clone());
            }
        }
        for extraction in extractions {
            staging.stage(extraction, |candidate| {
                match base_by_key.get(&candidate.node_key) {
                    Some(old) if old.entity.content_hash == content_hash(&candidate.source_text) => {
                        // Same span text; only its position may have moved
                        CodeEntity {
                            location: candidate.location.clone(),
                            ..old.entity.clone()
                        }
                    }
                    _ => self.new_entity(candidate, &extraction.language),
                }
            });
        }
        let nodes = self
            .store
            .insert_nodes(version.id, std::mem::take(&mut staging.entities))?;

        // Phase 2: edges
        let new_ids: HashMap<&NodeKey, NodeId> = nodes.iter().map(|n| (n.key(), n.id)).collect();
        let table = SymbolTable::from_nodes(&nodes);
        let mut merged: BTreeMap<(NodeId, NodeId, EdgeType), NewEdge> = BTreeMap::new();

        let base_by_id: HashMap<NodeId, &GraphNode> = base.nodes.iter().map(|n| (n.id, n)).collect();
        for edge in &base.edges {
            let (Some(source), Some(target)) = (
                base_by_id.get(&edge.source_node_id),
                base_by_id.get(&edge.target_node_id),
            ) else {
                continue;
            };
            // Edges of changed files are recomputed below
            if touched.contains(source.file_path()) {
                continue;
            }
            let Some(&new_source) = new_ids.get(source.key()) else {
                continue;
            };
            let new_target = new_ids
                .get(target.key())
                .copied()
                .or_else(|| relink(&table, target));
            let Some(new_target) = new_target else {
                debug!("Dropping edge {} -> {}: target is gone", source.key(), target.key());
                continue;
            };
            if new_source == new_target {
                continue;
            }

            merged
                .entry((new_source, new_target, edge.edge_type))
                .or_insert_with(|| NewEdge {
                    source_node_id: new_source,
                    target_node_id: new_target,
                    edge_type: edge.edge_type,
                    weight: edge.weight,
                    call_type: edge.call_type.clone(),
                });
        }

        let ids = staging.ids(&nodes);
        for (extraction, ids) in extractions.iter().zip(&ids) {
            for edge in resolve_references(&table, extraction, ids) {
                merged
                    .entry((edge.source_node_id, edge.target_node_id, edge.edge_type))
                    .or_insert(edge);
            }
        }

        let edges = self
            .store
            .insert_edges(version.id, merged.into_values().collect())?;
        debug!(
            "Version {} derived from {:?}: {} nodes, {} edges",
            version.id,
            base.version.as_ref().map(|v| v.id),
            nodes.len(),
            edges.len()
        );

        Ok(Written { nodes, edges })
    }
}

/// Re-resolves a vanished edge target by its name, preferring its file.
fn relink(table: &SymbolTable, old_target: &GraphNode) -> Option<NodeId> {
    if old_target.node_type() == NodeType::Module {
        return None;
    }
    let name = old_target.entity.name.as_deref()?;
    table.resolve_name(name, old_target.file_path())
}

fn validate(project_id: &ProjectId, changes: &[FileChange]) -> Result<()> {
    if project_id.as_str().trim().is_empty() {
        return Err(IndexError::Validation("project id must not be empty".into()));
    }
    for change in changes {
        if change.file_path.trim().is_empty() {
            return Err(IndexError::Validation("change with an empty file path".into()));
        }
        if change.change_type != ChangeType::Deleted && change.new_content.is_none() {
            return Err(IndexError::Validation(format!(
                "{} change to {} has no new content",
                change.change_type, change.file_path
            )));
        }
    }
    Ok(())
}

/// Keeps only the last change of each file, in the order they were given.
fn last_change_per_file(changes: &[FileChange]) -> Vec<&FileChange> {
    let mut last: HashMap<&str, usize> = HashMap::new();
    for (i, change) in changes.iter().enumerate() {
        last.insert(change.file_path.as_str(), i);
    }
    changes
        .iter()
        .enumerate()
        .filter(|(i, c)| last.get(c.file_path.as_str()) == Some(i))
        .map(|(_, c)| c)
        .collect()
}

/// Keys added, removed or with a different content hash.
fn count_node_changes(before: &[GraphNode], after: &[GraphNode]) -> usize {
    let old: HashMap<&NodeKey, &str> = before
        .iter()
        .map(|n| (n.key(), n.entity.content_hash.as_str()))
        .collect();
    let new: HashMap<&NodeKey, &str> = after
        .iter()
        .map(|n| (n.key(), n.entity.content_hash.as_str()))
        .collect();

    let changed_or_added = new
        .iter()
        .filter(|(key, hash)| old.get(*key) != Some(*hash))
        .count();
    let removed = old.keys().filter(|key| !new.contains_key(*key)).count();
    changed_or_added + removed
}
