//! The indexer: turns source trees and file changes into committed versions.
//!
//! Full builds live in `builder.rs`, incremental updates in `updater.rs`.
//! Both write a pending version under the project's lock and either commit
//! it or discard it, so readers only ever see complete versions.

use crate::locks::ProjectLocks;
use crate::report::IndexIssue;
use lattice_core::{
    version_checksum, Annotator, CandidateEntity, CodeEntity, Extraction, Extractor, GraphEdge,
    GraphNode, GraphVersion, NewVersion, NodeId, NodeKey, ProjectId, VersionId,
};
use lattice_graph::{store, GraphStore, StoreError};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;

/// Attempts at allocating a version number before giving up.
pub const MAX_CONFLICT_RETRIES: usize = 3;

/// Builds and updates project graphs in a [`GraphStore`].
pub struct Indexer<S> {
    pub(crate) store: Arc<S>,
    pub(crate) extractor: Arc<dyn Extractor>,
    annotator: Option<Arc<dyn Annotator>>,
    pub(crate) locks: ProjectLocks,
}

impl<S: GraphStore> Indexer<S> {
    pub fn new(store: Arc<S>, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            store,
            extractor,
            annotator: None,
            locks: ProjectLocks::new(),
        }
    }

    /// Consults `annotator` for every new or changed entity.
    pub fn with_annotator(mut self, annotator: Arc<dyn Annotator>) -> Self {
        self.annotator = Some(annotator);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn extractor(&self) -> &dyn Extractor {
        self.extractor.as_ref()
    }

    /// Allocates the next version of a project, retrying number conflicts.
    pub(crate) fn allocate_version(&self, project_id: &ProjectId) -> store::Result<GraphVersion> {
        let mut attempt = 0;
        loop {
            let version_number = self.store.next_version_number(project_id)?;
            match self.store.create_version(NewVersion {
                project_id: project_id.clone(),
                version_number,
            }) {
                Err(StoreError::VersionConflict { .. }) if attempt < MAX_CONFLICT_RETRIES => {
                    attempt += 1;
                    warn!(
                        "Version {} of {} was taken, retrying ({}/{})",
                        version_number, project_id, attempt, MAX_CONFLICT_RETRIES
                    );
                }
                other => return other,
            }
        }
    }

    /// Discards a pending version after a failure. Errors are only logged:
    /// the original failure is what gets reported.
    pub(crate) fn abandon(&self, version: VersionId) {
        if let Err(e) = self.store.discard_version(version) {
            warn!("Failed to discard pending version {}: {}", version, e);
        }
    }

    /// Extracts files in parallel, returning results in input order.
    pub(crate) fn extract_all<'a>(
        &self,
        sources: Vec<(&'a str, &'a str)>,
    ) -> Vec<(&'a str, lattice_core::Result<Extraction>)> {
        sources
            .into_par_iter()
            .map(|(path, source)| (path, self.extractor.extract(path, source)))
            .collect()
    }

    /// The stored form of a new or changed candidate, annotated.
    pub(crate) fn new_entity(&self, candidate: &CandidateEntity, language: &str) -> CodeEntity {
        let mut entity = candidate.to_entity(language);
        if let Some(annotator) = &self.annotator {
            entity.purpose = annotator.describe(&entity, &candidate.source_text);
        }
        entity
    }
}

/// Phase-one staging of candidate entities across files.
///
/// The first candidate with a given key wins; later ones are dropped with a
/// warning. `slots[f][c]` is the position in `entities` of candidate `c` of
/// extraction `f`.
#[derive(Debug, Default)]
pub(crate) struct Staging {
    pub entities: Vec<CodeEntity>,
    slots: Vec<Vec<Option<usize>>>,
    seen: HashSet<NodeKey>,
}

impl Staging {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a key that is not backed by a candidate, such as a
    /// carried-forward node.
    pub fn reserve(&mut self, entity: CodeEntity) {
        if self.seen.insert(entity.node_key.clone()) {
            self.entities.push(entity);
        } else {
            warn!("Dropping duplicate node key {}", entity.node_key);
        }
    }

    /// Stages one extraction, building each entity with `entity_for`.
    pub fn stage(
        &mut self,
        extraction: &Extraction,
        mut entity_for: impl FnMut(&CandidateEntity) -> CodeEntity,
    ) {
        let mut slots = Vec::with_capacity(extraction.entities.len());
        for candidate in &extraction.entities {
            if self.seen.insert(candidate.node_key.clone()) {
                slots.push(Some(self.entities.len()));
                self.entities.push(entity_for(candidate));
            } else {
                warn!("Dropping duplicate node key {}", candidate.node_key);
                slots.push(None);
            }
        }
        self.slots.push(slots);
    }

    /// Storage ids per candidate, given the nodes stored for `entities`
    /// in the same order.
    pub fn ids(&self, stored: &[GraphNode]) -> Vec<Vec<Option<NodeId>>> {
        self.slots
            .iter()
            .map(|file| {
                file.iter()
                    .map(|slot| slot.and_then(|i| stored.get(i)).map(|n| n.id))
                    .collect()
            })
            .collect()
    }
}

/// Identity of an edge independent of storage ids.
pub(crate) type KeyTriple = (NodeKey, NodeKey, lattice_core::EdgeType);

pub(crate) fn key_triples(nodes: &[GraphNode], edges: &[GraphEdge]) -> HashSet<KeyTriple> {
    let keys: HashMap<NodeId, &NodeKey> = nodes.iter().map(|n| (n.id, n.key())).collect();
    edges
        .iter()
        .filter_map(|e| {
            let source = keys.get(&e.source_node_id)?;
            let target = keys.get(&e.target_node_id)?;
            Some(((*source).clone(), (*target).clone(), e.edge_type))
        })
        .collect()
}

/// Checksum of a version's stored rows.
pub(crate) fn checksum(nodes: &[GraphNode], edges: &[GraphEdge]) -> String {
    let keys: HashMap<NodeId, &NodeKey> = nodes.iter().map(|n| (n.id, n.key())).collect();
    version_checksum(
        nodes
            .iter()
            .map(|n| (n.key(), n.entity.content_hash.as_str())),
        edges.iter().filter_map(|e| {
            Some((
                *keys.get(&e.source_node_id)?,
                *keys.get(&e.target_node_id)?,
                e.edge_type,
            ))
        }),
    )
}

/// Records an extraction failure.
pub(crate) fn extraction_issue(path: &str, error: &lattice_core::ExtractError) -> IndexIssue {
    warn!("Extraction failed for {}: {}", path, error);
    IndexIssue::file(path, error)
}
