//! Full builds.
//!
//! Files are read and extracted in parallel. Nodes of every file are then
//! written in one pass, and only once all of them exist are references
//! resolved into edges, so the resulting graph never depends on the order
//! in which files were processed.

use crate::error::{IndexError, Result};
use crate::filter::FileFilter;
use crate::indexer::{checksum, extraction_issue, Indexer, Staging};
use crate::report::{BuildContext, IndexIssue, IndexReport};
use lattice_core::{read_source, Extraction, GraphEdge, GraphNode, GraphVersion, NewEdge};
use lattice_graph::{resolve_references, store, GraphStore, SymbolTable};
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info};

impl<S: GraphStore> Indexer<S> {
    /// Builds a complete version of a project from its source tree.
    ///
    /// Returns `Err` only for invalid requests. Unreadable files and parse
    /// failures are collected in the report; a missing root, a backend
    /// failure or an empty result make the report unsuccessful.
    pub fn build(&self, context: &BuildContext) -> Result<IndexReport> {
        let start = Instant::now();

        if context.project_id.as_str().trim().is_empty() {
            return Err(IndexError::Validation("project id must not be empty".into()));
        }
        let filter = FileFilter::new(
            &context.include_patterns,
            &context.exclude_patterns,
            &context.languages,
        )?;

        let files = match filter.collect(&context.root_path, self.extractor.as_ref()) {
            Ok(files) => files,
            Err(e) => {
                let issue = IndexIssue::general(format!("cannot read root path: {}", e));
                return Ok(IndexReport::failed(issue, Vec::new()).finish(start));
            }
        };
        info!("Building {} from {} files", context.project_id, files.len());

        // Phase 0: read and extract every file, in parallel
        let results: Vec<(&String, lattice_core::Result<Extraction>)> = files
            .par_iter()
            .map(|relative| {
                let result = read_source(&context.root_path.join(relative))
                    .and_then(|source| self.extractor.extract(relative, &source));
                (relative, result)
            })
            .collect();

        let mut errors = Vec::new();
        let mut extractions = Vec::with_capacity(results.len());
        for (path, result) in results {
            match result {
                Ok(extraction) => extractions.push(extraction),
                Err(e) => errors.push(extraction_issue(path, &e)),
            }
        }
        extractions.sort_by(|a, b| a.file_path.cmp(&b.file_path));

        self.locks.with_lock(&context.project_id, || {
            self.write_build(context, &extractions, errors, start)
        })
    }

    fn write_build(
        &self,
        context: &BuildContext,
        extractions: &[Extraction],
        errors: Vec<IndexIssue>,
        start: Instant,
    ) -> Result<IndexReport> {
        let (version, created) = match context.version_id {
            Some(id) => match self.store.get_version(id) {
                Ok(Some(v)) if !v.is_committed() && v.project_id == context.project_id => (v, false),
                Ok(Some(_)) => {
                    return Err(IndexError::Validation(format!(
                        "version {} is not a pending version of project {}",
                        id, context.project_id
                    )))
                }
                Ok(None) => {
                    return Err(IndexError::Validation(format!("version {} does not exist", id)))
                }
                Err(e) => return Ok(IndexReport::failed(IndexIssue::general(e), errors).finish(start)),
            },
            None => match self.allocate_version(&context.project_id) {
                Ok(v) => (v, true),
                Err(e) => return Ok(IndexReport::failed(IndexIssue::general(e), errors).finish(start)),
            },
        };

        let outcome = self.fill_build(&version, extractions).and_then(|(nodes, edges)| {
            if nodes.is_empty() {
                return Ok(None);
            }
            let checksum = checksum(&nodes, &edges);
            let committed =
                self.store
                    .commit_version(version.id, checksum, extractions.len() as u64)?;
            Ok(Some((committed, nodes.len(), edges.len())))
        });

        let failure = match outcome {
            Ok(Some((committed, nodes, edges))) => {
                info!(
                    "Committed version {} of {}: {} nodes, {} edges from {} files",
                    committed.version_number,
                    committed.project_id,
                    nodes,
                    edges,
                    extractions.len()
                );
                return Ok(IndexReport {
                    success: true,
                    nodes_affected: nodes,
                    edges_affected: edges,
                    operations_applied: extractions.len(),
                    execution_time_ms: 0,
                    errors,
                    version_id: Some(committed.id),
                    version_number: Some(committed.version_number),
                }
                .finish(start));
            }
            Ok(None) => IndexIssue::general("no nodes were produced"),
            Err(e) => IndexIssue::general(e),
        };

        if created {
            self.abandon(version.id);
        }
        Ok(IndexReport::failed(failure, errors).finish(start))
    }

    /// Writes nodes, then resolves and writes edges.
    fn fill_build(
        &self,
        version: &GraphVersion,
        extractions: &[Extraction],
    ) -> store::Result<(Vec<GraphNode>, Vec<GraphEdge>)> {
        // Phase 1: nodes
        let mut staging = Staging::new();
        for extraction in extractions {
            staging.stage(extraction, |candidate| {
                self.new_entity(candidate, &extraction.language)
            });
        }
        let nodes = self
            .store
            .insert_nodes(version.id, std::mem::take(&mut staging.entities))?;
        debug!("Inserted {} nodes into version {}", nodes.len(), version.id);

        // Phase 2: edges, against the complete node set
        let ids = staging.ids(&nodes);
        let table = SymbolTable::from_nodes(&nodes);
        let new_edges: Vec<NewEdge> = extractions
            .iter()
            .zip(&ids)
            .flat_map(|(extraction, ids)| resolve_references(&table, extraction, ids))
            .collect();
        let edges = self.store.insert_edges(version.id, new_edges)?;
        debug!("Inserted {} edges into version {}", edges.len(), version.id);

        Ok((nodes, edges))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::testing::{NamingAnnotator, ScriptedExtractor};
    use lattice_core::{EdgeType, NewVersion, NodeKey, NodeType, ProjectId, TreeSitterExtractor};
    use lattice_graph::{MemoryStore, QueryEngine};
    use std::collections::BTreeSet;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn context(root: &Path) -> BuildContext {
        let config = IndexConfig {
            project_id: ProjectId::new("demo"),
            ..Default::default()
        };
        BuildContext::from_config(root, &config)
    }

    fn scripted() -> Indexer<MemoryStore> {
        Indexer::new(Arc::new(MemoryStore::new()), Arc::new(ScriptedExtractor))
    }

    fn keys(store: &MemoryStore, report: &IndexReport) -> BTreeSet<NodeKey> {
        store
            .version_nodes(report.version_id.unwrap())
            .unwrap()
            .into_iter()
            .map(|n| n.key().clone())
            .collect()
    }

    #[test]
    fn test_auth_service_scenario() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "src/auth.ts",
            r#"export class AuthService {
    login(user: string, password: string): boolean {
        if (!user) {
            return false;
        }
        return this.validateCredentials(user, password);
    }

    validateCredentials(user: string, password: string): boolean {
        return user.length > 0 && password.length > 0;
    }
}

export function helper(): void {}
"#,
        );

        let store = Arc::new(MemoryStore::new());
        let indexer = Indexer::new(store.clone(), Arc::new(TreeSitterExtractor::new().unwrap()));
        let report = indexer.build(&context(dir.path())).unwrap();

        assert!(report.success, "{:?}", report.errors);
        assert!(report.errors.is_empty());
        assert_eq!(report.operations_applied, 1);
        assert_eq!(report.version_number, Some(1));

        let nodes = store.version_nodes(report.version_id.unwrap()).unwrap();
        assert!(nodes.len() >= 3);
        assert_eq!(nodes.iter().filter(|n| n.node_type() == NodeType::Class).count(), 1);
        assert!(nodes.iter().filter(|n| n.node_type() == NodeType::Function).count() >= 2);

        let engine = QueryEngine::new(store);
        let login = engine
            .find_nodes_by_name(&ProjectId::new("demo"), "login", Default::default())
            .unwrap();
        let callees = engine.find_callees(login[0].node.id).unwrap();
        assert_eq!(callees.len(), 1);
        assert_eq!(callees[0].name(), "validateCredentials");
    }

    #[test]
    fn test_cross_file_resolution_and_imports() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/main.ts", "import ./util\nfn main\ncall helper\nuse Config\n");
        write(dir.path(), "src/util.ts", "fn helper\nclass Config\n");

        let indexer = scripted();
        let report = indexer.build(&context(dir.path())).unwrap();
        assert!(report.success);
        // 2 modules + main + helper + Config
        assert_eq!(report.nodes_affected, 5);
        // 3 CONTAINS + CALLS + USES + IMPORTS
        assert_eq!(report.edges_affected, 6);

        let store = indexer.store();
        let nodes = store.version_nodes(report.version_id.unwrap()).unwrap();
        let edges = store.version_edges(report.version_id.unwrap()).unwrap();
        let name_of = |id| nodes.iter().find(|n| n.id == id).unwrap().name().to_string();

        let mut typed: Vec<(String, String, EdgeType)> = edges
            .iter()
            .filter(|e| e.edge_type != EdgeType::Contains)
            .map(|e| (name_of(e.source_node_id), name_of(e.target_node_id), e.edge_type))
            .collect();
        typed.sort();
        assert_eq!(
            typed,
            vec![
                ("main".to_string(), "Config".to_string(), EdgeType::Uses),
                ("main".to_string(), "helper".to_string(), EdgeType::Calls),
                ("main".to_string(), "util".to_string(), EdgeType::Imports),
            ]
        );
    }

    #[test]
    fn test_build_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..12 {
            write(
                dir.path(),
                &format!("src/m{}.ts", i),
                &format!("fn f{}\ncall f{}\n", i, (i + 1) % 12),
            );
        }

        let indexer = scripted();
        let first = indexer.build(&context(dir.path())).unwrap();
        let second = indexer.build(&context(dir.path())).unwrap();
        assert_eq!(second.version_number, Some(2));

        let store = indexer.store();
        assert_eq!(keys(store, &first), keys(store, &second));

        let checksum = |r: &IndexReport| {
            store.get_version(r.version_id.unwrap()).unwrap().unwrap().checksum
        };
        assert_eq!(checksum(&first), checksum(&second));
    }

    #[test]
    fn test_extraction_failures_do_not_abort() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.ts", "fn ok\n");
        write(dir.path(), "b.ts", "fn broken\nfail\n");

        let indexer = scripted();
        let report = indexer.build(&context(dir.path())).unwrap();
        assert!(report.success);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].file_path.as_deref(), Some("b.ts"));
        assert_eq!(report.operations_applied, 1);
        assert_eq!(report.nodes_affected, 2);
    }

    #[test]
    fn test_duplicate_keys_keep_first() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.ts", "dup twin\n");

        let indexer = scripted();
        let report = indexer.build(&context(dir.path())).unwrap();
        assert!(report.success);
        assert_eq!(report.nodes_affected, 2);
        assert_eq!(report.edges_affected, 1);
    }

    #[test]
    fn test_empty_build_fails_without_using_a_number() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "notes.md", "nothing to index");

        let indexer = scripted();
        let report = indexer.build(&context(dir.path())).unwrap();
        assert!(!report.success);
        assert!(report.version_id.is_none());

        let project = ProjectId::new("demo");
        assert!(indexer.store().current_version(&project).unwrap().is_none());
        assert_eq!(indexer.store().next_version_number(&project).unwrap(), 1);
    }

    #[test]
    fn test_missing_root_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let report = scripted()
            .build(&context(&dir.path().join("missing")))
            .unwrap();
        assert!(!report.success);
        assert!(report.errors[0].message.contains("root path"));
    }

    #[test]
    fn test_invalid_requests_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let indexer = scripted();

        let mut bad_glob = context(dir.path());
        bad_glob.include_patterns = vec!["src/[".into()];
        assert!(matches!(indexer.build(&bad_glob), Err(IndexError::Glob { .. })));

        let mut no_project = context(dir.path());
        no_project.project_id = ProjectId::new(" ");
        assert!(matches!(indexer.build(&no_project), Err(IndexError::Validation(_))));
    }

    #[test]
    fn test_pre_allocated_version() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.ts", "fn one\n");
        let indexer = scripted();
        let project = ProjectId::new("demo");

        let pending = indexer
            .store()
            .create_version(NewVersion {
                project_id: project.clone(),
                version_number: 1,
            })
            .unwrap();
        let mut ctx = context(dir.path());
        ctx.version_id = Some(pending.id);

        let report = indexer.build(&ctx).unwrap();
        assert!(report.success);
        assert_eq!(report.version_id, Some(pending.id));
        assert!(indexer.store().get_version(pending.id).unwrap().unwrap().is_committed());

        // Committed versions cannot be refilled
        assert!(matches!(indexer.build(&ctx), Err(IndexError::Validation(_))));
    }

    #[test]
    fn test_annotator_sets_purpose() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.ts", "fn login\n");

        let store = Arc::new(MemoryStore::new());
        let indexer = Indexer::new(store.clone(), Arc::new(ScriptedExtractor))
            .with_annotator(Arc::new(NamingAnnotator));
        let report = indexer.build(&context(dir.path())).unwrap();

        let nodes = store.version_nodes(report.version_id.unwrap()).unwrap();
        let login = nodes.iter().find(|n| n.name() == "login").unwrap();
        assert_eq!(login.entity.purpose.as_deref(), Some("purpose of login"));
    }
}
