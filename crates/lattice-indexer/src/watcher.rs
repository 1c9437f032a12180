//! Watches a project root and applies debounced file changes as updates.

use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::filter::{relative_path, FileFilter};
use crate::indexer::Indexer;
use crate::report::{FileChange, IndexReport, UpdateContext};
use lattice_core::{read_source, ProjectId};
use lattice_graph::GraphStore;
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Turns file system events under a root into incremental updates of one
/// project.
pub struct ProjectWatcher<S> {
    indexer: Arc<Indexer<S>>,
    root: PathBuf,
    project_id: ProjectId,
    filter: FileFilter,
    debounce: Duration,
}

impl<S: GraphStore + 'static> ProjectWatcher<S> {
    pub fn new(indexer: Arc<Indexer<S>>, root: &Path, config: &IndexConfig) -> Result<Self> {
        let filter = FileFilter::new(&config.include, &config.exclude, &config.languages)?;
        let root = root.canonicalize().map_err(|e| IndexError::io(root, e))?;
        Ok(Self {
            indexer,
            root,
            project_id: config.project_id.clone(),
            filter,
            debounce: Duration::from_millis(config.debounce_ms),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Watches until the event stream ends, calling `on_report` after each
    /// applied batch. Runs forever unless the caller drops the future.
    pub async fn run(&self, mut on_report: impl FnMut(&IndexReport)) -> Result<()> {
        let (tx, mut rx) = mpsc::channel::<DebounceEventResult>(64);
        let mut debouncer = new_debouncer(self.debounce, move |result: DebounceEventResult| {
            let _ = tx.blocking_send(result);
        })?;
        debouncer
            .watcher()
            .watch(&self.root, RecursiveMode::Recursive)?;
        info!("Watching {} for {}", self.root.display(), self.project_id);

        while let Some(result) = rx.recv().await {
            let events = match result {
                Ok(events) => events,
                Err(e) => {
                    warn!("Watch error: {}", e);
                    continue;
                }
            };
            let paths: Vec<PathBuf> = events.into_iter().map(|e| e.path).collect();

            let changes = match self.changes_for_paths(&paths) {
                Ok(changes) => changes,
                Err(e) => {
                    warn!("Skipping {} events: {}", paths.len(), e);
                    continue;
                }
            };
            if changes.is_empty() {
                continue;
            }
            debug!("Applying {} changes", changes.len());

            let indexer = Arc::clone(&self.indexer);
            let project_id = self.project_id.clone();
            let applied = tokio::task::spawn_blocking(move || {
                indexer.update(&project_id, &changes, &UpdateContext::default())
            })
            .await;

            match applied {
                Ok(Ok(report)) => on_report(&report),
                Ok(Err(e)) => warn!("Update rejected: {}", e),
                Err(e) => warn!("Update task failed: {}", e),
            }
        }

        Ok(())
    }

    /// The change list for a batch of event paths.
    ///
    /// Paths outside the filter are ignored. An existing file is `added`
    /// unless the current version already has it; a vanished path deletes
    /// the file, or every file under it if it was a directory.
    pub fn changes_for_paths(&self, paths: &[PathBuf]) -> Result<Vec<FileChange>> {
        let known = self.known_files()?;
        let mut changes: BTreeMap<String, FileChange> = BTreeMap::new();

        for path in paths {
            let Some(relative) = relative_path(&self.root, path) else {
                continue;
            };

            if path.is_file() {
                let language = self.indexer.extractor().language_of(path);
                if !self.filter.matches(&relative, language) {
                    continue;
                }
                let content = match read_source(path) {
                    Ok(content) => content,
                    Err(e) => {
                        warn!("Skipping {}: {}", relative, e);
                        continue;
                    }
                };
                let change = if known.contains(&relative) {
                    FileChange::modified(relative.clone(), content)
                } else {
                    FileChange::added(relative.clone(), content)
                };
                changes.insert(relative, change);
            } else if !path.exists() {
                let prefix = format!("{}/", relative);
                for file in known
                    .iter()
                    .filter(|f| **f == relative || f.starts_with(&prefix))
                {
                    changes.insert(file.clone(), FileChange::deleted(file.clone()));
                }
            }
        }

        Ok(changes.into_values().collect())
    }

    /// Files of the current version.
    fn known_files(&self) -> Result<HashSet<String>> {
        let store = self.indexer.store();
        let Some(version) = store.current_version(&self.project_id)? else {
            return Ok(HashSet::new());
        };
        Ok(store
            .version_nodes(version.id)?
            .into_iter()
            .map(|n| n.entity.location.file_path)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{BuildContext, ChangeType};
    use crate::testing::ScriptedExtractor;
    use lattice_graph::MemoryStore;
    use std::fs;

    fn setup(files: &[(&str, &str)]) -> (tempfile::TempDir, ProjectWatcher<MemoryStore>) {
        let dir = tempfile::tempdir().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }

        let indexer = Arc::new(Indexer::new(
            Arc::new(MemoryStore::new()),
            Arc::new(ScriptedExtractor),
        ));
        let config = IndexConfig {
            project_id: ProjectId::new("demo"),
            ..Default::default()
        };
        let report = indexer
            .build(&BuildContext::from_config(dir.path(), &config))
            .unwrap();
        assert!(report.success);

        let watcher = ProjectWatcher::new(indexer, dir.path(), &config).unwrap();
        (dir, watcher)
    }

    fn summary(changes: &[FileChange]) -> Vec<(&str, ChangeType)> {
        changes
            .iter()
            .map(|c| (c.file_path.as_str(), c.change_type))
            .collect()
    }

    #[test]
    fn test_changes_are_classified_against_current_version() {
        let (_dir, watcher) = setup(&[("a.ts", "fn main\n"), ("c.ts", "fn gone\n")]);
        let root = watcher.root().to_path_buf();

        fs::write(root.join("a.ts"), "fn main\nfn more\n").unwrap();
        fs::write(root.join("b.ts"), "class Cart\n").unwrap();
        fs::remove_file(root.join("c.ts")).unwrap();
        fs::write(root.join("notes.md"), "# notes\n").unwrap();
        fs::create_dir_all(root.join("node_modules/lib")).unwrap();
        fs::write(root.join("node_modules/lib/index.ts"), "fn vendored\n").unwrap();

        let paths = vec![
            root.join("c.ts"),
            root.join("b.ts"),
            root.join("a.ts"),
            root.join("a.ts"),
            root.join("notes.md"),
            root.join("node_modules/lib/index.ts"),
        ];
        let changes = watcher.changes_for_paths(&paths).unwrap();
        assert_eq!(
            summary(&changes),
            vec![
                ("a.ts", ChangeType::Modified),
                ("b.ts", ChangeType::Added),
                ("c.ts", ChangeType::Deleted),
            ]
        );
        assert_eq!(changes[0].new_content.as_deref(), Some("fn main\nfn more\n"));

        let report = watcher
            .indexer
            .update(&ProjectId::new("demo"), &changes, &UpdateContext::default())
            .unwrap();
        assert!(report.success);
        assert_eq!(report.version_number, Some(2));
        assert_eq!(report.operations_applied, 3);
    }

    #[test]
    fn test_removed_directory_deletes_its_files() {
        let (_dir, watcher) = setup(&[
            ("src/auth/login.ts", "fn login\n"),
            ("src/auth/token.ts", "fn token\n"),
            ("src/app.ts", "fn app\n"),
        ]);
        let root = watcher.root().to_path_buf();
        fs::remove_dir_all(root.join("src/auth")).unwrap();

        let changes = watcher.changes_for_paths(&[root.join("src/auth")]).unwrap();
        assert_eq!(
            summary(&changes),
            vec![
                ("src/auth/login.ts", ChangeType::Deleted),
                ("src/auth/token.ts", ChangeType::Deleted),
            ]
        );
    }

    #[test]
    fn test_unknown_vanished_paths_and_outside_paths_are_ignored() {
        let (dir, watcher) = setup(&[("a.ts", "fn main\n")]);
        let root = watcher.root().to_path_buf();

        let outside = dir.path().parent().unwrap().join("elsewhere.ts");
        let changes = watcher
            .changes_for_paths(&[root.join("never.ts"), outside, root.clone()])
            .unwrap();
        assert!(changes.is_empty());
    }
}
