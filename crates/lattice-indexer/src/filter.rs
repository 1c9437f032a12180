//! Which files belong to a project.
//!
//! Paths are matched relative to the project root with `/` separators, so
//! the same patterns work on every platform and in node keys.

use crate::error::{IndexError, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use lattice_core::Extractor;
use std::path::{Component, Path};
use tracing::{debug, warn};

/// Include/exclude globs plus a language allow-list.
#[derive(Debug, Clone)]
pub struct FileFilter {
    include: GlobSet,
    exclude: GlobSet,
    languages: Vec<String>,
}

impl FileFilter {
    /// Compiles the patterns. An empty include list matches every file.
    pub fn new(include: &[String], exclude: &[String], languages: &[String]) -> Result<Self> {
        let include = if include.is_empty() {
            compile(&["**".to_string()])?
        } else {
            compile(include)?
        };
        Ok(Self {
            include,
            exclude: compile(exclude)?,
            languages: languages.to_vec(),
        })
    }

    /// True if a root-relative path passes the globs and its language is
    /// allowed. Paths through hidden directories never match.
    pub fn matches(&self, relative: &str, language: Option<&str>) -> bool {
        let Some(language) = language else {
            return false;
        };
        if relative.split('/').any(|part| part.starts_with('.')) {
            return false;
        }
        if !self.languages.is_empty() && !self.languages.iter().any(|l| l == language) {
            return false;
        }
        self.include.is_match(relative) && !self.exclude.is_match(relative)
    }

    /// Walks `root` (honouring `.gitignore`) and returns the matching
    /// relative paths, sorted.
    pub fn collect(&self, root: &Path, extractor: &dyn Extractor) -> Result<Vec<String>> {
        if !root.is_dir() {
            return Err(IndexError::io(
                root,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            ));
        }

        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .require_git(false)
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Walk error under {}: {}", root.display(), e);
                    continue;
                }
            };
            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }
            let Some(relative) = relative_path(root, entry.path()) else {
                continue;
            };
            if self.matches(&relative, extractor.language_of(entry.path())) {
                files.push(relative);
            }
        }

        files.sort();
        debug!("Found {} files under {}", files.len(), root.display());
        Ok(files)
    }
}

/// `path` relative to `root` with `/` separators, or `None` if it lies
/// outside the root.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn compile(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| IndexError::Glob {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| IndexError::Glob {
        pattern: patterns.join(", "),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_EXCLUDE, DEFAULT_INCLUDE};
    use lattice_core::TreeSitterExtractor;
    use std::fs;

    fn defaults() -> FileFilter {
        let include: Vec<String> = DEFAULT_INCLUDE.iter().map(|s| s.to_string()).collect();
        let exclude: Vec<String> = DEFAULT_EXCLUDE.iter().map(|s| s.to_string()).collect();
        FileFilter::new(&include, &exclude, &[]).unwrap()
    }

    #[test]
    fn test_default_patterns() {
        let filter = defaults();
        let ts = Some("typescript");

        assert!(filter.matches("index.ts", ts));
        assert!(filter.matches("src/auth/service.ts", ts));
        assert!(filter.matches("src/App.tsx", ts));
        assert!(!filter.matches("node_modules/lib/index.ts", ts));
        assert!(!filter.matches("src/auth.test.ts", ts));
        assert!(!filter.matches("src/__tests__/auth.ts", ts));
        assert!(!filter.matches("dist/bundle.js", Some("javascript")));
        assert!(!filter.matches("main.py", Some("python")));
        assert!(!filter.matches(".lattice/cache.ts", ts));
        assert!(!filter.matches("README.md", None));
    }

    #[test]
    fn test_language_allow_list() {
        let filter = FileFilter::new(&[], &[], &["python".to_string()]).unwrap();
        assert!(filter.matches("pkg/mod.py", Some("python")));
        assert!(!filter.matches("src/a.ts", Some("typescript")));
    }

    #[test]
    fn test_invalid_glob() {
        let result = FileFilter::new(&["src/[".to_string()], &[], &[]);
        assert!(matches!(result, Err(IndexError::Glob { .. })));
    }

    #[test]
    fn test_collect_walks_sorted_and_respects_gitignore() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/nested")).unwrap();
        fs::create_dir_all(root.join("generated")).unwrap();
        fs::create_dir_all(root.join("node_modules/dep")).unwrap();
        fs::write(root.join("src/b.ts"), "export const b = 1;").unwrap();
        fs::write(root.join("src/nested/a.ts"), "export const a = 1;").unwrap();
        fs::write(root.join("src/notes.md"), "# notes").unwrap();
        fs::write(root.join("generated/out.ts"), "export {}").unwrap();
        fs::write(root.join("node_modules/dep/index.ts"), "export {}").unwrap();
        fs::write(root.join(".gitignore"), "generated/\n").unwrap();

        let extractor = TreeSitterExtractor::new().unwrap();
        let files = defaults().collect(root, &extractor).unwrap();
        assert_eq!(files, vec!["src/b.ts", "src/nested/a.ts"]);
    }

    #[test]
    fn test_relative_path() {
        let root = Path::new("/work/project");
        assert_eq!(
            relative_path(root, Path::new("/work/project/src/a.ts")).as_deref(),
            Some("src/a.ts")
        );
        assert_eq!(relative_path(root, Path::new("/elsewhere/a.ts")), None);
        assert_eq!(relative_path(root, root), None);
    }
}
