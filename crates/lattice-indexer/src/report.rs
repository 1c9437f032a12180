//! Requests and results of builds and updates.

use crate::config::IndexConfig;
use lattice_core::{ProjectId, VersionId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

/// Full build of a project from a source tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildContext {
    pub project_id: ProjectId,
    /// A pending version to fill. When absent the build allocates one.
    pub version_id: Option<VersionId>,
    pub root_path: PathBuf,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub languages: Vec<String>,
}

impl BuildContext {
    pub fn from_config(root_path: impl Into<PathBuf>, config: &IndexConfig) -> Self {
        Self {
            project_id: config.project_id.clone(),
            version_id: None,
            root_path: root_path.into(),
            include_patterns: config.include.clone(),
            exclude_patterns: config.exclude.clone(),
            languages: config.languages.clone(),
        }
    }
}

/// Options of an incremental update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContext {
    /// Version to apply the changes to. Defaults to the current version.
    pub base_version: Option<VersionId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        })
    }
}

/// One file change. `added` and `modified` carry the new content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    pub file_path: String,
    pub change_type: ChangeType,
    pub old_content: Option<String>,
    pub new_content: Option<String>,
}

impl FileChange {
    pub fn added(file_path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            change_type: ChangeType::Added,
            old_content: None,
            new_content: Some(content.into()),
        }
    }

    pub fn modified(file_path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            change_type: ChangeType::Modified,
            old_content: None,
            new_content: Some(content.into()),
        }
    }

    pub fn deleted(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            change_type: ChangeType::Deleted,
            old_content: None,
            new_content: None,
        }
    }
}

/// A non-fatal problem with one file, or the reason an operation failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexIssue {
    /// `None` for failures not tied to a file.
    pub file_path: Option<String>,
    pub message: String,
}

impl IndexIssue {
    pub fn file(file_path: impl Into<String>, message: impl fmt::Display) -> Self {
        Self {
            file_path: Some(file_path.into()),
            message: message.to_string(),
        }
    }

    pub fn general(message: impl fmt::Display) -> Self {
        Self {
            file_path: None,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for IndexIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file_path {
            Some(path) => write!(f, "{}: {}", path, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Outcome of a build or an update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexReport {
    pub success: bool,
    pub nodes_affected: usize,
    pub edges_affected: usize,
    /// Files processed (build) or file changes applied (update).
    pub operations_applied: usize,
    pub execution_time_ms: u64,
    pub errors: Vec<IndexIssue>,
    /// The committed version, when there is one.
    pub version_id: Option<VersionId>,
    pub version_number: Option<u64>,
}

impl IndexReport {
    pub(crate) fn failed(issue: IndexIssue, mut errors: Vec<IndexIssue>) -> Self {
        errors.push(issue);
        Self {
            success: false,
            errors,
            ..Default::default()
        }
    }

    pub(crate) fn finish(mut self, start: Instant) -> Self {
        self.execution_time_ms = start.elapsed().as_millis() as u64;
        self
    }
}
