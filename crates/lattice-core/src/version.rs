//! Projects, versions and project-level statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque project identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Storage handle of a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(pub u64);

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a version is still being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionState {
    /// Allocated; nodes and edges may still be inserted. Invisible to readers.
    Pending,
    /// Sealed and visible. Membership never changes again.
    Committed,
}

/// An immutable snapshot marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphVersion {
    pub id: VersionId,
    pub project_id: ProjectId,
    pub version_number: u64,
    pub checksum: String,
    pub operations_count: u64,
    pub created_at: DateTime<Utc>,
    pub state: VersionState,
}

impl GraphVersion {
    pub fn is_committed(&self) -> bool {
        self.state == VersionState::Committed
    }
}

/// Request to allocate a pending version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVersion {
    pub project_id: ProjectId,
    pub version_number: u64,
}

/// Aggregates for a project's current version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub project_id: ProjectId,
    pub total_nodes: usize,
    pub total_edges: usize,
    pub total_files: usize,
    pub version_number: u64,
    pub version_created: DateTime<Utc>,
    pub average_complexity: f64,
}
