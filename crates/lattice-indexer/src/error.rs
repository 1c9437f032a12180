//! Error types for indexing.

use lattice_graph::StoreError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

/// Failures that stop an indexing request before it writes anything, plus
/// configuration and watcher setup errors.
///
/// Per-file extraction failures and backend failures during a build or
/// update are not errors: they are reported inside the [`IndexReport`].
///
/// [`IndexReport`]: crate::IndexReport
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("invalid glob pattern '{pattern}': {source}")]
    Glob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IndexError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
