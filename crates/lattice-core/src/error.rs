//! Error types for source extraction.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExtractError>;

/// Why a single file could not be turned into candidates.
///
/// These are per-file failures: callers record them and move on.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unsupported language for {0}")]
    UnsupportedLanguage(PathBuf),

    #[error("parser error: {0}")]
    ParserError(String),

    #[error("query compilation failed: {0}")]
    QueryError(String),
}

impl ExtractError {
    pub fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
