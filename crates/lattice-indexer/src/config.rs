//! Project configuration stored in `.lattice/config.json`.

use crate::error::{IndexError, Result};
use lattice_core::ProjectId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory holding the config and the database.
pub const LATTICE_DIR: &str = ".lattice";
pub const CONFIG_FILE: &str = "config.json";
pub const DATABASE_DIR: &str = "db";

pub const DEFAULT_INCLUDE: &[&str] = &["**/*.ts", "**/*.tsx", "**/*.js", "**/*.jsx"];

pub const DEFAULT_EXCLUDE: &[&str] = &[
    "**/node_modules/**",
    "**/dist/**",
    "**/build/**",
    "**/coverage/**",
    "**/*.test.*",
    "**/*.spec.*",
    "**/__tests__/**",
];

pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexConfig {
    pub project_id: ProjectId,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Empty means every language the extractor supports.
    pub languages: Vec<String>,
    pub debounce_ms: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            project_id: ProjectId::new("default"),
            include: DEFAULT_INCLUDE.iter().map(|s| s.to_string()).collect(),
            exclude: DEFAULT_EXCLUDE.iter().map(|s| s.to_string()).collect(),
            languages: Vec::new(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl IndexConfig {
    /// Defaults with the project named after the root directory.
    pub fn for_root(root: &Path) -> Self {
        let name = root
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "default".to_string());
        Self {
            project_id: ProjectId::new(name),
            ..Self::default()
        }
    }

    pub fn path(root: &Path) -> PathBuf {
        root.join(LATTICE_DIR).join(CONFIG_FILE)
    }

    pub fn database_path(root: &Path) -> PathBuf {
        root.join(LATTICE_DIR).join(DATABASE_DIR)
    }

    /// Reads the config under `root`, or defaults when there is none.
    pub fn load(root: &Path) -> Result<Self> {
        let path = Self::path(root);
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::for_root(root));
        }
        let text = fs::read_to_string(&path).map_err(|e| IndexError::io(&path, e))?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let dir = root.join(LATTICE_DIR);
        fs::create_dir_all(&dir).map_err(|e| IndexError::io(&dir, e))?;
        let path = Self::path(root);
        fs::write(&path, serde_json::to_string_pretty(self)?).map_err(|e| IndexError::io(&path, e))
    }
}
