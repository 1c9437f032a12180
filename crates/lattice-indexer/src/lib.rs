//! Lattice Indexer - Builds and maintains versioned code graphs
//!
//! The [`Indexer`] turns a source tree into a committed graph version and
//! keeps it current: full builds extract every file, incremental updates
//! re-extract only changed files and carry everything else forward, and the
//! [`ProjectWatcher`] feeds debounced file system events into updates.
//!
//! Every write happens on a pending version under a per-project lock, and is
//! either committed or discarded as a whole.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use lattice_core::TreeSitterExtractor;
//! use lattice_graph::SledStore;
//! use lattice_indexer::{BuildContext, IndexConfig, Indexer};
//!
//! let root = Path::new(".");
//! let config = IndexConfig::load(root).unwrap();
//! let store = Arc::new(SledStore::open(IndexConfig::database_path(root)).unwrap());
//! let indexer = Indexer::new(store, Arc::new(TreeSitterExtractor::new().unwrap()));
//!
//! let report = indexer.build(&BuildContext::from_config(root, &config)).unwrap();
//! println!("{} nodes in version {:?}", report.nodes_affected, report.version_number);
//! ```

mod builder;
pub mod config;
pub mod error;
pub mod filter;
mod indexer;
mod locks;
pub mod report;
mod updater;
pub mod watcher;

#[cfg(test)]
mod testing;

pub use config::{IndexConfig, DEFAULT_DEBOUNCE_MS, DEFAULT_EXCLUDE, DEFAULT_INCLUDE, LATTICE_DIR};
pub use error::{IndexError, Result};
pub use filter::FileFilter;
pub use indexer::{Indexer, MAX_CONFLICT_RETRIES};
pub use report::{
    BuildContext, ChangeType, FileChange, IndexIssue, IndexReport, UpdateContext,
};
pub use watcher::ProjectWatcher;
