//! Lattice Graph - Versioned storage and structural queries
//!
//! This crate stores code property graphs as immutable versions and answers
//! structural questions about them: search, traversal, impact analysis,
//! centrality and cycle detection.
//!
//! # Architecture
//!
//! Storage sits behind the [`GraphStore`] trait with two backends,
//! [`MemoryStore`] and the durable [`SledStore`]. Queries materialize one
//! committed version into a [`CodeGraph`] (petgraph plus indexes for:
//! - Name-based lookups
//! - Stable node keys
//! - File-based grouping
//! - Purpose text search)
//!
//! and run every algorithm in memory.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lattice_core::ProjectId;
//! use lattice_graph::{NameOptions, QueryEngine, SledStore};
//!
//! let store = Arc::new(SledStore::open(".lattice/db").unwrap());
//! let engine = QueryEngine::new(store);
//!
//! let project = ProjectId::new("my-app");
//! for found in engine.find_nodes_by_name(&project, "login", NameOptions::default()).unwrap() {
//!     println!("{} ({})", found.node.key(), found.similarity);
//! }
//! ```

pub mod cycles;
pub mod graph;
pub mod impact;
pub mod memory;
pub mod query;
pub mod ranking;
pub mod search_index;
pub mod sled_store;
pub mod store;
pub mod symbol_table;
pub mod traversal;

pub use cycles::Cycle;
pub use graph::{CodeGraph, Neighbor};
pub use impact::{
    AffectedNode, ImpactAnalysis, ImpactDirection, RiskLevel, HIGH_COMPLEXITY, IMPACT_MAX_HOPS,
};
pub use memory::MemoryStore;
pub use query::{
    Dependency, MatchReason, NameOptions, NodeMatch, PathResult, QueryEngine, QueryError,
    SearchHit, SearchOptions, Snapshot, DEFAULT_CACHE_CAPACITY, DEFAULT_DEPENDENCY_DEPTH, DEFAULT_FUZZY_THRESHOLD,
    DEFAULT_PATH_DEPTH, DEFAULT_SEARCH_LIMIT,
};
pub use ranking::{compute_centrality, Bottleneck, CentralityScores};
pub use search_index::SearchIndex;
pub use sled_store::SledStore;
pub use store::{GraphStore, NodeFilter, Page, StoreError};
pub use symbol_table::{resolve_references, SymbolTable};
pub use traversal::{Reached, Route};
