//! Lattice Core - Code property graph model and source extraction
//!
//! This crate defines what the graph is made of (nodes, edges, versions)
//! and how source files become graph candidates.
//!
//! # Architecture
//!
//! Extraction is a seam: anything implementing [`Extractor`] can feed the
//! indexer. The bundled [`TreeSitterExtractor`] handles TypeScript,
//! JavaScript, Python and Rust.
//!
//! # Example
//!
//! ```no_run
//! use lattice_core::{Extractor, TreeSitterExtractor};
//!
//! let extractor = TreeSitterExtractor::new().unwrap();
//! let extraction = extractor
//!     .extract("src/auth.ts", "export function login() {}")
//!     .unwrap();
//!
//! for entity in extraction.entities() {
//!     println!("{} {}", entity.node_type, entity.node_key);
//! }
//! ```

pub mod edge;
pub mod error;
pub mod extract;
pub mod fuzzy;
pub mod hash;
pub mod node;
pub mod parser;
pub mod version;

pub use edge::{EdgeId, EdgeType, GraphEdge, NewEdge};
pub use error::{ExtractError, Result};
pub use extract::{
    read_source, Annotator, CandidateEntity, CandidateReference, Extraction, Extractor,
    ReferenceTarget,
};
pub use hash::{content_hash, version_checksum};
pub use node::{CodeEntity, GraphNode, Location, NodeId, NodeKey, NodeType, Parameter};
pub use parser::TreeSitterExtractor;
pub use version::{GraphVersion, NewVersion, ProjectId, Statistics, VersionId, VersionState};
