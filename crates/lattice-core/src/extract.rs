//! The extraction contract between source parsers and the graph engine.
//!
//! An [`Extractor`] turns one file's text into candidate entities and the
//! references between them. References name their targets; turning names
//! into edges is the engine's job, done only once every node of a version
//! is known.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::Path;

use crate::edge::EdgeType;
use crate::error::{ExtractError, Result};
use crate::hash::content_hash;
use crate::node::{CodeEntity, Location, NodeKey, NodeType, Parameter};

/// Turns source text into graph candidates.
///
/// Implementations must be deterministic: the same path and text always
/// produce the same extraction.
pub trait Extractor: Send + Sync {
    /// Language name for a path, or `None` if the file is not supported.
    fn language_of(&self, path: &Path) -> Option<&'static str>;

    /// Extracts candidates from one file.
    fn extract(&self, file_path: &str, source: &str) -> Result<Extraction>;
}

/// Reads a source file as UTF-8.
pub fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| ExtractError::io(path, e))
}

/// Attaches a human-readable purpose to an entity. Purely advisory.
pub trait Annotator: Send + Sync {
    fn describe(&self, entity: &CodeEntity, source_text: &str) -> Option<String>;
}

/// Everything extracted from a single file.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub file_path: String,
    pub language: String,
    pub entities: Vec<CandidateEntity>,
    pub references: Vec<CandidateReference>,
}

impl Extraction {
    pub fn new(file_path: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            language: language.into(),
            entities: Vec::new(),
            references: Vec::new(),
        }
    }

    /// Converts candidates into entities carrying key and content hash.
    pub fn entities(&self) -> Vec<CodeEntity> {
        self.entities
            .iter()
            .map(|candidate| candidate.to_entity(&self.language))
            .collect()
    }
}

/// A declaration found in a file.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateEntity {
    pub node_key: NodeKey,
    pub node_type: NodeType,
    pub name: String,
    pub location: Location,
    /// Byte span in the file, used to find enclosing entities.
    pub byte_range: Range<usize>,
    /// The exact source span of the declaration.
    pub source_text: String,
    pub signature: Option<String>,
    pub complexity: Option<u32>,
    pub parameters: Vec<Parameter>,
    pub return_type: Option<String>,
}

impl CandidateEntity {
    /// A declaration keyed `{file}:{start_line}:{name}`.
    pub fn new(
        name: impl Into<String>,
        node_type: NodeType,
        location: Location,
        source_text: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let source_text = source_text.into();
        Self {
            node_key: NodeKey::declaration(&location.file_path, location.start_line, &name),
            node_type,
            name,
            byte_range: 0..source_text.len(),
            location,
            source_text,
            signature: None,
            complexity: None,
            parameters: Vec::new(),
            return_type: None,
        }
    }

    /// The module node covering a whole file.
    pub fn module(file_path: &str, source: &str) -> Self {
        let line_count = source.lines().count().max(1) as u32;
        let last_line_len = source.lines().last().map(|l| l.len()).unwrap_or(0) as u32;
        let location = Location::new(file_path, 1, line_count).with_columns(0, last_line_len);
        Self {
            node_key: NodeKey::module(file_path),
            node_type: NodeType::Module,
            name: crate::node::module_name(file_path),
            location,
            byte_range: 0..source.len(),
            source_text: source.to_string(),
            signature: None,
            complexity: None,
            parameters: Vec::new(),
            return_type: None,
        }
    }

    pub fn with_byte_range(mut self, range: Range<usize>) -> Self {
        self.byte_range = range;
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn with_complexity(mut self, complexity: u32) -> Self {
        self.complexity = Some(complexity);
        self
    }

    pub fn with_parameters(mut self, parameters: Vec<Parameter>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_return_type(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = Some(return_type.into());
        self
    }

    /// The entity stored for this candidate.
    pub fn to_entity(&self, language: &str) -> CodeEntity {
        CodeEntity {
            node_key: self.node_key.clone(),
            node_type: self.node_type,
            name: Some(self.name.clone()),
            location: self.location.clone(),
            language: language.to_string(),
            content_hash: content_hash(&self.source_text),
            signature: self.signature.clone(),
            complexity: self.complexity,
            purpose: None,
            parameters: self.parameters.clone(),
            return_type: self.return_type.clone(),
        }
    }
}

/// What a reference points at before resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceTarget {
    /// Another entity of the same extraction, by index.
    Local(usize),
    /// A declared name, resolved against the whole version.
    Name(String),
    /// An import specifier, resolved to a module node by path.
    Path(String),
}

/// A relationship candidate originating at one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateReference {
    /// Index of the source entity in [`Extraction::entities`].
    pub source: usize,
    pub target: ReferenceTarget,
    pub edge_type: EdgeType,
    pub line: u32,
    pub call_type: Option<String>,
}

impl CandidateReference {
    pub fn new(source: usize, target: ReferenceTarget, edge_type: EdgeType, line: u32) -> Self {
        Self {
            source,
            target,
            edge_type,
            line,
            call_type: None,
        }
    }

    pub fn with_call_type(mut self, call_type: impl Into<String>) -> Self {
        self.call_type = Some(call_type.into());
        self
    }
}
