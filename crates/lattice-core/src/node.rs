//! Node types for the code property graph.
//!
//! A node is a syntactic entity: a function, class, variable or module.
//! Its logical payload lives in [`CodeEntity`], which is what gets carried
//! from one version to the next. [`GraphNode`] wraps an entity in the
//! storage envelope of one particular version.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::version::{ProjectId, VersionId};

/// Storage handle of a node row. Only meaningful inside one version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identity of a code entity across versions.
///
/// Declarations use `{file}:{start_line}:{name}`. Module nodes use line 0,
/// which no declaration can occupy.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeKey(String);

impl NodeKey {
    /// Key of a declaration starting at `start_line` (1-based).
    pub fn declaration(file_path: &str, start_line: u32, name: &str) -> Self {
        Self(format!("{}:{}:{}", file_path, start_line, name))
    }

    /// Key of the module node for a file.
    pub fn module(file_path: &str) -> Self {
        Self(format!("{}:0:{}", file_path, module_name(file_path)))
    }

    /// Wraps an adapter-supplied key verbatim.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Display name of a file's module node: the file stem.
pub fn module_name(file_path: &str) -> String {
    Path::new(file_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_path)
        .to_string()
}

/// The kind of code entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    /// Functions, methods, constructors, arrow functions bound to a name.
    Function,
    /// Classes, interfaces, structs, enums, traits.
    Class,
    /// Top-level variables and constants.
    Variable,
    /// One node per source file.
    Module,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "FUNCTION",
            Self::Class => "CLASS",
            Self::Variable => "VARIABLE",
            Self::Module => "MODULE",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FUNCTION" => Ok(Self::Function),
            "CLASS" => Ok(Self::Class),
            "VARIABLE" => Ok(Self::Variable),
            "MODULE" => Ok(Self::Module),
            other => Err(format!("unknown node type: {}", other)),
        }
    }
}

/// Where an entity sits in its file. Lines are 1-based, columns 0-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub start_column: u32,
    pub end_column: u32,
}

impl Location {
    pub fn new(file_path: impl Into<String>, start_line: u32, end_line: u32) -> Self {
        Self {
            file_path: file_path.into(),
            start_line,
            end_line,
            start_column: 0,
            end_column: 0,
        }
    }

    pub fn with_columns(mut self, start_column: u32, end_column: u32) -> Self {
        self.start_column = start_column;
        self.end_column = end_column;
        self
    }

    /// True if `line` falls inside this span.
    pub fn contains_line(&self, line: u32) -> bool {
        self.start_line <= line && line <= self.end_line
    }
}

/// A declared parameter of a function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub type_annotation: Option<String>,
    pub is_optional: bool,
}

/// The logical payload of a node, independent of any version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeEntity {
    pub node_key: NodeKey,
    pub node_type: NodeType,
    pub name: Option<String>,
    pub location: Location,
    pub language: String,
    /// SHA-256 of the entity's exact source span.
    pub content_hash: String,
    pub signature: Option<String>,
    pub complexity: Option<u32>,
    /// Advisory free text from the semantic annotator.
    pub purpose: Option<String>,
    pub parameters: Vec<Parameter>,
    pub return_type: Option<String>,
}

impl CodeEntity {
    /// Display name, falling back to the key.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.node_key.as_str())
    }

    pub fn file_path(&self) -> &str {
        &self.location.file_path
    }
}

/// A node as stored in one version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: NodeId,
    pub project_id: ProjectId,
    pub version_id: VersionId,
    pub entity: CodeEntity,
}

impl GraphNode {
    pub fn key(&self) -> &NodeKey {
        &self.entity.node_key
    }

    pub fn node_type(&self) -> NodeType {
        self.entity.node_type
    }

    pub fn name(&self) -> &str {
        self.entity.display_name()
    }

    pub fn file_path(&self) -> &str {
        self.entity.file_path()
    }

    pub fn complexity(&self) -> u32 {
        self.entity.complexity.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declaration_key_format() {
        let key = NodeKey::declaration("src/auth.ts", 12, "login");
        assert_eq!(key.as_str(), "src/auth.ts:12:login");
    }

    #[test]
    fn test_module_key_uses_line_zero() {
        let key = NodeKey::module("src/auth/service.ts");
        assert_eq!(key.as_str(), "src/auth/service.ts:0:service");
        assert_ne!(key, NodeKey::declaration("src/auth/service.ts", 1, "service"));
    }

    #[test]
    fn test_node_type_parse_and_display() {
        assert_eq!("class".parse::<NodeType>().unwrap(), NodeType::Class);
        assert_eq!(NodeType::Function.to_string(), "FUNCTION");
        assert!("struct".parse::<NodeType>().is_err());
    }

    #[test]
    fn test_node_type_serializes_uppercase() {
        let json = serde_json::to_string(&NodeType::Variable).unwrap();
        assert_eq!(json, "\"VARIABLE\"");
    }
}
