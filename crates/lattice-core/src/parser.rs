//! Tree-sitter extraction adapter.
//!
//! Implements [`Extractor`] with pre-compiled Tree-sitter queries for
//! TypeScript/JavaScript, Python and Rust. Each file yields one module
//! entity, its declarations, and references for calls, imports, type uses
//! and containment.

use crate::edge::EdgeType;
use crate::error::{ExtractError, Result};
use crate::extract::{CandidateEntity, CandidateReference, Extraction, Extractor, ReferenceTarget};
use crate::node::{Location, NodeType, Parameter};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use tree_sitter::{Language, Node, Parser, Query, QueryCursor, Tree};

/// Node kinds that add a decision point to cyclomatic complexity.
const BRANCH_KINDS: &[&str] = &[
    // TypeScript / JavaScript
    "if_statement",
    "for_statement",
    "for_in_statement",
    "while_statement",
    "do_statement",
    "switch_case",
    "catch_clause",
    "ternary_expression",
    "&&",
    "||",
    "??",
    // Python
    "elif_clause",
    "except_clause",
    "conditional_expression",
    "if_clause",
    "and",
    "or",
    // Rust
    "if_expression",
    "match_arm",
    "for_expression",
    "while_expression",
    "loop_expression",
];

/// Initializer kinds that make a variable declaration a function.
const FUNCTION_VALUE_KINDS: &[&str] = &["arrow_function", "function_expression", "function", "lambda"];

// ─────────────────────────────────────────────────────────────────────────────
// TreeSitterExtractor
// ─────────────────────────────────────────────────────────────────────────────

/// Default extraction adapter backed by Tree-sitter.
///
/// Queries are compiled once and shared; a fresh `Parser` is created per
/// file, so one extractor can serve many threads.
pub struct TreeSitterExtractor {
    /// Grammar and queries by file extension.
    by_extension: HashMap<&'static str, (&'static str, Arc<CompiledQueries>)>,
}

/// Pre-compiled queries for one grammar.
struct CompiledQueries {
    /// Declarations (functions, classes, variables).
    symbols: Query,
    /// Import specifiers.
    imports: Query,
    /// Call sites.
    calls: Query,
    /// Type references.
    uses: Query,
    language: Language,
}

impl TreeSitterExtractor {
    /// Creates an extractor with all grammars compiled.
    ///
    /// Returns an error if any language queries fail to compile.
    pub fn new() -> Result<Self> {
        let mut by_extension = HashMap::new();

        let typescript = Arc::new(Self::compile_typescript_queries(
            tree_sitter_typescript::language_typescript(),
        )?);
        let tsx = Arc::new(Self::compile_typescript_queries(
            tree_sitter_typescript::language_tsx(),
        )?);
        for ext in ["ts", "mts", "cts"] {
            by_extension.insert(ext, ("typescript", typescript.clone()));
        }
        by_extension.insert("tsx", ("typescript", tsx.clone()));
        for ext in ["js", "mjs", "cjs"] {
            by_extension.insert(ext, ("javascript", typescript.clone()));
        }
        by_extension.insert("jsx", ("javascript", tsx));

        by_extension.insert("py", ("python", Arc::new(Self::compile_python_queries()?)));
        by_extension.insert("rs", ("rust", Arc::new(Self::compile_rust_queries()?)));

        Ok(Self { by_extension })
    }

    /// Language names this extractor understands.
    pub fn languages(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.by_extension.values().map(|(l, _)| *l).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    fn lookup(&self, path: &Path) -> Option<(&'static str, &Arc<CompiledQueries>)> {
        let ext = path.extension()?.to_str()?;
        self.by_extension
            .get(ext)
            .map(|(language, compiled)| (*language, compiled))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Symbol Extraction
    // ─────────────────────────────────────────────────────────────────────────

    fn extract_symbols(
        &self,
        tree: &Tree,
        source: &str,
        file_path: &str,
        compiled: &CompiledQueries,
    ) -> Vec<CandidateEntity> {
        let mut symbols = Vec::new();
        let mut seen: HashSet<(usize, String)> = HashSet::new();
        let mut cursor = QueryCursor::new();

        let matches = cursor.matches(&compiled.symbols, tree.root_node(), source.as_bytes());

        for match_ in matches {
            let mut name: Option<&str> = None;
            let mut kind: Option<NodeType> = None;
            let mut def_node: Option<Node> = None;

            for capture in match_.captures {
                let capture_name = compiled.symbols.capture_names()[capture.index as usize];
                let text = capture.node.utf8_text(source.as_bytes()).unwrap_or("");

                match capture_name {
                    "name" => name = Some(text),
                    "function_def" | "method_def" => {
                        kind = Some(NodeType::Function);
                        def_node = Some(capture.node);
                    }
                    "class_def" | "interface_def" => {
                        kind = Some(NodeType::Class);
                        def_node = Some(capture.node);
                    }
                    "variable_def" => {
                        kind = Some(variable_kind(capture.node));
                        def_node = Some(capture.node);
                    }
                    _ => {}
                }
            }

            let (Some(name), Some(kind), Some(node)) = (name, kind, def_node) else {
                continue;
            };
            if !seen.insert((node.start_byte(), name.to_string())) {
                continue;
            }

            symbols.push(build_candidate(node, name, kind, source, file_path));
        }

        symbols.sort_by(|a, b| {
            a.byte_range
                .start
                .cmp(&b.byte_range.start)
                .then_with(|| b.byte_range.end.cmp(&a.byte_range.end))
                .then_with(|| a.name.cmp(&b.name))
        });
        symbols
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Relationship Extraction
    // ─────────────────────────────────────────────────────────────────────────

    fn extract_imports(
        &self,
        tree: &Tree,
        source: &str,
        references: &mut Vec<CandidateReference>,
        compiled: &CompiledQueries,
    ) {
        let mut cursor = QueryCursor::new();
        let matches = cursor.matches(&compiled.imports, tree.root_node(), source.as_bytes());

        for match_ in matches {
            for capture in match_.captures {
                let text = capture.node.utf8_text(source.as_bytes()).unwrap_or("");
                let specifier = text.trim_matches(|c| c == '"' || c == '\'' || c == '`');
                if specifier.is_empty() {
                    continue;
                }
                references.push(CandidateReference::new(
                    0,
                    ReferenceTarget::Path(specifier.to_string()),
                    EdgeType::Imports,
                    capture.node.start_position().row as u32 + 1,
                ));
            }
        }
    }

    fn extract_calls(
        &self,
        tree: &Tree,
        source: &str,
        entities: &[CandidateEntity],
        references: &mut Vec<CandidateReference>,
        compiled: &CompiledQueries,
    ) {
        let mut cursor = QueryCursor::new();
        let matches = cursor.matches(&compiled.calls, tree.root_node(), source.as_bytes());

        for match_ in matches {
            for capture in match_.captures {
                let capture_name = compiled.calls.capture_names()[capture.index as usize];
                let call_type = match capture_name {
                    "callee" => "direct",
                    "method_callee" => "method",
                    "constructor_callee" => "constructor",
                    _ => continue,
                };
                let callee = capture.node.utf8_text(source.as_bytes()).unwrap_or("");
                if callee.is_empty() {
                    continue;
                }

                let caller = enclosing_entity(capture.node.start_byte(), entities);
                references.push(
                    CandidateReference::new(
                        caller,
                        ReferenceTarget::Name(callee.to_string()),
                        EdgeType::Calls,
                        capture.node.start_position().row as u32 + 1,
                    )
                    .with_call_type(call_type),
                );
            }
        }
    }

    fn extract_uses(
        &self,
        tree: &Tree,
        source: &str,
        entities: &[CandidateEntity],
        references: &mut Vec<CandidateReference>,
        compiled: &CompiledQueries,
    ) {
        let mut cursor = QueryCursor::new();
        let matches = cursor.matches(&compiled.uses, tree.root_node(), source.as_bytes());

        for match_ in matches {
            for capture in match_.captures {
                let type_name = capture.node.utf8_text(source.as_bytes()).unwrap_or("");
                if type_name.is_empty() {
                    continue;
                }
                let user = enclosing_entity(capture.node.start_byte(), entities);
                references.push(CandidateReference::new(
                    user,
                    ReferenceTarget::Name(type_name.to_string()),
                    EdgeType::Uses,
                    capture.node.start_position().row as u32 + 1,
                ));
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Query Compilation
    // ─────────────────────────────────────────────────────────────────────────

    fn compile_typescript_queries(language: Language) -> Result<CompiledQueries> {
        let symbols_query = r#"
            (function_declaration name: (identifier) @name) @function_def
            (class_declaration name: (type_identifier) @name) @class_def
            (interface_declaration name: (type_identifier) @name) @interface_def
            (method_definition name: (property_identifier) @name) @method_def
            (program (lexical_declaration (variable_declarator name: (identifier) @name) @variable_def))
            (program (variable_declaration (variable_declarator name: (identifier) @name) @variable_def))
            (program (export_statement (lexical_declaration (variable_declarator name: (identifier) @name) @variable_def)))
        "#;

        let imports_query = r#"
            (import_statement source: (string) @source)
            (export_statement source: (string) @source)
        "#;

        let calls_query = r#"
            (call_expression function: (identifier) @callee)
            (call_expression function: (member_expression property: (property_identifier) @method_callee))
            (new_expression constructor: (identifier) @constructor_callee)
        "#;

        let uses_query = r#"
            (type_annotation (type_identifier) @type)
        "#;

        Self::compile(language, symbols_query, imports_query, calls_query, uses_query)
    }

    fn compile_python_queries() -> Result<CompiledQueries> {
        let language = tree_sitter_python::language();

        let symbols_query = r#"
            (function_definition name: (identifier) @name) @function_def
            (class_definition name: (identifier) @name) @class_def
            (module (expression_statement (assignment left: (identifier) @name) @variable_def))
        "#;

        let imports_query = r#"
            (import_statement name: (dotted_name) @source)
            (import_statement name: (aliased_import name: (dotted_name) @source))
            (import_from_statement module_name: (dotted_name) @source)
            (import_from_statement module_name: (relative_import) @source)
        "#;

        let calls_query = r#"
            (call function: (identifier) @callee)
            (call function: (attribute attribute: (identifier) @method_callee))
        "#;

        let uses_query = r#"
            (type (identifier) @type)
        "#;

        Self::compile(language, symbols_query, imports_query, calls_query, uses_query)
    }

    fn compile_rust_queries() -> Result<CompiledQueries> {
        let language = tree_sitter_rust::language();

        let symbols_query = r#"
            (function_item name: (identifier) @name) @function_def
            (struct_item name: (type_identifier) @name) @class_def
            (enum_item name: (type_identifier) @name) @class_def
            (trait_item name: (type_identifier) @name) @interface_def
            (source_file (const_item name: (identifier) @name) @variable_def)
            (source_file (static_item name: (identifier) @name) @variable_def)
        "#;

        let imports_query = r#"
            (use_declaration argument: (_) @source)
        "#;

        let calls_query = r#"
            (call_expression function: (identifier) @callee)
            (call_expression function: (field_expression field: (field_identifier) @method_callee))
            (call_expression function: (scoped_identifier name: (identifier) @callee))
        "#;

        let uses_query = r#"
            (type_identifier) @type
        "#;

        Self::compile(language, symbols_query, imports_query, calls_query, uses_query)
    }

    fn compile(
        language: Language,
        symbols: &str,
        imports: &str,
        calls: &str,
        uses: &str,
    ) -> Result<CompiledQueries> {
        let query = |src: &str| {
            Query::new(&language, src).map_err(|e| ExtractError::QueryError(e.to_string()))
        };

        Ok(CompiledQueries {
            symbols: query(symbols)?,
            imports: query(imports)?,
            calls: query(calls)?,
            uses: query(uses)?,
            language: language.clone(),
        })
    }
}

impl Extractor for TreeSitterExtractor {
    fn language_of(&self, path: &Path) -> Option<&'static str> {
        self.lookup(path).map(|(language, _)| language)
    }

    fn extract(&self, file_path: &str, source: &str) -> Result<Extraction> {
        let (language, compiled) = self
            .lookup(Path::new(file_path))
            .ok_or_else(|| ExtractError::UnsupportedLanguage(file_path.into()))?;

        let mut extraction = Extraction::new(file_path, language);
        extraction
            .entities
            .push(CandidateEntity::module(file_path, source));

        if source.trim().is_empty() {
            return Ok(extraction);
        }

        let mut parser = Parser::new();
        parser
            .set_language(&compiled.language)
            .map_err(|e| ExtractError::ParserError(format!("Failed to set language: {}", e)))?;

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| ExtractError::ParserError("Tree-sitter returned no tree".into()))?;

        let symbols = self.extract_symbols(&tree, source, file_path, compiled);
        extraction.entities.extend(symbols);

        let mut references = containment(&extraction.entities);
        self.extract_imports(&tree, source, &mut references, compiled);
        self.extract_calls(&tree, source, &extraction.entities, &mut references, compiled);
        self.extract_uses(&tree, source, &extraction.entities, &mut references, compiled);
        extraction.references = references;

        debug!(
            "Extracted {} ({} entities, {} references)",
            file_path,
            extraction.entities.len(),
            extraction.references.len()
        );

        Ok(extraction)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn build_candidate(
    node: Node,
    name: &str,
    kind: NodeType,
    source: &str,
    file_path: &str,
) -> CandidateEntity {
    let start = node.start_position();
    let end = node.end_position();
    let location = Location::new(file_path, start.row as u32 + 1, end.row as u32 + 1)
        .with_columns(start.column as u32, end.column as u32);

    let text = &source[node.byte_range()];
    let mut candidate = CandidateEntity::new(name, kind, location, text)
        .with_byte_range(node.byte_range());

    // Signature is the first line of the declaration
    if let Some(first_line) = source.lines().nth(start.row) {
        candidate = candidate.with_signature(first_line.trim());
    }

    if kind == NodeType::Variable {
        return candidate;
    }

    candidate = candidate.with_complexity(cyclomatic_complexity(node));

    // Arrow functions bound to a name keep their signature on the value node
    let callable = node
        .child_by_field_name("value")
        .filter(|v| FUNCTION_VALUE_KINDS.contains(&v.kind()))
        .unwrap_or(node);

    if kind == NodeType::Function {
        candidate = candidate.with_parameters(extract_parameters(callable, source));
        if let Some(return_type) = callable
            .child_by_field_name("return_type")
            .and_then(|n| node_text(n, source))
        {
            let cleaned = clean_type(&return_type);
            if !cleaned.is_empty() {
                candidate = candidate.with_return_type(cleaned);
            }
        }
    }

    candidate
}

/// Variables initialised with a function literal are functions.
fn variable_kind(node: Node) -> NodeType {
    let value = node
        .child_by_field_name("value")
        .or_else(|| node.child_by_field_name("right"));
    match value {
        Some(v) if FUNCTION_VALUE_KINDS.contains(&v.kind()) => NodeType::Function,
        _ => NodeType::Variable,
    }
}

/// 1 + number of decision points in the subtree.
fn cyclomatic_complexity(node: Node) -> u32 {
    fn count(node: Node, total: &mut u32) {
        if BRANCH_KINDS.contains(&node.kind()) {
            *total += 1;
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            count(child, total);
        }
    }

    let mut total = 1;
    count(node, &mut total);
    total
}

fn extract_parameters(node: Node, source: &str) -> Vec<Parameter> {
    let Some(params) = node.child_by_field_name("parameters") else {
        return Vec::new();
    };

    let mut cursor = params.walk();
    let children: Vec<Node> = params.named_children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|p| p.kind() != "comment")
        .filter_map(|p| parameter_from(p, source))
        .collect()
}

fn parameter_from(param: Node, source: &str) -> Option<Parameter> {
    let name_node = param
        .child_by_field_name("pattern")
        .or_else(|| param.child_by_field_name("name"))
        .or_else(|| match param.kind() {
            "typed_parameter" => param.named_child(0),
            _ => None,
        });

    let name = match name_node {
        Some(n) => node_text(n, source)?,
        None => node_text(param, source)?,
    };

    let type_annotation = param
        .child_by_field_name("type")
        .and_then(|n| node_text(n, source))
        .map(|t| clean_type(&t))
        .filter(|t| !t.is_empty());

    let kind = param.kind();
    let is_optional = kind.contains("optional")
        || kind.contains("default")
        || param.child_by_field_name("value").is_some();

    Some(Parameter {
        name,
        type_annotation,
        is_optional,
    })
}

fn node_text(node: Node, source: &str) -> Option<String> {
    node.utf8_text(source.as_bytes()).ok().map(str::to_string)
}

fn clean_type(raw: &str) -> String {
    raw.trim()
        .trim_start_matches("->")
        .trim_start_matches(':')
        .trim()
        .to_string()
}

/// Smallest entity containing `byte`, or the module (index 0).
fn enclosing_entity(byte: usize, entities: &[CandidateEntity]) -> usize {
    entities
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, e)| e.byte_range.start <= byte && byte < e.byte_range.end)
        .min_by_key(|(_, e)| e.byte_range.end - e.byte_range.start)
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

/// CONTAINS references from each entity's smallest strict container.
fn containment(entities: &[CandidateEntity]) -> Vec<CandidateReference> {
    let mut references = Vec::new();

    for (idx, entity) in entities.iter().enumerate().skip(1) {
        let parent = entities
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(other, e)| {
                *other != idx
                    && e.byte_range.start <= entity.byte_range.start
                    && entity.byte_range.end <= e.byte_range.end
                    && (e.byte_range.end - e.byte_range.start)
                        > (entity.byte_range.end - entity.byte_range.start)
            })
            .min_by_key(|(_, e)| e.byte_range.end - e.byte_range.start)
            .map(|(other, _)| other)
            .unwrap_or(0);

        references.push(CandidateReference::new(
            parent,
            ReferenceTarget::Local(idx),
            EdgeType::Contains,
            entity.location.start_line,
        ));
    }

    references
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
