//! Symbol table for resolving references into edges.
//!
//! Built once per version after every node exists, so resolution never
//! depends on the order files were processed in.

use lattice_core::{
    CandidateReference, EdgeType, Extraction, GraphNode, NewEdge, NodeId, NodeKey, NodeType,
    ReferenceTarget,
};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Extensions tried for extension-less TS/JS import specifiers.
const SCRIPT_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs"];

#[derive(Debug, Clone)]
struct Symbol {
    key: NodeKey,
    id: NodeId,
    file: String,
}

/// Lookup tables over one version's nodes.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    /// Declarations by name. Modules are excluded.
    by_name: HashMap<String, Vec<Symbol>>,
    /// Module nodes by file path.
    modules: BTreeMap<String, NodeId>,
}

impl SymbolTable {
    /// Creates a new empty symbol table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table over a set of nodes.
    pub fn from_nodes<'a>(nodes: impl IntoIterator<Item = &'a GraphNode>) -> Self {
        let mut table = Self::new();
        for node in nodes {
            table.insert(node);
        }
        table
    }

    /// Registers a node.
    pub fn insert(&mut self, node: &GraphNode) {
        if node.node_type() == NodeType::Module {
            self.modules.insert(node.file_path().to_string(), node.id);
            return;
        }
        let Some(name) = node.entity.name.as_ref() else {
            return;
        };
        self.by_name.entry(name.clone()).or_default().push(Symbol {
            key: node.key().clone(),
            id: node.id,
            file: node.file_path().to_string(),
        });
    }

    /// Resolves a declared name.
    ///
    /// A declaration in `from_file` wins; otherwise the one with the
    /// smallest key.
    pub fn resolve_name(&self, name: &str, from_file: &str) -> Option<NodeId> {
        self.by_name
            .get(name)?
            .iter()
            .min_by(|a, b| {
                (a.file != from_file, &a.key).cmp(&(b.file != from_file, &b.key))
            })
            .map(|s| s.id)
    }

    /// Module node of a file.
    pub fn module(&self, file: &str) -> Option<NodeId> {
        self.modules.get(file).copied()
    }

    /// Resolves an import specifier to a module node.
    pub fn resolve_import(&self, specifier: &str, from_file: &str) -> Option<NodeId> {
        let extension = Path::new(from_file)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match extension {
            "py" => self.resolve_python_import(specifier, from_file),
            "rs" => self.resolve_rust_import(specifier, from_file),
            _ => self.resolve_script_import(specifier, from_file),
        }
    }

    fn resolve_script_import(&self, specifier: &str, from_file: &str) -> Option<NodeId> {
        let base = if specifier.starts_with("./") || specifier.starts_with("../") {
            normalize(&join(parent_dir(from_file), specifier))
        } else {
            // Bare specifiers only resolve when they name a project path
            normalize(specifier)
        };

        let mut candidates = vec![base.clone()];
        for ext in SCRIPT_EXTENSIONS {
            candidates.push(format!("{}.{}", base, ext));
        }
        for ext in SCRIPT_EXTENSIONS {
            candidates.push(join(&base, &format!("index.{}", ext)));
        }

        candidates.iter().find_map(|c| self.module(c))
    }

    fn resolve_python_import(&self, specifier: &str, from_file: &str) -> Option<NodeId> {
        let dots = specifier.chars().take_while(|c| *c == '.').count();
        let dotted = &specifier[dots..];
        let relative_path = dotted.replace('.', "/");

        if dots > 0 {
            let mut dir = parent_dir(from_file).to_string();
            for _ in 1..dots {
                dir = parent_dir(&dir).to_string();
            }
            let base = normalize(&join(&dir, &relative_path));
            let candidates = if relative_path.is_empty() {
                vec![join(&base, "__init__.py")]
            } else {
                vec![format!("{}.py", base), join(&base, "__init__.py")]
            };
            return candidates.iter().find_map(|c| self.module(c));
        }

        if relative_path.is_empty() {
            return None;
        }
        let candidates = [
            format!("{}.py", relative_path),
            format!("{}/__init__.py", relative_path),
        ];
        candidates
            .iter()
            .find_map(|c| self.module(c))
            .or_else(|| candidates.iter().find_map(|c| self.module_by_suffix(c)))
    }

    fn resolve_rust_import(&self, specifier: &str, from_file: &str) -> Option<NodeId> {
        // Drop use-trees: `a::b::{C, D}` imports from `a::b`
        let path = specifier.split("::{").next().unwrap_or(specifier);
        let path = path.split(" as ").next().unwrap_or(path);

        let mut segments: Vec<&str> = path.split("::").filter(|s| !s.is_empty()).collect();
        let mut base_dir: Option<String> = None;
        match segments.first().copied() {
            Some("crate") => {
                segments.remove(0);
            }
            Some("self") => {
                segments.remove(0);
                base_dir = Some(parent_dir(from_file).to_string());
            }
            Some("super") => {
                let mut dir = parent_dir(from_file).to_string();
                while segments.first() == Some(&"super") {
                    segments.remove(0);
                    dir = parent_dir(&dir).to_string();
                }
                base_dir = Some(dir);
            }
            _ => {}
        }

        // Longest module prefix wins; trailing segments name items
        for len in (1..=segments.len()).rev() {
            let module_path = segments[..len].join("/");
            let candidates = [format!("{}.rs", module_path), format!("{}/mod.rs", module_path)];
            for candidate in &candidates {
                let found = match &base_dir {
                    Some(dir) => self.module(&normalize(&join(dir, candidate))),
                    None => self.module_by_suffix(candidate),
                };
                if found.is_some() {
                    return found;
                }
            }
        }
        None
    }

    /// The module whose path equals or ends with `/{suffix}`; smallest path
    /// on ties.
    fn module_by_suffix(&self, suffix: &str) -> Option<NodeId> {
        let slash_suffix = format!("/{}", suffix);
        self.modules
            .iter()
            .find(|(path, _)| path.as_str() == suffix || path.ends_with(&slash_suffix))
            .map(|(_, id)| *id)
    }
}

/// Turns one file's references into edges.
///
/// `ids[i]` is the stored node of candidate `i`, `None` if it was not
/// stored. Repeated (source, target, type) triples collapse into one edge
/// whose weight counts the sites; self edges are dropped.
pub fn resolve_references(table: &SymbolTable, extraction: &Extraction, ids: &[Option<NodeId>]) -> Vec<NewEdge> {
    let mut merged: BTreeMap<(NodeId, NodeId, EdgeType), (usize, Option<String>)> = BTreeMap::new();

    for reference in &extraction.references {
        let Some(source) = ids.get(reference.source).copied().flatten() else {
            continue;
        };
        let Some(target) = resolve_target(table, extraction, ids, reference) else {
            continue;
        };
        if source == target {
            continue;
        }

        let entry = merged
            .entry((source, target, reference.edge_type))
            .or_insert((0, None));
        entry.0 += 1;
        if entry.1.is_none() {
            entry.1 = reference.call_type.clone();
        }
    }

    merged
        .into_iter()
        .map(|((source, target, edge_type), (sites, call_type))| {
            let mut edge = NewEdge::new(source, target, edge_type).with_weight(sites as f64);
            edge.call_type = call_type;
            edge
        })
        .collect()
}

fn resolve_target(
    table: &SymbolTable,
    extraction: &Extraction,
    ids: &[Option<NodeId>],
    reference: &CandidateReference,
) -> Option<NodeId> {
    match &reference.target {
        ReferenceTarget::Local(index) => ids.get(*index).copied().flatten(),
        ReferenceTarget::Name(name) => table.resolve_name(name, &extraction.file_path),
        ReferenceTarget::Path(specifier) => table.resolve_import(specifier, &extraction.file_path),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Path helpers (always `/`-separated, relative to the project root)
// ─────────────────────────────────────────────────────────────────────────────

fn parent_dir(path: &str) -> &str {
    path.rfind('/').map(|i| &path[..i]).unwrap_or("")
}

fn join(dir: &str, rest: &str) -> String {
    if dir.is_empty() {
        rest.to_string()
    } else if rest.is_empty() {
        dir.to_string()
    } else {
        format!("{}/{}", dir, rest)
    }
}

/// Resolves `.` and `..` segments.
fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}
