//! Test support: a line-oriented extractor with predictable output.
//!
//! Each line of a `.ts` file is one directive:
//!
//! ```text
//! class AuthService         a CLASS declared on this line
//! fn login                  a FUNCTION declared on this line
//! call validateCredentials  CALLS from the last declaration to a name
//! use Config                USES from the last declaration to a name
//! import ./util             IMPORTS from the module to a path
//! dup login                 the same FUNCTION candidate twice
//! fail                      the whole file fails to extract
//! ```
//!
//! Every declaration is contained by the module. A declaration's source
//! text is its unindented line plus any directives under it, so editing a
//! call changes the caller's content hash while re-indenting only moves its
//! columns.

use lattice_core::{
    Annotator, CandidateEntity, CandidateReference, CodeEntity, EdgeType, ExtractError,
    Extraction, Extractor, Location, NodeType, ReferenceTarget,
};
use std::path::Path;

#[derive(Debug, Default)]
pub struct ScriptedExtractor;

impl Extractor for ScriptedExtractor {
    fn language_of(&self, path: &Path) -> Option<&'static str> {
        match path.extension()?.to_str()? {
            "ts" => Some("typescript"),
            _ => None,
        }
    }

    fn extract(&self, file_path: &str, source: &str) -> lattice_core::Result<Extraction> {
        if self.language_of(Path::new(file_path)).is_none() {
            return Err(ExtractError::UnsupportedLanguage(file_path.into()));
        }

        let mut extraction = Extraction::new(file_path, "typescript");
        extraction
            .entities
            .push(CandidateEntity::module(file_path, source));

        let mut current: Option<usize> = None;
        for (i, line) in source.lines().enumerate() {
            let line_no = i as u32 + 1;
            let mut parts = line.split_whitespace();
            let (Some(directive), arg) = (parts.next(), parts.next()) else {
                continue;
            };

            match (directive, arg) {
                ("fail", _) => return Err(ExtractError::ParserError(format!("{}: scripted failure", file_path))),
                ("fn" | "class" | "dup", Some(name)) => {
                    let node_type = if directive == "class" {
                        NodeType::Class
                    } else {
                        NodeType::Function
                    };
                    let text = line.trim_start();
                    let indent = (line.len() - text.len()) as u32;
                    let candidate = CandidateEntity::new(
                        name,
                        node_type,
                        Location::new(file_path, line_no, line_no)
                            .with_columns(indent, line.len() as u32),
                        text,
                    )
                    .with_complexity(1);
                    let copies = if directive == "dup" { 2 } else { 1 };
                    for _ in 0..copies {
                        extraction.entities.push(candidate.clone());
                        let index = extraction.entities.len() - 1;
                        extraction.references.push(CandidateReference::new(
                            0,
                            ReferenceTarget::Local(index),
                            EdgeType::Contains,
                            line_no,
                        ));
                    }
                    current = Some(extraction.entities.len() - 1);
                }
                ("call" | "use", Some(target)) => {
                    let Some(source_index) = current else {
                        continue;
                    };
                    // Body lines are part of the declaration's text
                    let entity = &mut extraction.entities[source_index];
                    entity.source_text.push('\n');
                    entity.source_text.push_str(line);
                    entity.location.end_line = line_no;

                    let edge_type = if directive == "call" {
                        EdgeType::Calls
                    } else {
                        EdgeType::Uses
                    };
                    extraction.references.push(CandidateReference::new(
                        source_index,
                        ReferenceTarget::Name(target.to_string()),
                        edge_type,
                        line_no,
                    ));
                }
                ("import", Some(path)) => {
                    extraction.references.push(CandidateReference::new(
                        0,
                        ReferenceTarget::Path(path.to_string()),
                        EdgeType::Imports,
                        line_no,
                    ));
                }
                _ => {}
            }
        }

        Ok(extraction)
    }
}

/// Describes every entity by its name.
#[derive(Debug, Default)]
pub struct NamingAnnotator;

impl Annotator for NamingAnnotator {
    fn describe(&self, entity: &CodeEntity, _source_text: &str) -> Option<String> {
        Some(format!("purpose of {}", entity.display_name()))
    }
}
