//! Non-code occurrence search.
//!
//! Source files are parsed with tree-sitter and only comment and
//! string-literal nodes are searched. Files without a known language are
//! searched as plain text. Matches must not be part of a longer identifier.

use crate::error::{CascadeError, Result};
use crate::graph::{TextKind, TextSearch};
use crate::symbol::{identifier_occurrences, Language};
use std::path::PathBuf;

/// Create a tree-sitter parser for the given language.
fn parser_for_language(language: Language) -> Result<tree_sitter::Parser> {
    let mut parser = tree_sitter::Parser::new();

    let lang = match language {
        Language::Rust => tree_sitter_rust::language(),
        Language::Python => tree_sitter_python::language(),
        Language::C => tree_sitter_c::language(),
        Language::Cpp => tree_sitter_cpp::language(),
        Language::Java => tree_sitter_java::language(),
        Language::JavaScript => tree_sitter_javascript::language(),
        Language::TypeScript => tree_sitter_typescript::language_typescript(),
    };

    parser.set_language(&lang).map_err(|e| CascadeError::Parse {
        file: PathBuf::from("<unknown>"),
        message: format!("Failed to set language for parser: {:?}", e),
    })?;

    Ok(parser)
}

/// Classify a node kind as non-code text.
fn text_kind_of(node_kind: &str) -> Option<TextKind> {
    if node_kind.contains("comment") {
        return Some(TextKind::Comment);
    }
    match node_kind {
        "string" | "string_literal" | "raw_string_literal" | "template_string" | "text_block" => {
            Some(TextKind::StringLiteral)
        }
        _ => None,
    }
}

/// Collect comment and string ranges, without descending into them.
fn collect_text_ranges(node: tree_sitter::Node, out: &mut Vec<(usize, usize, TextKind)>) {
    if let Some(kind) = text_kind_of(node.kind()) {
        out.push((node.start_byte(), node.end_byte(), kind));
        return;
    }
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            collect_text_ranges(child, out);
        }
    }
}

/// Find non-code occurrences of `needle` in one file.
///
/// Returns `(byte_start, byte_end, kind)` triples in file order.
pub fn find_text_occurrences(
    file: &str,
    content: &str,
    language: Option<Language>,
    needle: &str,
    search: TextSearch,
) -> Result<Vec<(usize, usize, TextKind)>> {
    match language {
        None => {
            if !search.plain_text_files {
                return Ok(Vec::new());
            }
            Ok(identifier_occurrences(content, needle)
                .into_iter()
                .map(|start| (start, start + needle.len(), TextKind::PlainText))
                .collect())
        }
        Some(language) => {
            if !search.comments_and_strings || !content.contains(needle) {
                return Ok(Vec::new());
            }
            let mut parser = parser_for_language(language)?;
            let tree = parser
                .parse(content, None)
                .ok_or_else(|| CascadeError::Parse {
                    file: PathBuf::from(file),
                    message: "Parse failed - no tree returned".to_string(),
                })?;

            let mut ranges = Vec::new();
            collect_text_ranges(tree.root_node(), &mut ranges);

            let mut found = Vec::new();
            for (start, end, kind) in ranges {
                let Some(segment) = content.get(start..end) else {
                    continue;
                };
                for offset in identifier_occurrences(segment, needle) {
                    found.push((start + offset, start + offset + needle.len(), kind));
                }
            }
            Ok(found)
        }
    }
}
