//! Workspace manifest: the on-disk description of a symbol graph.
//!
//! A workspace directory holds source files plus a `cascade.json` manifest
//! listing the files, the symbols declared in them and the references
//! between them. Spans are given either as byte ranges or as text anchors
//! that are located in the file content at load time:
//!
//! ```json
//! {
//!   "sources": ["src/Counter.java"],
//!   "symbols": [
//!     {"id": 1, "name": "Counter", "kind": "class", "file": "src/Counter.java",
//!      "decl": {"from": "public class Counter", "to": "\n}"}, "package": "demo"},
//!     {"id": 2, "name": "count", "kind": "field", "container": 1,
//!      "decl": {"text": "int count = 0;"}}
//!   ],
//!   "references": [
//!     {"target": 2, "file": "src/Counter.java", "at": {"text": "return count;"}}
//!   ]
//! }
//! ```
//!
//! Text anchors of a member are searched inside its container's declaration.
//! After a session is applied the manifest is rewritten with byte spans.

use crate::error::{CascadeError, Result};
use crate::graph::memory::{MemoryGraph, QualifierRecord, ReferenceRecord, SymbolRecord};
use crate::graph::SymbolGraph;
use crate::symbol::{identifier_occurrences, Location, Modifiers, SymbolId, SymbolKind};
use glob::glob;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

/// File name of the manifest inside a workspace directory.
pub const MANIFEST_FILE: &str = "cascade.json";

/// A span inside a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpanSpec {
    /// Absolute `[start, end)` byte range.
    Bytes([usize; 2]),
    /// From the `nth` occurrence of `from` through the end of the first
    /// following occurrence of `to`.
    Range {
        /// Start anchor.
        from: String,
        /// End anchor, searched after the start anchor.
        to: String,
        /// Zero-based occurrence of `from`.
        #[serde(default)]
        nth: usize,
    },
    /// The `nth` occurrence of `text`.
    Text {
        /// Exact text.
        text: String,
        /// Zero-based occurrence.
        #[serde(default)]
        nth: usize,
    },
}

/// A declared symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolSpec {
    /// Stable id; must be unique.
    pub id: u32,
    /// Declared name.
    pub name: String,
    /// Kind of symbol.
    pub kind: SymbolKind,
    /// Declaring file; defaults to the container's file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Enclosing class or method; must be listed earlier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<u32>,
    /// Whole declaration.
    pub decl: SpanSpec,
    /// Declared name span; defaults to the first occurrence of the name in the declaration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_at: Option<SpanSpec>,
    /// Modifiers.
    #[serde(default, skip_serializing_if = "is_default_modifiers")]
    pub modifiers: Modifiers,
    /// Parameter types of a method.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signature: Vec<String>,
    /// Declared type of a field or variable.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Direct supertypes of a class.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supers: Vec<u32>,
    /// Method overridden by this method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<u32>,
    /// Package of a top-level class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    /// Canonical symbol this one stands in for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias_of: Option<u32>,
}

/// Qualifier expression in front of a reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualifierSpec {
    /// Expected qualifier text; the qualifier is always located right before the `.`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Class of the qualifier's static type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<u32>,
    /// Qualifier is `this`.
    #[serde(default, rename = "this", skip_serializing_if = "is_false")]
    pub is_this: bool,
}

/// A code reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceSpec {
    /// Referenced symbol.
    pub target: u32,
    /// File containing the reference.
    pub file: String,
    /// Context span; the identifier is its first occurrence inside it.
    pub at: SpanSpec,
    /// Identifier text; defaults to the target's name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ident: Option<String>,
    /// Helper symbol the syntax resolves to when it differs from `target`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via: Option<u32>,
    /// Qualifier, if the reference is qualified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<QualifierSpec>,
    /// Inside an anonymous or local class.
    #[serde(default, skip_serializing_if = "is_false")]
    pub anonymous: bool,
    /// Implicit reference without own text; `at` is used as is.
    #[serde(default, skip_serializing_if = "is_false")]
    pub implicit: bool,
}

/// The workspace manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Source files, relative to the workspace.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Glob patterns of non-source files searched as plain text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub text_files: Vec<String>,
    /// Declared symbols.
    #[serde(default)]
    pub symbols: Vec<SymbolSpec>,
    /// Code references.
    #[serde(default)]
    pub references: Vec<ReferenceSpec>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_default_modifiers(modifiers: &Modifiers) -> bool {
    *modifiers == Modifiers::default()
}

fn manifest_error(message: impl Into<String>) -> CascadeError {
    CascadeError::InvalidManifest {
        message: message.into(),
    }
}

/// Locate a span inside `content`, searching anchors within `region`.
fn resolve_span(content: &str, region: (usize, usize), span: &SpanSpec) -> Result<(usize, usize)> {
    let (region_start, region_end) = region;
    let haystack = content
        .get(region_start..region_end)
        .ok_or_else(|| manifest_error("search region is outside the file"))?;
    match span {
        SpanSpec::Bytes([start, end]) => {
            if start > end || *end > content.len() || content.get(*start..*end).is_none() {
                return Err(manifest_error(format!("byte range {}..{} is invalid", start, end)));
            }
            Ok((*start, *end))
        }
        SpanSpec::Text { text, nth } => {
            let (offset, _) = haystack
                .match_indices(text.as_str())
                .nth(*nth)
                .ok_or_else(|| manifest_error(format!("text '{}' (#{}) not found", text, nth)))?;
            Ok((region_start + offset, region_start + offset + text.len()))
        }
        SpanSpec::Range { from, to, nth } => {
            let (offset, _) = haystack
                .match_indices(from.as_str())
                .nth(*nth)
                .ok_or_else(|| manifest_error(format!("anchor '{}' (#{}) not found", from, nth)))?;
            let after = offset + from.len();
            let end = haystack[after..]
                .find(to.as_str())
                .map(|i| after + i + to.len())
                .ok_or_else(|| {
                    manifest_error(format!("end anchor '{}' not found after '{}'", to, from))
                })?;
            Ok((region_start + offset, region_start + end))
        }
    }
}

/// Locate the qualifier expression ending right before the `.` in front of `ident_start`.
fn locate_qualifier(content: &str, ident_start: usize) -> Option<(usize, usize)> {
    let before = content[..ident_start].trim_end();
    let before = before.strip_suffix('.')?.trim_end();
    let end = before.len();
    let start = before
        .char_indices()
        .rev()
        .take_while(|(_, c)| crate::symbol::naming::is_identifier_char(*c))
        .last()
        .map(|(i, _)| i)?;
    Some((start, end))
}

struct Declared {
    file: String,
    decl: (usize, usize),
    package: String,
    name: String,
}

impl MemoryGraph {
    /// Build a graph from a manifest and the contents of its files.
    pub fn from_manifest(
        manifest: &Manifest,
        sources: &BTreeMap<String, String>,
        text_files: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let mut graph = MemoryGraph::new();
        for (path, content) in sources {
            graph.add_source_file(path, content);
        }
        for (path, content) in text_files {
            graph.add_text_file(path, content);
        }

        let mut declared: HashMap<u32, Declared> = HashMap::new();
        for spec in &manifest.symbols {
            if declared.contains_key(&spec.id) {
                return Err(manifest_error(format!("duplicate symbol id {}", spec.id)));
            }
            let parent = match spec.container {
                Some(container) => Some(declared.get(&container).ok_or_else(|| {
                    manifest_error(format!(
                        "symbol {} ({}) names container {} which is not declared before it",
                        spec.id, spec.name, container
                    ))
                })?),
                None => None,
            };
            let file = spec
                .file
                .clone()
                .or_else(|| parent.map(|p| p.file.clone()))
                .ok_or_else(|| manifest_error(format!("symbol {} has no file", spec.name)))?;
            let content = sources
                .get(&file)
                .ok_or_else(|| manifest_error(format!("{} is not a listed source file", file)))?;
            let region = match parent {
                Some(p) if p.file == file => p.decl,
                _ => (0, content.len()),
            };
            let decl = resolve_span(content, region, &spec.decl)
                .map_err(|e| manifest_error(format!("declaration of {}: {}", spec.name, e)))?;
            let name_span = match &spec.name_at {
                Some(span) => resolve_span(content, decl, span)?,
                None => {
                    let offset = identifier_occurrences(&content[decl.0..decl.1], &spec.name)
                        .first()
                        .copied()
                        .ok_or_else(|| {
                            manifest_error(format!(
                                "name '{}' does not occur in its declaration",
                                spec.name
                            ))
                        })?;
                    (decl.0 + offset, decl.0 + offset + spec.name.len())
                }
            };
            let package = spec
                .package
                .clone()
                .or_else(|| parent.map(|p| p.package.clone()))
                .unwrap_or_default();

            let record = SymbolRecord {
                name: spec.name.clone(),
                kind: spec.kind,
                container: spec.container.map(SymbolId),
                modifiers: spec.modifiers,
                decl: graph.add_marker(&file, decl.0, decl.1)?,
                name_marker: graph.add_marker(&file, name_span.0, name_span.1)?,
                signature: spec.signature.clone(),
                type_name: spec.type_name.clone(),
                supers: spec.supers.iter().copied().map(SymbolId).collect(),
                overrides: spec.overrides.map(SymbolId),
                package: package.clone(),
                alias_of: spec.alias_of.map(SymbolId),
                valid: true,
            };
            graph.insert_symbol(SymbolId(spec.id), record);
            declared.insert(
                spec.id,
                Declared {
                    file,
                    decl,
                    package,
                    name: spec.name.clone(),
                },
            );
        }

        for spec in &manifest.symbols {
            let linked = spec
                .supers
                .iter()
                .chain(spec.overrides.iter())
                .chain(spec.alias_of.iter());
            for id in linked {
                if !graph.contains_symbol(SymbolId(*id)) {
                    return Err(manifest_error(format!(
                        "symbol {} links to unknown symbol {}",
                        spec.name, id
                    )));
                }
            }
        }

        for (index, spec) in manifest.references.iter().enumerate() {
            let target = declared.get(&spec.target).ok_or_else(|| {
                manifest_error(format!("reference {} targets unknown symbol {}", index, spec.target))
            })?;
            if let Some(via) = spec.via {
                if !declared.contains_key(&via) {
                    return Err(manifest_error(format!(
                        "reference {} resolves via unknown symbol {}",
                        index, via
                    )));
                }
            }
            let content = sources.get(&spec.file).ok_or_else(|| {
                manifest_error(format!("reference {}: {} is not a listed source file", index, spec.file))
            })?;
            let context = resolve_span(content, (0, content.len()), &spec.at)
                .map_err(|e| manifest_error(format!("reference {}: {}", index, e)))?;

            let ident = if spec.implicit {
                context
            } else {
                let ident = spec.ident.as_deref().unwrap_or(&target.name);
                let offset = identifier_occurrences(&content[context.0..context.1], ident)
                    .first()
                    .copied()
                    .ok_or_else(|| {
                        manifest_error(format!(
                            "reference {}: '{}' does not occur in its context",
                            index, ident
                        ))
                    })?;
                (context.0 + offset, context.0 + offset + ident.len())
            };

            let qualifier = match &spec.qualifier {
                Some(q) => {
                    let (start, end) = locate_qualifier(content, ident.0).ok_or_else(|| {
                        manifest_error(format!("reference {}: no qualifier before the name", index))
                    })?;
                    if let Some(text) = &q.text {
                        if &content[start..end] != text {
                            return Err(manifest_error(format!(
                                "reference {}: qualifier reads '{}', expected '{}'",
                                index,
                                &content[start..end],
                                text
                            )));
                        }
                    }
                    Some(QualifierRecord {
                        marker: graph.add_marker(&spec.file, start, end)?,
                        class: q.class.map(SymbolId),
                        is_this: q.is_this,
                    })
                }
                None => None,
            };

            let marker = graph.add_marker(&spec.file, ident.0, ident.1)?;
            graph.push_reference(ReferenceRecord {
                marker,
                target: SymbolId(spec.target),
                via: spec.via.map(SymbolId),
                qualifier,
                inside_anonymous: spec.anonymous,
                implicit: spec.implicit,
            });
        }

        log::debug!(
            "built graph: {} files, {} symbols, {} references",
            sources.len() + text_files.len(),
            manifest.symbols.len(),
            manifest.references.len()
        );
        Ok(graph)
    }
}

impl Manifest {
    /// Describe the current state of a graph with byte spans.
    pub fn from_graph(graph: &MemoryGraph) -> Manifest {
        let live: Vec<(SymbolId, &SymbolRecord, Location, Location)> = graph
            .symbol_records()
            .filter(|(_, r)| r.valid)
            .filter_map(|(id, r)| {
                let decl = graph.marker_location(r.decl)?;
                let name = graph.marker_location(r.name_marker)?;
                Some((*id, r, decl, name))
            })
            .collect();
        let kept: HashSet<SymbolId> = live.iter().map(|(id, ..)| *id).collect();
        let depth = |id: SymbolId| {
            let mut depth = 0;
            let mut current = live.iter().find(|(i, ..)| *i == id).and_then(|(_, r, ..)| r.container);
            while let Some(c) = current {
                depth += 1;
                current = live.iter().find(|(i, ..)| *i == c).and_then(|(_, r, ..)| r.container);
                if depth > live.len() {
                    break;
                }
            }
            depth
        };

        let mut ordered: Vec<_> = live.iter().map(|entry| (depth(entry.0), entry)).collect();
        ordered.sort_by_key(|(depth, entry)| (*depth, entry.0));

        let symbols = ordered
            .into_iter()
            .filter(|(_, (_, r, ..))| r.container.map_or(true, |c| kept.contains(&c)))
            .map(|(_, (id, r, decl, name))| SymbolSpec {
                id: id.0,
                name: r.name.clone(),
                kind: r.kind,
                file: Some(decl.file.clone()),
                container: r.container.map(|c| c.0),
                decl: SpanSpec::Bytes([decl.byte_start, decl.byte_end]),
                name_at: Some(SpanSpec::Bytes([name.byte_start, name.byte_end])),
                modifiers: r.modifiers,
                signature: r.signature.clone(),
                type_name: r.type_name.clone(),
                supers: r
                    .supers
                    .iter()
                    .filter(|s| kept.contains(s))
                    .map(|s| s.0)
                    .collect(),
                overrides: r.overrides.filter(|o| kept.contains(o)).map(|o| o.0),
                package: (!r.package.is_empty()).then(|| r.package.clone()),
                alias_of: r.alias_of.filter(|a| kept.contains(a)).map(|a| a.0),
            })
            .collect();

        let references = graph
            .reference_records()
            .iter()
            .filter(|r| kept.contains(&r.target))
            .filter_map(|r| {
                let at = graph.marker_location(r.marker)?;
                let ident = if r.implicit { None } else { graph.text(&at) };
                let qualifier = r.qualifier.as_ref().and_then(|q| {
                    let location = graph.marker_location(q.marker)?;
                    Some(QualifierSpec {
                        text: graph.text(&location),
                        class: q.class.filter(|c| kept.contains(c)).map(|c| c.0),
                        is_this: q.is_this,
                    })
                });
                Some(ReferenceSpec {
                    target: r.target.0,
                    file: at.file.clone(),
                    at: SpanSpec::Bytes([at.byte_start, at.byte_end]),
                    ident,
                    via: r.via.filter(|v| kept.contains(v)).map(|v| v.0),
                    qualifier,
                    anonymous: r.inside_anonymous,
                    implicit: r.implicit,
                })
            })
            .collect();

        Manifest {
            sources: graph.source_files().map(str::to_string).collect(),
            text_files: graph.text_patterns().to_vec(),
            symbols,
            references,
        }
    }
}

/// Load a workspace directory: its manifest, source files and text files.
pub fn load_workspace(root: &Path) -> Result<MemoryGraph> {
    let manifest_path = root.join(MANIFEST_FILE);
    let raw = std::fs::read_to_string(&manifest_path)
        .map_err(|e| CascadeError::io(&manifest_path, e))?;
    let manifest: Manifest = serde_json::from_str(&raw)
        .map_err(|e| manifest_error(format!("{}: {}", manifest_path.display(), e)))?;

    let mut sources = BTreeMap::new();
    for source in &manifest.sources {
        let path = root.join(source);
        let content = std::fs::read_to_string(&path).map_err(|e| CascadeError::io(&path, e))?;
        sources.insert(source.clone(), content);
    }

    let mut text_files = BTreeMap::new();
    for pattern in &manifest.text_files {
        let full_pattern = root.join(pattern);
        let glob_paths = glob(&full_pattern.to_string_lossy())
            .map_err(|e| manifest_error(format!("Invalid glob pattern '{}': {}", pattern, e)))?;
        for entry in glob_paths {
            let path =
                entry.map_err(|e| CascadeError::Other(format!("Glob iteration error: {}", e)))?;
            if path.is_dir() {
                continue;
            }
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let relative = relative.to_string_lossy().replace('\\', "/");
            if relative == MANIFEST_FILE || sources.contains_key(&relative) {
                continue;
            }
            let content =
                std::fs::read_to_string(&path).map_err(|e| CascadeError::io(&path, e))?;
            text_files.insert(relative, content);
        }
    }

    let mut graph = MemoryGraph::from_manifest(&manifest, &sources, &text_files)?;
    graph.set_root(root.to_path_buf(), manifest.text_files.clone());
    log::info!(
        "loaded workspace {} ({} sources, {} text files)",
        root.display(),
        sources.len(),
        text_files.len()
    );
    Ok(graph)
}
