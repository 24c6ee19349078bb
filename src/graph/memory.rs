//! In-memory symbol graph over ropey text buffers.
//!
//! Symbols and references are registered by the manifest loader (see
//! [`crate::graph::schema`]) or programmatically. Every declaration,
//! reference and text occurrence is backed by a marker, so edits made through
//! [`GraphMutator`] keep the remaining ranges addressable.

use crate::error::{CascadeError, Result};
use crate::graph::markers::MarkerTable;
use crate::graph::persist::{compute_hash, write_atomic, FileSummary};
use crate::graph::schema::{Manifest, MANIFEST_FILE};
use crate::graph::{
    GraphMutator, MarkerId, Qualifier, RawReference, SearchScope, SymbolGraph, TextOccurrence,
    TextSearch,
};
use crate::search::text::find_text_occurrences;
use crate::symbol::{
    is_valid_identifier, Language, Location, Modifiers, SymbolId, SymbolInfo, SymbolKind,
    Visibility,
};
use ropey::Rope;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

/// What an edit touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditKind {
    /// Code: declarations, references, modifiers, parameter lists.
    Structural,
    /// Comments, string literals or non-source files.
    NonCode,
    /// A file was moved.
    FileRename,
}

/// One applied edit, in application order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JournalEntry {
    /// Position in the journal.
    pub seq: usize,
    /// File that was edited.
    pub file: String,
    /// Start byte of the replaced range at the time of the edit.
    pub byte_start: usize,
    /// Replaced text (old path for file renames).
    pub old_text: String,
    /// Inserted text (new path for file renames).
    pub new_text: String,
    /// What the edit touched.
    pub kind: EditKind,
}

#[derive(Debug, Clone)]
pub(crate) struct SourceBuffer {
    pub(crate) rope: Rope,
    pub(crate) language: Option<Language>,
    pub(crate) is_source: bool,
    original_hash: String,
    dirty: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct SymbolRecord {
    pub(crate) name: String,
    pub(crate) kind: SymbolKind,
    pub(crate) container: Option<SymbolId>,
    pub(crate) modifiers: Modifiers,
    pub(crate) decl: MarkerId,
    pub(crate) name_marker: MarkerId,
    pub(crate) signature: Vec<String>,
    pub(crate) type_name: Option<String>,
    pub(crate) supers: Vec<SymbolId>,
    pub(crate) overrides: Option<SymbolId>,
    pub(crate) package: String,
    pub(crate) alias_of: Option<SymbolId>,
    pub(crate) valid: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct QualifierRecord {
    pub(crate) marker: MarkerId,
    pub(crate) class: Option<SymbolId>,
    pub(crate) is_this: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct ReferenceRecord {
    pub(crate) marker: MarkerId,
    pub(crate) target: SymbolId,
    pub(crate) via: Option<SymbolId>,
    pub(crate) qualifier: Option<QualifierRecord>,
    pub(crate) inside_anonymous: bool,
    pub(crate) implicit: bool,
}

/// The bundled [`SymbolGraph`] implementation.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    root: Option<PathBuf>,
    text_patterns: Vec<String>,
    files: BTreeMap<String, SourceBuffer>,
    markers: RefCell<MarkerTable>,
    text_markers: RefCell<HashMap<Location, MarkerId>>,
    non_code_markers: RefCell<HashSet<MarkerId>>,
    symbols: BTreeMap<SymbolId, SymbolRecord>,
    references: Vec<ReferenceRecord>,
    journal: Vec<JournalEntry>,
    moved_files: Vec<(String, String)>,
}

impl MemoryGraph {
    /// Create an empty graph not bound to a directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Workspace directory this graph persists to, if any.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub(crate) fn set_root(&mut self, root: PathBuf, text_patterns: Vec<String>) {
        self.root = Some(root);
        self.text_patterns = text_patterns;
    }

    pub(crate) fn text_patterns(&self) -> &[String] {
        &self.text_patterns
    }

    /// Add a source file; its language is detected from the extension.
    pub fn add_source_file(&mut self, path: &str, content: &str) {
        let language = Language::from_path(Path::new(path));
        self.insert_buffer(path, content, language, true);
    }

    /// Add a non-source file searched only as plain text.
    pub fn add_text_file(&mut self, path: &str, content: &str) {
        self.insert_buffer(path, content, None, false);
    }

    fn insert_buffer(
        &mut self,
        path: &str,
        content: &str,
        language: Option<Language>,
        is_source: bool,
    ) {
        self.files.insert(
            path.to_string(),
            SourceBuffer {
                rope: Rope::from_str(content),
                language,
                is_source,
                original_hash: compute_hash(content.as_bytes()),
                dirty: false,
            },
        );
    }

    /// Paths of all files, sorted.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(|k| k.as_str())
    }

    pub(crate) fn source_files(&self) -> impl Iterator<Item = &str> {
        self.files
            .iter()
            .filter(|(_, b)| b.is_source)
            .map(|(k, _)| k.as_str())
    }

    /// Current content of a file.
    pub fn file_content(&self, path: &str) -> Option<String> {
        self.files.get(path).map(|b| b.rope.to_string())
    }

    /// All edits applied so far.
    pub fn journal(&self) -> &[JournalEntry] {
        &self.journal
    }

    /// SHA-256 over every file path and content; equal fingerprints mean
    /// equal graph text.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (path, buffer) in &self.files {
            hasher.update(path.as_bytes());
            hasher.update([0u8]);
            for chunk in buffer.rope.chunks() {
                hasher.update(chunk.as_bytes());
            }
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }

    /// Register a marker over `[start, end)` of `file`.
    pub(crate) fn add_marker(&self, file: &str, start: usize, end: usize) -> Result<MarkerId> {
        let buffer = self.buffer(file)?;
        if start > end || !is_char_boundary(&buffer.rope, start) || !is_char_boundary(&buffer.rope, end)
        {
            return Err(CascadeError::InvalidManifest {
                message: format!("range {}..{} is not valid in {}", start, end, file),
            });
        }
        Ok(self.markers.borrow_mut().add(file, start, end))
    }

    pub(crate) fn insert_symbol(&mut self, id: SymbolId, record: SymbolRecord) {
        self.symbols.insert(id, record);
    }

    pub(crate) fn push_reference(&mut self, record: ReferenceRecord) {
        self.references.push(record);
    }

    pub(crate) fn symbol_records(&self) -> impl Iterator<Item = (&SymbolId, &SymbolRecord)> {
        self.symbols.iter()
    }

    pub(crate) fn reference_records(&self) -> &[ReferenceRecord] {
        &self.references
    }

    pub(crate) fn contains_symbol(&self, id: SymbolId) -> bool {
        self.symbols.contains_key(&id)
    }

    fn buffer(&self, file: &str) -> Result<&SourceBuffer> {
        self.files.get(file).ok_or_else(|| CascadeError::Other(format!("Unknown file: {}", file)))
    }

    fn canonical(&self, id: SymbolId) -> SymbolId {
        let mut current = id;
        for _ in 0..=self.symbols.len() {
            match self.symbols.get(&current).and_then(|r| r.alias_of) {
                Some(next) => current = next,
                None => break,
            }
        }
        current
    }

    fn live_record(&self, id: SymbolId) -> Option<&SymbolRecord> {
        self.symbols
            .get(&id)
            .filter(|r| r.valid && r.alias_of.is_none())
    }

    fn qualified_name(&self, id: SymbolId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(cur) = current {
            let Some(record) = self.symbols.get(&cur) else {
                break;
            };
            parts.push(record.name.clone());
            current = record.container;
            if parts.len() > self.symbols.len() {
                break;
            }
        }
        parts.reverse();
        parts.join(".")
    }

    fn top_level(&self, id: SymbolId) -> SymbolId {
        let mut current = id;
        for _ in 0..=self.symbols.len() {
            match self.symbols.get(&current).and_then(|r| r.container) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        current
    }

    fn package_of_symbol(&self, id: SymbolId) -> String {
        self.symbols
            .get(&self.top_level(id))
            .map(|r| r.package.clone())
            .unwrap_or_default()
    }

    /// Innermost live symbol of `kind` filter whose declaration contains `location`.
    fn innermost(&self, location: &Location, accept: impl Fn(SymbolKind) -> bool) -> Option<SymbolId> {
        let markers = self.markers.borrow();
        self.symbols
            .iter()
            .filter(|(_, r)| r.valid && r.alias_of.is_none() && accept(r.kind))
            .filter_map(|(id, r)| markers.location(r.decl).map(|loc| (*id, loc)))
            .filter(|(_, loc)| loc.contains(location))
            .min_by_key(|(_, loc)| loc.len())
            .map(|(id, _)| id)
    }

    fn package_of_location(&self, location: &Location) -> String {
        if let Some(class) = self.innermost(location, |k| k == SymbolKind::Class) {
            return self.package_of_symbol(class);
        }
        let markers = self.markers.borrow();
        self.symbols
            .values()
            .filter(|r| r.container.is_none() && r.valid)
            .find(|r| {
                markers
                    .location(r.decl)
                    .is_some_and(|loc| loc.file == location.file)
            })
            .map(|r| r.package.clone())
            .unwrap_or_default()
    }

    fn in_scope(&self, location: &Location, scope: &SearchScope) -> bool {
        match scope {
            SearchScope::Project => true,
            SearchScope::File(file) => &location.file == file,
            SearchScope::Package(package) => &self.package_of_location(location) == package,
        }
    }

    fn raw_reference(&self, record: &ReferenceRecord) -> Option<RawReference> {
        let markers = self.markers.borrow();
        let location = markers.location(record.marker)?;
        let qualifier = match &record.qualifier {
            Some(q) => Some(Qualifier {
                marker: q.marker,
                location: markers.location(q.marker)?,
                class: q.class,
                is_this: q.is_this,
            }),
            None => None,
        };
        Some(RawReference {
            marker: record.marker,
            location,
            target: record.target,
            resolved: record.via.unwrap_or(record.target),
            qualifier,
            inside_anonymous: record.inside_anonymous,
            implicit: record.implicit,
        })
    }

    fn describe(&self, id: SymbolId) -> String {
        self.resolve(id)
            .map(|info| info.describe())
            .unwrap_or_else(|| format!("symbol {}", id))
    }

    fn require(&self, id: SymbolId) -> Result<SymbolInfo> {
        self.resolve(id)
            .ok_or_else(|| CascadeError::UnresolvableSymbol {
                symbol: format!("symbol {}", id),
            })
    }

    fn invalid(&self, id: SymbolId, reason: impl Into<String>) -> CascadeError {
        CascadeError::InvalidOperation {
            symbol: self.describe(id),
            reason: reason.into(),
        }
    }

    /// Replace `[start, end)` of `file`, shifting markers and journaling the edit.
    fn edit(
        &mut self,
        file: &str,
        start: usize,
        end: usize,
        replacement: &str,
        kind: EditKind,
    ) -> Result<()> {
        let buffer = self
            .files
            .get_mut(file)
            .ok_or_else(|| CascadeError::Other(format!("Unknown file: {}", file)))?;
        if start > end
            || end > buffer.rope.len_bytes()
            || !is_char_boundary(&buffer.rope, start)
            || !is_char_boundary(&buffer.rope, end)
        {
            return Err(CascadeError::StaleUsage {
                file: file.to_string(),
                start,
                end,
                reason: "range is outside the current file content".to_string(),
            });
        }

        let start_char = buffer.rope.byte_to_char(start);
        let end_char = buffer.rope.byte_to_char(end);
        let old_text = buffer.rope.slice(start_char..end_char).to_string();
        buffer.rope.remove(start_char..end_char);
        buffer.rope.insert(start_char, replacement);
        buffer.dirty = true;

        self.markers
            .get_mut()
            .apply_edit(file, start, end, replacement.len());

        log::debug!(
            "edit {}:{}..{} '{}' -> '{}'",
            file,
            start,
            end,
            old_text,
            replacement
        );
        self.journal.push(JournalEntry {
            seq: self.journal.len(),
            file: file.to_string(),
            byte_start: start,
            old_text,
            new_text: replacement.to_string(),
            kind,
        });
        Ok(())
    }

    fn decl_location(&self, id: SymbolId) -> Result<Location> {
        let record = self
            .live_record(id)
            .ok_or_else(|| CascadeError::UnresolvableSymbol {
                symbol: format!("symbol {}", id),
            })?;
        self.markers
            .borrow()
            .location(record.decl)
            .ok_or_else(|| CascadeError::UnresolvableSymbol {
                symbol: self.qualified_name(id),
            })
    }

    /// Insert a modifier keyword after a leading visibility keyword.
    fn insert_modifier(&mut self, id: SymbolId, keyword: &str) -> Result<()> {
        let decl = self.decl_location(id)?;
        let text = self.text(&decl).unwrap_or_default();
        let offset = ["public ", "protected ", "private "]
            .iter()
            .find(|kw| text.starts_with(*kw))
            .map(|kw| kw.len())
            .unwrap_or(0);
        let at = decl.byte_start + offset;
        self.edit(&decl.file, at, at, &format!("{} ", keyword), EditKind::Structural)?;
        if offset == 0 {
            if let Some(record) = self.symbols.get(&id) {
                let decl_marker = record.decl;
                self.markers.get_mut().extend_start(decl_marker, at);
            }
        }
        Ok(())
    }

    /// Write every modified file back to the workspace directory, then
    /// rewrite the manifest with the current spans.
    pub fn persist(&mut self) -> Result<Vec<FileSummary>> {
        let root = self
            .root
            .clone()
            .ok_or_else(|| CascadeError::Other("Graph is not bound to a workspace".to_string()))?;
        let suffix = uuid::Uuid::new_v4().simple().to_string();

        let mut summaries = Vec::new();
        for (path, buffer) in self.files.iter_mut().filter(|(_, b)| b.dirty) {
            let content = buffer.rope.to_string();
            let after_hash = compute_hash(content.as_bytes());
            write_atomic(&root.join(path), content.as_bytes(), &suffix)?;
            log::info!("wrote {}", path);
            summaries.push(FileSummary {
                file: path.clone(),
                before_hash: std::mem::replace(&mut buffer.original_hash, after_hash.clone()),
                after_hash,
            });
            buffer.dirty = false;
        }

        for (from, _) in self.moved_files.drain(..) {
            let old_path = root.join(&from);
            if old_path.exists() && !self.files.contains_key(&from) {
                std::fs::remove_file(&old_path).map_err(|e| CascadeError::io(&old_path, e))?;
            }
        }

        let manifest = Manifest::from_graph(self);
        let json = serde_json::to_string_pretty(&manifest)?;
        write_atomic(&root.join(MANIFEST_FILE), json.as_bytes(), &suffix)?;
        Ok(summaries)
    }
}

fn is_char_boundary(rope: &Rope, byte: usize) -> bool {
    if byte > rope.len_bytes() {
        return false;
    }
    rope.char_to_byte(rope.byte_to_char(byte)) == byte
}

impl SymbolGraph for MemoryGraph {
    fn resolve(&self, id: SymbolId) -> Option<SymbolInfo> {
        let id = self.canonical(id);
        let record = self.live_record(id)?;
        let (location, name_location) = {
            let markers = self.markers.borrow();
            (markers.location(record.decl)?, markers.location(record.name_marker)?)
        };
        let language = self.files.get(&location.file).and_then(|b| b.language);
        Some(SymbolInfo {
            id,
            name: record.name.clone(),
            qualified_name: self.qualified_name(id),
            kind: record.kind,
            container: record.container,
            modifiers: record.modifiers,
            language,
            location,
            name_location,
            signature: record.signature.clone(),
            type_name: record.type_name.clone(),
            supers: record.supers.clone(),
            overrides: record.overrides,
            package: self.package_of_symbol(id),
        })
    }

    fn find_all(&self, qualified_name: &str) -> Vec<SymbolId> {
        self.symbols
            .keys()
            .copied()
            .filter(|id| self.is_valid(*id) && self.live_record(*id).is_some())
            .filter(|id| self.qualified_name(*id) == qualified_name)
            .collect()
    }

    fn symbols(&self) -> Vec<SymbolId> {
        self.symbols
            .keys()
            .copied()
            .filter(|id| self.live_record(*id).is_some() && self.is_valid(*id))
            .collect()
    }

    fn members(&self, container: SymbolId) -> Vec<SymbolId> {
        let container = self.canonical(container);
        self.symbols
            .iter()
            .filter(|(_, r)| r.container == Some(container))
            .map(|(id, _)| *id)
            .filter(|id| self.live_record(*id).is_some() && self.is_valid(*id))
            .collect()
    }

    fn references<'a>(
        &'a self,
        id: SymbolId,
        scope: &SearchScope,
    ) -> Box<dyn Iterator<Item = RawReference> + 'a> {
        let id = self.canonical(id);
        let scope = scope.clone();
        Box::new(
            self.references
                .iter()
                .filter(move |r| self.canonical(r.target) == id)
                .filter_map(move |r| self.raw_reference(r))
                .map(move |mut raw| {
                    raw.target = id;
                    raw
                })
                .filter(move |raw| self.in_scope(&raw.location, &scope)),
        )
    }

    fn references_within(&self, container: SymbolId) -> Vec<RawReference> {
        let Ok(decl) = self.decl_location(self.canonical(container)) else {
            return Vec::new();
        };
        self.references
            .iter()
            .filter_map(|r| self.raw_reference(r))
            .filter(|raw| decl.contains(&raw.location))
            .collect()
    }

    fn overriders(&self, method: SymbolId) -> Vec<SymbolId> {
        let method = self.canonical(method);
        let mut found = Vec::new();
        for (id, record) in &self.symbols {
            if record.kind != SymbolKind::Method || *id == method || !self.is_valid(*id) {
                continue;
            }
            let mut current = record.overrides;
            let mut steps = 0;
            while let Some(overridden) = current {
                if self.canonical(overridden) == method {
                    found.push(*id);
                    break;
                }
                steps += 1;
                if steps > self.symbols.len() {
                    break;
                }
                current = self.symbols.get(&overridden).and_then(|r| r.overrides);
            }
        }
        found
    }

    fn text_occurrences(&self, needle: &str, search: TextSearch) -> Vec<TextOccurrence> {
        let mut occurrences = Vec::new();
        if !search.is_enabled() || needle.is_empty() {
            return occurrences;
        }
        for (path, buffer) in &self.files {
            let content = buffer.rope.to_string();
            let found = match find_text_occurrences(path, &content, buffer.language, needle, search)
            {
                Ok(found) => found,
                Err(e) => {
                    log::warn!("text search skipped {}: {}", path, e);
                    continue;
                }
            };
            for (start, end, kind) in found {
                let location = Location::new(path.clone(), start, end);
                let marker = self.text_marker(&location);
                occurrences.push(TextOccurrence {
                    marker,
                    location,
                    kind,
                });
            }
        }
        occurrences
    }

    fn is_accessible(&self, member: SymbolId, from: &Location) -> bool {
        let Some(info) = self.resolve(member) else {
            return false;
        };
        if info.kind == SymbolKind::Variable {
            return true;
        }
        match info.modifiers.visibility {
            Visibility::Public => true,
            Visibility::Private => self
                .innermost(from, |k| k == SymbolKind::Class)
                .is_some_and(|class| self.top_level(class) == self.top_level(info.id)),
            Visibility::Package => self.package_of_location(from) == info.package,
            Visibility::Protected => {
                if self.package_of_location(from) == info.package {
                    return true;
                }
                let Some(base) = info.container else {
                    return false;
                };
                let mut class = self.innermost(from, |k| k == SymbolKind::Class);
                while let Some(c) = class {
                    if self.is_inheritor_or_self(c, base) {
                        return true;
                    }
                    class = self.symbols.get(&c).and_then(|r| r.container);
                }
                false
            }
        }
    }

    fn is_inheritor_or_self(&self, class: SymbolId, base: SymbolId) -> bool {
        let base = self.canonical(base);
        let mut queue = VecDeque::from([self.canonical(class)]);
        let mut seen = HashSet::new();
        while let Some(current) = queue.pop_front() {
            if current == base {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(record) = self.symbols.get(&current) {
                queue.extend(record.supers.iter().map(|s| self.canonical(*s)));
            }
        }
        false
    }

    fn enclosing_member(&self, location: &Location) -> Option<SymbolId> {
        self.innermost(location, |k| k.is_member())
    }

    fn marker_location(&self, marker: MarkerId) -> Option<Location> {
        self.markers.borrow().location(marker)
    }

    fn text(&self, location: &Location) -> Option<String> {
        let buffer = self.files.get(&location.file)?;
        let rope = &buffer.rope;
        if location.byte_start > location.byte_end
            || !is_char_boundary(rope, location.byte_start)
            || !is_char_boundary(rope, location.byte_end)
        {
            return None;
        }
        let start = rope.byte_to_char(location.byte_start);
        let end = rope.byte_to_char(location.byte_end);
        Some(rope.slice(start..end).to_string())
    }
}

impl MemoryGraph {
    /// Insert `text` as the first entry of the parenthesised list right after `name`.
    fn insert_first_in_list(&mut self, name: &Location, text: &str) -> Result<()> {
        let content = self.file_content(&name.file).unwrap_or_default();
        let open = content
            .get(name.byte_end..)
            .and_then(|rest| {
                rest.char_indices()
                    .find(|(_, c)| !c.is_whitespace())
                    .filter(|(_, c)| *c == '(')
            })
            .map(|(i, _)| name.byte_end + i + 1)
            .ok_or_else(|| CascadeError::StaleUsage {
                file: name.file.clone(),
                start: name.byte_start,
                end: name.byte_end,
                reason: "no parenthesised list follows the name".to_string(),
            })?;
        let empty = content[open..]
            .chars()
            .find(|c| !c.is_whitespace())
            .is_some_and(|c| c == ')');
        let insertion = if empty {
            text.to_string()
        } else {
            format!("{}, ", text)
        };
        self.edit(&name.file, open, open, &insertion, EditKind::Structural)
    }

    /// Marker for a text occurrence; repeated searches reuse live markers.
    fn text_marker(&self, location: &Location) -> MarkerId {
        let existing = self.text_markers.borrow().get(location).copied();
        if let Some(marker) = existing {
            if self.marker_location(marker).as_ref() == Some(location) {
                return marker;
            }
        }
        let marker =
            self.markers
                .borrow_mut()
                .add(&location.file, location.byte_start, location.byte_end);
        self.text_markers.borrow_mut().insert(location.clone(), marker);
        self.non_code_markers.borrow_mut().insert(marker);
        marker
    }
}

impl GraphMutator for MemoryGraph {
    fn as_graph(&self) -> &dyn SymbolGraph {
        self
    }

    fn rename_symbol(&mut self, id: SymbolId, new_name: &str) -> Result<()> {
        let info = self.require(id)?;
        if !is_valid_identifier(info.language, new_name) {
            return Err(self.invalid(
                info.id,
                format!("'{}' is not a valid identifier", new_name),
            ));
        }
        if info.name == new_name {
            return Ok(());
        }
        let current = self.text(&info.name_location).unwrap_or_default();
        if current != info.name {
            return Err(self.invalid(
                info.id,
                format!("declaration reads '{}', expected '{}'", current, info.name),
            ));
        }
        let loc = info.name_location;
        self.edit(&loc.file, loc.byte_start, loc.byte_end, new_name, EditKind::Structural)?;
        if let Some(record) = self.symbols.get_mut(&info.id) {
            record.name = new_name.to_string();
        }
        Ok(())
    }

    fn replace_marker(
        &mut self,
        marker: MarkerId,
        expected: &str,
        replacement: &str,
    ) -> Result<()> {
        let Some(location) = self.marker_location(marker) else {
            let last = self.markers.borrow().last_known(marker);
            let (file, start, end) = last
                .map(|l| (l.file, l.byte_start, l.byte_end))
                .unwrap_or_else(|| ("<unknown>".to_string(), 0, 0));
            return Err(CascadeError::StaleUsage {
                file,
                start,
                end,
                reason: "range was overwritten by an earlier edit".to_string(),
            });
        };
        let current = self.text(&location).unwrap_or_default();
        if current != expected {
            return Err(CascadeError::StaleUsage {
                file: location.file,
                start: location.byte_start,
                end: location.byte_end,
                reason: format!("expected '{}', found '{}'", expected, current),
            });
        }
        let kind = if self.non_code_markers.borrow().contains(&marker) {
            EditKind::NonCode
        } else {
            EditKind::Structural
        };
        self.edit(
            &location.file,
            location.byte_start,
            location.byte_end,
            replacement,
            kind,
        )
    }

    fn prepend_argument(&mut self, marker: MarkerId, argument: &str) -> Result<()> {
        let location = self
            .marker_location(marker)
            .ok_or_else(|| CascadeError::StaleUsage {
                file: "<unknown>".to_string(),
                start: 0,
                end: 0,
                reason: "call site was overwritten by an earlier edit".to_string(),
            })?;
        self.insert_first_in_list(&location, argument)
    }

    fn add_parameter(&mut self, id: SymbolId, parameter: &str) -> Result<()> {
        let info = self.require(id)?;
        if info.kind != SymbolKind::Method {
            return Err(self.invalid(info.id, "only methods declare parameters"));
        }
        self.insert_first_in_list(&info.name_location, parameter)
    }

    fn make_static(&mut self, id: SymbolId) -> Result<()> {
        let info = self.require(id)?;
        if info.is_static() {
            return Ok(());
        }
        self.insert_modifier(info.id, "static")?;
        if let Some(record) = self.symbols.get_mut(&info.id) {
            record.modifiers.is_static = true;
        }
        Ok(())
    }

    fn make_abstract(&mut self, id: SymbolId) -> Result<()> {
        let info = self.require(id)?;
        if info.kind != SymbolKind::Method {
            return Err(self.invalid(info.id, "only methods can be made abstract"));
        }
        if info.is_abstract() {
            return Ok(());
        }
        let text = self.text(&info.location).unwrap_or_default();
        let body = text
            .find('{')
            .ok_or_else(|| self.invalid(info.id, "declaration has no body"))?;
        let body = text[..body].trim_end().len();
        self.edit(
            &info.location.file,
            info.location.byte_start + body,
            info.location.byte_end,
            ";",
            EditKind::Structural,
        )?;
        self.insert_modifier(info.id, "abstract")?;
        if let Some(record) = self.symbols.get_mut(&info.id) {
            record.modifiers.is_abstract = true;
        }
        Ok(())
    }

    fn copy_member(&mut self, member: SymbolId, target: SymbolId) -> Result<SymbolId> {
        let info = self.require(member)?;
        let target_info = self.require(target)?;
        if target_info.kind != SymbolKind::Class {
            return Err(self.invalid(target_info.id, "members can only be copied into a class"));
        }
        let member_text = self.text(&info.location).unwrap_or_default();
        let member_content = self.file_content(&info.location.file).unwrap_or_default();
        let line_start = member_content[..info.location.byte_start]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        let indent = &member_content[line_start..info.location.byte_start];
        let indent = if indent.chars().all(char::is_whitespace) {
            indent.to_string()
        } else {
            "    ".to_string()
        };

        let target_text = self.text(&target_info.location).unwrap_or_default();
        let close = target_text
            .rfind('}')
            .ok_or_else(|| self.invalid(target_info.id, "class body has no closing brace"))?;
        let at = target_info.location.byte_start + close;
        let prefix = if target_text[..close].ends_with('\n') {
            ""
        } else {
            "\n"
        };
        let insertion = format!("{}{}{}\n", prefix, indent, member_text);
        let file = target_info.location.file.clone();
        self.edit(&file, at, at, &insertion, EditKind::Structural)?;

        let decl_start = at + prefix.len() + indent.len();
        let name_offset = info.name_location.byte_start - info.location.byte_start;
        let decl = self.add_marker(&file, decl_start, decl_start + member_text.len())?;
        let name_start = decl_start + name_offset;
        let name_marker = self.add_marker(&file, name_start, name_start + info.name.len())?;

        let source = self
            .symbols
            .get(&info.id)
            .cloned()
            .ok_or_else(|| self.invalid(info.id, "symbol record missing"))?;
        let new_id = SymbolId(self.symbols.keys().last().map(|id| id.0 + 1).unwrap_or(0));
        self.symbols.insert(
            new_id,
            SymbolRecord {
                container: Some(target_info.id),
                decl,
                name_marker,
                valid: true,
                alias_of: None,
                ..source
            },
        );
        log::debug!("copied {} into {} as {}", info.describe(), target_info.describe(), new_id);
        Ok(new_id)
    }

    fn delete_member(&mut self, member: SymbolId) -> Result<()> {
        let info = self.require(member)?;
        let content = self.file_content(&info.location.file).unwrap_or_default();
        let line_start = content[..info.location.byte_start]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        let start = if content[line_start..info.location.byte_start]
            .chars()
            .all(char::is_whitespace)
        {
            line_start
        } else {
            info.location.byte_start
        };
        let end = if content[info.location.byte_end..].starts_with('\n') {
            info.location.byte_end + 1
        } else {
            info.location.byte_end
        };
        self.edit(&info.location.file, start, end, "", EditKind::Structural)?;

        let mut doomed = vec![info.id];
        while let Some(id) = doomed.pop() {
            if let Some(record) = self.symbols.get_mut(&id) {
                record.valid = false;
            }
            doomed.extend(
                self.symbols
                    .iter()
                    .filter(|(_, r)| r.container == Some(id) && r.valid)
                    .map(|(child, _)| *child),
            );
        }
        Ok(())
    }

    fn rename_file(&mut self, from: &str, to: &str) -> Result<()> {
        if from == to {
            return Ok(());
        }
        if self.files.contains_key(to) {
            return Err(CascadeError::InvalidOperation {
                symbol: format!("file {}", from),
                reason: format!("{} already exists", to),
            });
        }
        let mut buffer = self
            .files
            .remove(from)
            .ok_or_else(|| CascadeError::Other(format!("Unknown file: {}", from)))?;
        buffer.dirty = true;
        self.files.insert(to.to_string(), buffer);
        self.markers.get_mut().rename_file(from, to);
        self.text_markers.get_mut().clear();
        self.moved_files.push((from.to_string(), to.to_string()));
        self.journal.push(JournalEntry {
            seq: self.journal.len(),
            file: to.to_string(),
            byte_start: 0,
            old_text: from.to_string(),
            new_text: to.to_string(),
            kind: EditKind::FileRename,
        });
        log::info!("moved {} -> {}", from, to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "public class A {\n    int count = 0;\n    int get() { return count; }\n}\n";

    fn graph() -> (MemoryGraph, SymbolId, SymbolId, SymbolId) {
        let mut graph = MemoryGraph::new();
        graph.add_source_file("A.java", SOURCE);
        let class = SymbolId(1);
        let field = SymbolId(2);
        let method = SymbolId(3);
        fn add(
            g: &mut MemoryGraph,
            id: SymbolId,
            name: &str,
            kind: SymbolKind,
            container: Option<SymbolId>,
            decl: &str,
        ) {
            let s = SOURCE.find(decl).unwrap();
            let e = s + decl.len();
            let offset = decl.find(name).unwrap();
            let record = SymbolRecord {
                name: name.to_string(),
                kind,
                container,
                modifiers: Modifiers::default(),
                decl: g.add_marker("A.java", s, e).unwrap(),
                name_marker: g
                    .add_marker("A.java", s + offset, s + offset + name.len())
                    .unwrap(),
                signature: Vec::new(),
                type_name: None,
                supers: Vec::new(),
                overrides: None,
                package: "demo".to_string(),
                alias_of: None,
                valid: true,
            };
            g.insert_symbol(id, record);
        }
        add(&mut graph, class, "A", SymbolKind::Class, None, SOURCE.trim_end());
        add(&mut graph, field, "count", SymbolKind::Field, Some(class), "int count = 0;");
        add(&mut graph, method, "get", SymbolKind::Method, Some(class), "int get() { return count; }");
        let use_start = SOURCE.rfind("count").unwrap();
        let marker = graph.add_marker("A.java", use_start, use_start + 5).unwrap();
        graph.push_reference(ReferenceRecord {
            marker,
            target: field,
            via: None,
            qualifier: None,
            inside_anonymous: false,
            implicit: false,
        });
        (graph, class, field, method)
    }

    #[test]
    fn test_rename_keeps_later_reference_addressable() {
        let (mut graph, _, field, _) = graph();
        let reference = graph
            .references(field, &SearchScope::Project)
            .next()
            .unwrap();
        graph.rename_symbol(field, "total").unwrap();
        graph.replace_marker(reference.marker, "count", "total").unwrap();
        let content = graph.file_content("A.java").unwrap();
        assert!(content.contains("int total = 0;"));
        assert!(content.contains("return total;"));
        assert_eq!(graph.resolve(field).unwrap().qualified_name, "A.total");
        assert_eq!(graph.journal().len(), 2);
    }

    #[test]
    fn test_replace_marker_rejects_mismatched_text() {
        let (mut graph, _, field, _) = graph();
        let reference = graph.references(field, &SearchScope::Project).next().unwrap();
        let err = graph.replace_marker(reference.marker, "other", "x").unwrap_err();
        assert!(matches!(err, CascadeError::StaleUsage { .. }));
        assert!(graph.journal().is_empty());
    }

    #[test]
    fn test_rename_rejects_keyword() {
        let (mut graph, _, field, _) = graph();
        let before = graph.fingerprint();
        assert!(matches!(
            graph.rename_symbol(field, "class"),
            Err(CascadeError::InvalidOperation { .. })
        ));
        assert_eq!(graph.fingerprint(), before);
    }

    #[test]
    fn test_make_static_and_prepend_parameter() {
        let (mut graph, _, _, method) = graph();
        graph.add_parameter(method, "A a").unwrap();
        graph.make_static(method).unwrap();
        let content = graph.file_content("A.java").unwrap();
        assert!(content.contains("static int get(A a) {"), "{}", content);
        assert!(graph.resolve(method).unwrap().is_static());
        let decl = graph.resolve(method).unwrap().location;
        assert!(graph.text(&decl).unwrap().starts_with("static int get"));
    }

    #[test]
    fn test_delete_member_invalidates_symbol_and_references() {
        let (mut graph, class, _, method) = graph();
        graph.delete_member(method).unwrap();
        assert!(graph.resolve(method).is_none());
        assert_eq!(graph.references_within(class).len(), 0);
        assert_eq!(
            graph.file_content("A.java").unwrap(),
            "public class A {\n    int count = 0;\n}\n"
        );
    }

    #[test]
    fn test_text_markers_are_reused() {
        let mut graph = MemoryGraph::new();
        graph.add_text_file("NOTES.txt", "count and count");
        let search = TextSearch {
            comments_and_strings: false,
            plain_text_files: true,
        };
        let first = graph.text_occurrences("count", search);
        let second = graph.text_occurrences("count", search);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }
}
