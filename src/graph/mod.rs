//! The symbol graph the engine works against.
//!
//! The engine never parses source text itself. It consumes the capabilities
//! below: symbol resolution, reference and text search, accessibility and
//! inheritance queries ([`SymbolGraph`]) and atomic single-edit mutation
//! primitives ([`GraphMutator`]). [`memory::MemoryGraph`] is the bundled
//! implementation over in-memory text buffers.

pub(crate) mod markers;
pub mod memory;
pub(crate) mod persist;
pub mod schema;

use crate::error::{CascadeError, Result};
use crate::symbol::{Location, SymbolId, SymbolInfo, SymbolKind, Visibility};
use serde::{Deserialize, Serialize};

pub use memory::{EditKind, JournalEntry, MemoryGraph};
pub use persist::FileSummary;
pub use schema::{load_workspace, Manifest, MANIFEST_FILE};

/// Handle to a range that follows edits.
///
/// References and text occurrences are addressed through markers so that
/// earlier edits in the same file do not invalidate later ones.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct MarkerId(pub u32);

/// Where a reference search looks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchScope {
    /// Every file of the graph.
    Project,
    /// Files whose top-level declarations belong to the package.
    Package(String),
    /// A single file.
    File(String),
}

impl SearchScope {
    /// Effective use scope of a symbol, derived from its visibility.
    pub fn for_symbol(info: &SymbolInfo) -> Self {
        if info.kind == SymbolKind::Variable {
            return SearchScope::File(info.location.file.clone());
        }
        match info.modifiers.visibility {
            Visibility::Private => SearchScope::File(info.location.file.clone()),
            Visibility::Package => SearchScope::Package(info.package.clone()),
            Visibility::Protected | Visibility::Public => SearchScope::Project,
        }
    }
}

/// Qualifier expression in front of a reference (`counter` in `counter.count`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Qualifier {
    /// Marker over the qualifier text.
    pub marker: MarkerId,
    /// Location of the qualifier text at search time.
    pub location: Location,
    /// Class of the qualifier's static type, when known.
    pub class: Option<SymbolId>,
    /// Whether the qualifier is `this` (or `self`).
    pub is_this: bool,
}

/// A raw code reference produced by a reference search.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReference {
    /// Marker over the referencing identifier.
    pub marker: MarkerId,
    /// Location of the identifier at search time.
    pub location: Location,
    /// The symbol the search was for.
    pub target: SymbolId,
    /// The symbol the syntax physically resolves to (a helper such as a
    /// synthetic accessor when it differs from `target`).
    pub resolved: SymbolId,
    /// Qualifier expression, if any.
    pub qualifier: Option<Qualifier>,
    /// Reference lies inside an anonymous or local class.
    pub inside_anonymous: bool,
    /// Reference is implicit (no text of its own, e.g. implicit super call).
    pub implicit: bool,
}

/// Kind of non-code text occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextKind {
    /// Inside a comment of a source file.
    Comment,
    /// Inside a string literal of a source file.
    StringLiteral,
    /// In a non-source file.
    PlainText,
}

/// Which non-code places a text search covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextSearch {
    /// Comments and string literals of source files.
    pub comments_and_strings: bool,
    /// Non-source files.
    pub plain_text_files: bool,
}

impl TextSearch {
    /// Whether the search covers anything at all.
    pub fn is_enabled(&self) -> bool {
        self.comments_and_strings || self.plain_text_files
    }
}

/// An occurrence of a name outside code.
#[derive(Debug, Clone, PartialEq)]
pub struct TextOccurrence {
    /// Marker over the occurrence.
    pub marker: MarkerId,
    /// Location at search time.
    pub location: Location,
    /// Where the occurrence was found.
    pub kind: TextKind,
}

/// Read-only capabilities of the symbol graph.
pub trait SymbolGraph {
    /// Resolve a symbol to its current snapshot; `None` if it is no longer valid.
    fn resolve(&self, id: SymbolId) -> Option<SymbolInfo>;

    /// Whether a symbol can still be resolved.
    fn is_valid(&self, id: SymbolId) -> bool {
        self.resolve(id).is_some()
    }

    /// All valid symbols whose qualified name equals `qualified_name`.
    fn find_all(&self, qualified_name: &str) -> Vec<SymbolId>;

    /// All valid symbols, in declaration order.
    fn symbols(&self) -> Vec<SymbolId>;

    /// Direct members of a class (and variables of a method).
    fn members(&self, container: SymbolId) -> Vec<SymbolId>;

    /// Lazily enumerate code references to `id` inside `scope`.
    fn references<'a>(
        &'a self,
        id: SymbolId,
        scope: &SearchScope,
    ) -> Box<dyn Iterator<Item = RawReference> + 'a>;

    /// All code references located inside the declaration of `container`.
    fn references_within(&self, container: SymbolId) -> Vec<RawReference>;

    /// Methods overriding `method`, directly or transitively.
    fn overriders(&self, method: SymbolId) -> Vec<SymbolId>;

    /// Occurrences of `needle` in comments, strings and non-source files.
    fn text_occurrences(&self, needle: &str, search: TextSearch) -> Vec<TextOccurrence>;

    /// Whether `member` can be accessed from `from` under its current modifiers.
    fn is_accessible(&self, member: SymbolId, from: &Location) -> bool;

    /// Whether `class` is `base` or inherits from it.
    fn is_inheritor_or_self(&self, class: SymbolId, base: SymbolId) -> bool;

    /// Innermost class member (method, field or class) whose declaration contains `location`.
    fn enclosing_member(&self, location: &Location) -> Option<SymbolId>;

    /// Current location of a marker, `None` once it was overwritten.
    fn marker_location(&self, marker: MarkerId) -> Option<Location>;

    /// Current text at a location.
    fn text(&self, location: &Location) -> Option<String>;
}

/// Mutation primitives. Each call is atomic on its own; grouping several
/// calls into one logical change is the caller's business.
pub trait GraphMutator: SymbolGraph {
    /// View this mutator as a read-only graph.
    fn as_graph(&self) -> &dyn SymbolGraph;

    /// Change the declared name of a symbol.
    fn rename_symbol(&mut self, id: SymbolId, new_name: &str) -> Result<()>;

    /// Replace the text under a marker, which must currently read `expected`.
    ///
    /// Fails with [`CascadeError::StaleUsage`] when the marker was invalidated
    /// or its text no longer matches.
    fn replace_marker(&mut self, marker: MarkerId, expected: &str, replacement: &str)
        -> Result<()>;

    /// Insert `argument` as the first entry of the parenthesised list that
    /// follows the marker (call arguments or declared parameters).
    fn prepend_argument(&mut self, marker: MarkerId, argument: &str) -> Result<()>;

    /// Insert `parameter` as the first declared parameter of a method.
    fn add_parameter(&mut self, id: SymbolId, parameter: &str) -> Result<()>;

    /// Add the `static` modifier to a declaration.
    fn make_static(&mut self, id: SymbolId) -> Result<()>;

    /// Turn a method declaration into an abstract one (body removed).
    fn make_abstract(&mut self, id: SymbolId) -> Result<()>;

    /// Insert a copy of `member` into `target` class; returns the new symbol.
    fn copy_member(&mut self, member: SymbolId, target: SymbolId) -> Result<SymbolId>;

    /// Delete a member declaration.
    fn delete_member(&mut self, member: SymbolId) -> Result<()>;

    /// Rename a file of the graph.
    fn rename_file(&mut self, from: &str, to: &str) -> Result<()>;
}

/// Resolve a qualified name to exactly one symbol.
pub fn lookup(graph: &dyn SymbolGraph, qualified_name: &str) -> Result<SymbolId> {
    let matches = graph.find_all(qualified_name);
    match matches.as_slice() {
        [] => Err(CascadeError::SymbolNotFound(qualified_name.to_string())),
        [single] => Ok(*single),
        many => Err(CascadeError::AmbiguousSymbol {
            name: qualified_name.to_string(),
            candidates: many
                .iter()
                .filter_map(|id| graph.resolve(*id))
                .map(|info| info.describe())
                .collect(),
        }),
    }
}
