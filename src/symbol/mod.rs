//! Symbol model shared by the whole pipeline.
//!
//! A [`SymbolId`] is graph identity, not a name: two symbols with the same
//! name are different symbols, and a renamed symbol keeps its id. Everything
//! else in this module is a read-only snapshot handed out by the graph.

pub mod naming;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

pub use naming::{
    accessor_prefixes, capitalize, decapitalize, identifier_occurrences, is_valid_identifier,
};

/// Stable identity of a symbol in the graph.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SymbolId(pub u32);

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of addressable program entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    /// Class, interface or other type declaration.
    Class,
    /// Method or function declared in a class.
    Method,
    /// Field declared in a class.
    Field,
    /// Local variable or parameter.
    Variable,
}

impl SymbolKind {
    /// Convert kind to its lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Class => "class",
            SymbolKind::Method => "method",
            SymbolKind::Field => "field",
            SymbolKind::Variable => "variable",
        }
    }

    /// Whether this kind is a class member (can be pushed down or clash in a class).
    pub fn is_member(&self) -> bool {
        !matches!(self, SymbolKind::Variable)
    }
}

/// Access level of a declaration.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Visible only inside the top-level class.
    Private,
    /// Visible inside the same package.
    #[default]
    Package,
    /// Visible inside the package and to inheritors.
    Protected,
    /// Visible everywhere.
    Public,
}

/// Declaration modifiers relevant to conflict analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    /// Access level.
    #[serde(default)]
    pub visibility: Visibility,
    /// `static` modifier.
    #[serde(default, rename = "static")]
    pub is_static: bool,
    /// `abstract` modifier.
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    /// `final` modifier.
    #[serde(default, rename = "final")]
    pub is_final: bool,
}

/// A byte range in a file, captured at a point in time.
///
/// Locations are hints: edits made after capture may shift the real range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    /// Workspace-relative file path.
    pub file: String,
    /// Start byte offset (inclusive).
    pub byte_start: usize,
    /// End byte offset (exclusive).
    pub byte_end: usize,
}

impl Location {
    /// Create a new location.
    pub fn new(file: impl Into<String>, byte_start: usize, byte_end: usize) -> Self {
        Self {
            file: file.into(),
            byte_start,
            byte_end,
        }
    }

    /// Whether `other` lies entirely inside this range of the same file.
    pub fn contains(&self, other: &Location) -> bool {
        self.file == other.file
            && self.byte_start <= other.byte_start
            && other.byte_end <= self.byte_end
    }

    /// Length of the range in bytes.
    pub fn len(&self) -> usize {
        self.byte_end.saturating_sub(self.byte_start)
    }

    /// Whether the range is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}..{}", self.file, self.byte_start, self.byte_end)
    }
}

/// Snapshot of a symbol as currently known to the graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolInfo {
    /// Canonical id (aliases resolve to their target).
    pub id: SymbolId,
    /// Current declared name.
    pub name: String,
    /// Dotted path of enclosing declarations plus the name (`Counter.count`).
    pub qualified_name: String,
    /// Kind of entity.
    pub kind: SymbolKind,
    /// Enclosing class (members) or method (variables).
    pub container: Option<SymbolId>,
    /// Declaration modifiers.
    pub modifiers: Modifiers,
    /// Language of the declaring file, if it is a source file.
    pub language: Option<Language>,
    /// Whole declaration span.
    pub location: Location,
    /// Span of the declared name.
    pub name_location: Location,
    /// Parameter types (methods only).
    pub signature: Vec<String>,
    /// Declared type (fields and variables).
    pub type_name: Option<String>,
    /// Direct supertypes (classes only).
    pub supers: Vec<SymbolId>,
    /// Method this method overrides, if any.
    pub overrides: Option<SymbolId>,
    /// Package of the top-level declaration.
    pub package: String,
}

impl SymbolInfo {
    /// Human-readable description, e.g. `method Counter.getCount()`.
    pub fn describe(&self) -> String {
        match self.kind {
            SymbolKind::Method => format!(
                "method {}({})",
                self.qualified_name,
                self.signature.join(", ")
            ),
            kind => format!("{} {}", kind.as_str(), self.qualified_name),
        }
    }

    /// Whether the declaration is static.
    pub fn is_static(&self) -> bool {
        self.modifiers.is_static
    }

    /// Whether the declaration is abstract.
    pub fn is_abstract(&self) -> bool {
        self.modifiers.is_abstract
    }
}

/// Programming languages whose comments and strings Cascade can search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Rust (.rs)
    Rust,
    /// Python (.py)
    Python,
    /// C (.c, .h)
    C,
    /// C++ (.cpp, .hpp, .cc, .cxx)
    Cpp,
    /// Java (.java)
    Java,
    /// JavaScript (.js, .mjs, .cjs)
    JavaScript,
    /// TypeScript (.ts, .tsx)
    TypeScript,
}

impl Language {
    /// Convert language to string identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
        }
    }

    /// Detect language from file path extension.
    ///
    /// Table-driven; unknown extensions return `None` and the file is
    /// treated as plain text.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?;

        let language = match extension {
            "rs" => Language::Rust,
            "py" => Language::Python,
            "c" | "h" => Language::C,
            "cpp" | "hpp" | "cc" | "cxx" => Language::Cpp,
            "java" => Language::Java,
            "js" | "mjs" | "cjs" => Language::JavaScript,
            "ts" | "tsx" => Language::TypeScript,
            _ => return None,
        };

        Some(language)
    }
}
