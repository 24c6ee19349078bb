//! What a session is asked to do.

use crate::graph::TextSearch;
use crate::symbol::SymbolId;
use serde::Serialize;
use std::collections::HashMap;

/// Ordered mapping from symbol to new name; a symbol appears at most once.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenameSet {
    entries: Vec<(SymbolId, String)>,
    #[serde(skip)]
    index: HashMap<SymbolId, usize>,
}

impl RenameSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry; returns `false` (and keeps the existing name) when the
    /// symbol is already present.
    pub fn insert(&mut self, id: SymbolId, new_name: impl Into<String>) -> bool {
        if self.index.contains_key(&id) {
            return false;
        }
        self.index.insert(id, self.entries.len());
        self.entries.push((id, new_name.into()));
        true
    }

    /// New name for a symbol.
    pub fn get(&self, id: SymbolId) -> Option<&str> {
        self.index.get(&id).map(|i| self.entries[*i].1.as_str())
    }

    /// Whether the symbol is present.
    pub fn contains(&self, id: SymbolId) -> bool {
        self.index.contains_key(&id)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &str)> {
        self.entries.iter().map(|(id, name)| (*id, name.as_str()))
    }

    /// Symbols in insertion order.
    pub fn symbols(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A field of the containing class passed to a static method as a parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldParameter {
    /// The field.
    pub field: SymbolId,
    /// Name of the new parameter.
    pub name: String,
}

/// Options of a make-static change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MakeStaticSettings {
    /// Pass the former receiver as a parameter.
    pub make_class_parameter: bool,
    /// Name of that parameter.
    pub class_parameter_name: String,
    /// Fields passed as parameters of their own.
    pub field_parameters: Vec<FieldParameter>,
    /// Rewrite call sites outside the member.
    pub replace_usages: bool,
}

impl Default for MakeStaticSettings {
    fn default() -> Self {
        Self {
            make_class_parameter: false,
            class_parameter_name: "anObject".to_string(),
            field_parameters: Vec::new(),
            replace_usages: true,
        }
    }
}

impl MakeStaticSettings {
    /// Parameter name a field is promoted to.
    pub fn parameter_for(&self, field: SymbolId) -> Option<&str> {
        self.field_parameters
            .iter()
            .find(|p| p.field == field)
            .map(|p| p.name.as_str())
    }

    /// Whether any parameter is added to the declaration.
    pub fn adds_parameters(&self) -> bool {
        self.make_class_parameter || !self.field_parameters.is_empty()
    }
}

/// Options of a push-down change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PushDownSettings {
    /// Subclasses receiving a copy of the member.
    pub targets: Vec<SymbolId>,
    /// Leave an abstract declaration of a pushed method in the source class.
    pub keep_abstract: bool,
}

/// The structural change a session performs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "settings", rename_all = "snake_case")]
pub enum Refactoring {
    /// Rename the symbol and everything referencing it.
    Rename,
    /// Turn an instance method or inner class into a static one.
    MakeStatic(MakeStaticSettings),
    /// Move a member from its class into subclasses.
    PushDown(PushDownSettings),
}

impl Refactoring {
    /// Short name used in logs and reports.
    pub fn name(&self) -> &'static str {
        match self {
            Refactoring::Rename => "rename",
            Refactoring::MakeStatic(_) => "make-static",
            Refactoring::PushDown(_) => "push-down",
        }
    }
}

/// Everything needed to begin a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRequest {
    /// The symbol the change starts from.
    pub primary: SymbolId,
    /// New name; ignored (kept as the current name) unless renaming.
    pub new_name: Option<String>,
    /// The change.
    pub refactoring: Refactoring,
    /// Non-code search toggles.
    pub text_search: TextSearch,
}

impl SessionRequest {
    /// Rename `primary` to `new_name`.
    pub fn rename(primary: SymbolId, new_name: impl Into<String>) -> Self {
        Self {
            primary,
            new_name: Some(new_name.into()),
            refactoring: Refactoring::Rename,
            text_search: TextSearch::default(),
        }
    }

    /// Make `primary` static.
    pub fn make_static(primary: SymbolId, settings: MakeStaticSettings) -> Self {
        Self {
            primary,
            new_name: None,
            refactoring: Refactoring::MakeStatic(settings),
            text_search: TextSearch::default(),
        }
    }

    /// Push `primary` down into subclasses.
    pub fn push_down(primary: SymbolId, settings: PushDownSettings) -> Self {
        Self {
            primary,
            new_name: None,
            refactoring: Refactoring::PushDown(settings),
            text_search: TextSearch::default(),
        }
    }

    /// Search comments and string literals for the old name.
    pub fn search_in_comments(mut self, enabled: bool) -> Self {
        self.text_search.comments_and_strings = enabled;
        self
    }

    /// Search non-source files for the old name.
    pub fn search_text_occurrences(mut self, enabled: bool) -> Self {
        self.text_search.plain_text_files = enabled;
        self
    }
}
