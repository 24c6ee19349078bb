//! Per-symbol post-apply handlers.

use super::PostApplyAction;
use crate::graph::{GraphMutator, SymbolGraph};
use crate::session::Refactoring;
use crate::symbol::{SymbolInfo, SymbolKind};
use std::fmt;
use std::path::Path;

/// Extra work tied to a kind of symbol, run once both apply phases are done.
///
/// Callbacks run grouped by handler in registration order; within one
/// handler they follow the rename set order.
pub trait PerSymbolHandler {
    /// Name used in reports.
    fn name(&self) -> &'static str;

    /// Whether the handler cares about this symbol and change.
    fn is_applicable(&self, symbol: &SymbolInfo, refactoring: &Refactoring) -> bool;

    /// Capture what the follow-up needs before the symbol is edited.
    /// Returning `None` means nothing to do.
    fn prepare(
        &self,
        graph: &dyn SymbolGraph,
        symbol: &SymbolInfo,
        new_name: &str,
    ) -> Option<PostApplyAction>;
}

/// Renames `Counter.java` to `Tally.java` when top-level class `Counter` is
/// renamed to `Tally`.
#[derive(Debug, Default)]
pub struct FileNameSyncHandler;

impl PerSymbolHandler for FileNameSyncHandler {
    fn name(&self) -> &'static str {
        "file-name-sync"
    }

    fn is_applicable(&self, symbol: &SymbolInfo, refactoring: &Refactoring) -> bool {
        matches!(refactoring, Refactoring::Rename)
            && symbol.kind == SymbolKind::Class
            && symbol.container.is_none()
    }

    fn prepare(
        &self,
        _graph: &dyn SymbolGraph,
        symbol: &SymbolInfo,
        new_name: &str,
    ) -> Option<PostApplyAction> {
        let path = Path::new(&symbol.location.file);
        if path.file_stem()?.to_str()? != symbol.name || symbol.name == new_name {
            return None;
        }
        let mut file_name = new_name.to_string();
        if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
            file_name.push('.');
            file_name.push_str(extension);
        }
        let from = symbol.location.file.clone();
        let to = match path.parent().and_then(|p| p.to_str()) {
            Some(dir) if !dir.is_empty() => format!("{}/{}", dir, file_name),
            _ => file_name,
        };
        Some(Box::new(move |graph: &mut dyn GraphMutator| {
            graph.rename_file(&from, &to)
        }))
    }
}

/// Registered handlers in registration order.
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn PerSymbolHandler>>,
}

impl HandlerRegistry {
    /// A registry without handlers.
    pub fn empty() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// The built-in handlers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(FileNameSyncHandler));
        registry
    }

    /// Add a handler after the existing ones.
    pub fn register(&mut self, handler: Box<dyn PerSymbolHandler>) {
        self.handlers.push(handler);
    }

    /// Handlers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn PerSymbolHandler> {
        self.handlers.iter().map(|h| h.as_ref())
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.handlers.iter().map(|h| h.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Manifest, MemoryGraph};
    use std::collections::BTreeMap;

    fn graph(file: &str) -> MemoryGraph {
        let manifest: Manifest = serde_json::from_value(serde_json::json!({
            "sources": [file],
            "symbols": [
                {"id": 1, "name": "Counter", "kind": "class", "file": file,
                 "decl": {"from": "class Counter", "to": "}"}},
                {"id": 2, "name": "Inner", "kind": "class", "container": 1,
                 "decl": {"from": "class Inner", "to": "}"}}
            ]
        }))
        .unwrap();
        let sources = BTreeMap::from([(
            file.to_string(),
            "class Counter { class Inner {} }".to_string(),
        )]);
        MemoryGraph::from_manifest(&manifest, &sources, &BTreeMap::new()).unwrap()
    }

    #[test]
    fn test_file_follows_top_level_class() {
        let mut graph = graph("src/demo/Counter.java");
        let info = graph.resolve(crate::symbol::SymbolId(1)).unwrap();
        let handler = FileNameSyncHandler;
        assert!(handler.is_applicable(&info, &Refactoring::Rename));

        let action = handler.prepare(&graph, &info, "Tally").unwrap();
        action(&mut graph as &mut dyn GraphMutator).unwrap();
        let files: Vec<&str> = graph.files().collect();
        assert_eq!(files, vec!["src/demo/Tally.java"]);
    }

    #[test]
    fn test_nested_and_mismatched_classes_are_ignored() {
        let graph = graph("src/demo/Main.java");
        let handler = FileNameSyncHandler;
        let outer = graph.resolve(crate::symbol::SymbolId(1)).unwrap();
        assert!(handler.prepare(&graph, &outer, "Tally").is_none());

        let inner = graph.resolve(crate::symbol::SymbolId(2)).unwrap();
        assert!(!handler.is_applicable(&inner, &Refactoring::Rename));
    }

    #[test]
    fn test_registry_lists_handlers_in_order() {
        assert_eq!(format!("{:?}", HandlerRegistry::with_defaults()), "[\"file-name-sync\"]");
        assert_eq!(HandlerRegistry::empty().iter().count(), 0);
    }
}
