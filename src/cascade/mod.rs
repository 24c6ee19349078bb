//! Cascading renames.
//!
//! A [`CascadePolicy`] decides whether a renamed symbol implies renaming
//! others and derives their names. The [`CascadeResolver`] runs every enabled
//! policy and merges the proposals into [`CascadeCandidate`]s for the caller
//! to accept or decline.

pub mod policies;

use crate::error::Result;
use crate::graph::SymbolGraph;
use crate::search::Progress;
use crate::session::{Refactoring, RenameSet};
use crate::symbol::{SymbolId, SymbolInfo};
use crate::usage::Usage;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

pub use policies::{AccessorPolicy, DerivedNamePolicy, InheritorPolicy};

/// A rule deriving dependent renames from a renamed symbol.
pub trait CascadePolicy {
    /// Name shown next to its candidates.
    fn name(&self) -> &'static str;

    /// Settings key toggling the policy; `None` means always enabled.
    fn option_name(&self) -> Option<&'static str>;

    /// Whether the policy has anything to say about this kind of symbol.
    fn is_applicable(&self, symbol: &SymbolInfo) -> bool;

    /// Dependent symbols and their derived names. May poll `progress`.
    fn propose(
        &self,
        graph: &dyn SymbolGraph,
        symbol: &SymbolInfo,
        new_name: &str,
        progress: &dyn Progress,
    ) -> Result<Vec<(SymbolId, String)>>;
}

/// Registered policies plus their toggles.
pub struct PolicyRegistry {
    policies: Vec<Box<dyn CascadePolicy>>,
    disabled: HashSet<String>,
}

impl PolicyRegistry {
    /// A registry without policies.
    pub fn empty() -> Self {
        Self {
            policies: Vec::new(),
            disabled: HashSet::new(),
        }
    }

    /// The built-in policies, all enabled.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(AccessorPolicy));
        registry.register(Box::new(DerivedNamePolicy));
        registry.register(Box::new(InheritorPolicy));
        registry
    }

    /// Add a policy after the existing ones.
    pub fn register(&mut self, policy: Box<dyn CascadePolicy>) {
        self.policies.push(policy);
    }

    /// Toggle every policy with the given option name.
    pub fn set_enabled(&mut self, option_name: &str, enabled: bool) {
        if enabled {
            self.disabled.remove(option_name);
        } else {
            self.disabled.insert(option_name.to_string());
        }
    }

    /// Enabled policies in registration order.
    pub fn enabled(&self) -> impl Iterator<Item = &dyn CascadePolicy> {
        self.policies
            .iter()
            .map(|p| p.as_ref())
            .filter(|p| p.option_name().map_or(true, |o| !self.disabled.contains(o)))
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyRegistry")
            .field(
                "policies",
                &self.policies.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("disabled", &self.disabled)
            .finish()
    }
}

/// A proposed dependent rename awaiting the caller's decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CascadeCandidate {
    /// Symbol to rename.
    pub symbol: SymbolId,
    /// Human-readable description of the symbol.
    pub description: String,
    /// Its current name.
    pub current_name: String,
    /// Proposed name.
    pub new_name: String,
    /// Policy that proposed it.
    pub policy: String,
}

/// Runs the enabled policies against a rename set.
pub struct CascadeResolver<'g> {
    graph: &'g dyn SymbolGraph,
    registry: &'g PolicyRegistry,
}

impl<'g> CascadeResolver<'g> {
    /// Create a resolver.
    pub fn new(graph: &'g dyn SymbolGraph, registry: &'g PolicyRegistry) -> Self {
        Self { graph, registry }
    }

    /// Propose candidates not yet in `set`.
    ///
    /// Overriders already reached through an overriding usage are renamed by
    /// the apply step itself and are not proposed again.
    pub fn propose(
        &self,
        set: &RenameSet,
        refactoring: &Refactoring,
        usages: &[Usage],
        progress: &dyn Progress,
    ) -> Result<Vec<CascadeCandidate>> {
        if !matches!(refactoring, Refactoring::Rename) {
            return Ok(Vec::new());
        }
        let mut covered: HashSet<SymbolId> = set.symbols().collect();
        covered.extend(usages.iter().filter_map(|u| match u {
            Usage::Overriding {
                symbol, overrider, ..
            } if set.contains(*symbol) => Some(*overrider),
            _ => None,
        }));

        let mut candidates: Vec<CascadeCandidate> = Vec::new();
        for (id, new_name) in set.iter() {
            let Some(info) = self.graph.resolve(id) else {
                continue;
            };
            if info.name == new_name {
                continue;
            }
            for policy in self.registry.enabled() {
                progress.check_cancelled()?;
                if !policy.is_applicable(&info) {
                    continue;
                }
                progress.set_text(&format!("Looking for {} of {}", policy.name(), info.describe()));
                for (symbol, derived) in policy.propose(self.graph, &info, new_name, progress)? {
                    if covered.contains(&symbol)
                        || candidates
                            .iter()
                            .any(|c| c.symbol == symbol && c.new_name == derived)
                    {
                        continue;
                    }
                    let Some(candidate) = self.graph.resolve(symbol) else {
                        continue;
                    };
                    if candidate.name == derived {
                        continue;
                    }
                    log::debug!(
                        "{} proposes {} -> {}",
                        policy.name(),
                        candidate.describe(),
                        derived
                    );
                    candidates.push(CascadeCandidate {
                        symbol,
                        description: candidate.describe(),
                        current_name: candidate.name,
                        new_name: derived,
                        policy: policy.name().to_string(),
                    });
                }
            }
        }
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Manifest, MemoryGraph};
    use crate::search::NoProgress;
    use crate::session::PushDownSettings;
    use std::collections::BTreeMap;

    const SOURCE: &str = "class Box {\n    int size;\n    int getSize() { return size; }\n    void setSize(int s) { size = s; }\n}\n";

    fn graph() -> MemoryGraph {
        let manifest: Manifest = serde_json::from_value(serde_json::json!({
            "sources": ["Box.java"],
            "symbols": [
                {"id": 1, "name": "Box", "kind": "class", "file": "Box.java",
                 "decl": {"from": "class Box", "to": "\n}"}},
                {"id": 2, "name": "size", "kind": "field", "container": 1, "decl": {"text": "int size;"}},
                {"id": 3, "name": "getSize", "kind": "method", "container": 1,
                 "decl": {"from": "int getSize()", "to": "}"}},
                {"id": 4, "name": "setSize", "kind": "method", "container": 1,
                 "decl": {"from": "void setSize", "to": "}"}, "signature": ["int"]}
            ]
        }))
        .unwrap();
        let sources = BTreeMap::from([("Box.java".to_string(), SOURCE.to_string())]);
        MemoryGraph::from_manifest(&manifest, &sources, &BTreeMap::new()).unwrap()
    }

    fn names(registry: &PolicyRegistry) -> Vec<&'static str> {
        registry.enabled().map(|p| p.name()).collect()
    }

    #[test]
    fn test_disabled_policies_are_skipped() {
        let mut registry = PolicyRegistry::with_defaults();
        assert_eq!(names(&registry), vec!["accessors", "derived-names", "inheritors"]);
        registry.set_enabled("rename_inheritors", false);
        assert_eq!(names(&registry), vec!["accessors", "derived-names"]);
        registry.set_enabled("rename_inheritors", true);
        assert_eq!(names(&registry).len(), 3);
    }

    #[test]
    fn test_accessors_follow_field_rename() {
        let graph = graph();
        let registry = PolicyRegistry::with_defaults();
        let mut set = RenameSet::new();
        set.insert(SymbolId(2), "length");

        let candidates = CascadeResolver::new(&graph, &registry)
            .propose(&set, &Refactoring::Rename, &[], &NoProgress)
            .unwrap();
        let proposed: Vec<(SymbolId, &str)> = candidates
            .iter()
            .map(|c| (c.symbol, c.new_name.as_str()))
            .collect();
        assert_eq!(
            proposed,
            vec![(SymbolId(3), "getLength"), (SymbolId(4), "setLength")]
        );
        assert!(candidates.iter().all(|c| c.policy == "accessors"));
    }

    #[test]
    fn test_symbols_in_set_are_not_proposed_again() {
        let graph = graph();
        let registry = PolicyRegistry::with_defaults();
        let mut set = RenameSet::new();
        set.insert(SymbolId(2), "length");
        set.insert(SymbolId(3), "getLength");

        let candidates = CascadeResolver::new(&graph, &registry)
            .propose(&set, &Refactoring::Rename, &[], &NoProgress)
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].symbol, SymbolId(4));
    }

    #[test]
    fn test_only_renames_cascade() {
        let graph = graph();
        let registry = PolicyRegistry::with_defaults();
        let mut set = RenameSet::new();
        set.insert(SymbolId(2), "size");
        let push_down = Refactoring::PushDown(PushDownSettings::default());
        let candidates = CascadeResolver::new(&graph, &registry)
            .propose(&set, &push_down, &[], &NoProgress)
            .unwrap();
        assert!(candidates.is_empty());
    }
}
