//! Built-in cascade policies.

use super::CascadePolicy;
use crate::error::Result;
use crate::graph::SymbolGraph;
use crate::search::Progress;
use crate::symbol::{accessor_prefixes, capitalize, decapitalize, SymbolId, SymbolInfo, SymbolKind};

/// Renames getters, setters and `is` accessors along with their field.
#[derive(Debug, Default)]
pub struct AccessorPolicy;

impl CascadePolicy for AccessorPolicy {
    fn name(&self) -> &'static str {
        "accessors"
    }

    fn option_name(&self) -> Option<&'static str> {
        None
    }

    fn is_applicable(&self, symbol: &SymbolInfo) -> bool {
        symbol.kind == SymbolKind::Field && symbol.container.is_some()
    }

    fn propose(
        &self,
        graph: &dyn SymbolGraph,
        symbol: &SymbolInfo,
        new_name: &str,
        progress: &dyn Progress,
    ) -> Result<Vec<(SymbolId, String)>> {
        let Some(container) = symbol.container else {
            return Ok(Vec::new());
        };
        let mut proposals = Vec::new();
        for member in graph.members(container) {
            progress.check_cancelled()?;
            let Some(method) = graph.resolve(member) else {
                continue;
            };
            if method.kind != SymbolKind::Method {
                continue;
            }
            for prefix in accessor_prefixes() {
                if method.name == format!("{}{}", prefix, capitalize(&symbol.name)) {
                    proposals.push((method.id, format!("{}{}", prefix, capitalize(new_name))));
                }
            }
        }
        Ok(proposals)
    }
}

/// Renames fields, parameters and locals typed with a renamed class whose
/// names were built from the class name.
#[derive(Debug, Default)]
pub struct DerivedNamePolicy;

impl CascadePolicy for DerivedNamePolicy {
    fn name(&self) -> &'static str {
        "derived-names"
    }

    fn option_name(&self) -> Option<&'static str> {
        Some("rename_variables")
    }

    fn is_applicable(&self, symbol: &SymbolInfo) -> bool {
        symbol.kind == SymbolKind::Class
    }

    fn propose(
        &self,
        graph: &dyn SymbolGraph,
        symbol: &SymbolInfo,
        new_name: &str,
        progress: &dyn Progress,
    ) -> Result<Vec<(SymbolId, String)>> {
        let mut proposals = Vec::new();
        for id in graph.symbols() {
            progress.check_cancelled()?;
            let Some(variable) = graph.resolve(id) else {
                continue;
            };
            if !matches!(variable.kind, SymbolKind::Field | SymbolKind::Variable)
                || variable.type_name.as_deref() != Some(symbol.name.as_str())
            {
                continue;
            }
            if let Some(derived) = derive_name(&variable.name, &symbol.name, new_name) {
                proposals.push((variable.id, derived));
            }
        }
        Ok(proposals)
    }
}

/// Renames subclasses whose names end with the renamed class name.
#[derive(Debug, Default)]
pub struct InheritorPolicy;

impl CascadePolicy for InheritorPolicy {
    fn name(&self) -> &'static str {
        "inheritors"
    }

    fn option_name(&self) -> Option<&'static str> {
        Some("rename_inheritors")
    }

    fn is_applicable(&self, symbol: &SymbolInfo) -> bool {
        symbol.kind == SymbolKind::Class
    }

    fn propose(
        &self,
        graph: &dyn SymbolGraph,
        symbol: &SymbolInfo,
        new_name: &str,
        progress: &dyn Progress,
    ) -> Result<Vec<(SymbolId, String)>> {
        let mut proposals = Vec::new();
        for id in graph.symbols() {
            progress.check_cancelled()?;
            if id == symbol.id || !graph.is_inheritor_or_self(id, symbol.id) {
                continue;
            }
            let Some(class) = graph.resolve(id) else {
                continue;
            };
            if class.kind != SymbolKind::Class {
                continue;
            }
            if let Some(prefix) = class.name.strip_suffix(symbol.name.as_str()) {
                if !prefix.is_empty() {
                    proposals.push((class.id, format!("{}{}", prefix, new_name)));
                }
            }
        }
        Ok(proposals)
    }
}

/// Derive a new variable name from a class rename, camel-case aware.
///
/// `counter` -> `value`, `lastCounter` -> `lastValue`, `counterCache` ->
/// `valueCache`; names that merely contain the class name inside a longer
/// word are left alone.
pub fn derive_name(name: &str, old_class: &str, new_class: &str) -> Option<String> {
    if name == old_class {
        return Some(new_class.to_string());
    }
    let old_lower = decapitalize(old_class);
    if name == old_lower {
        return Some(decapitalize(new_class));
    }
    if let Some(rest) = name.strip_prefix(&old_lower) {
        if rest.starts_with(|c: char| c.is_uppercase()) {
            return Some(format!("{}{}", decapitalize(new_class), rest));
        }
    }
    let old_upper = capitalize(old_class);
    let (index, _) = name.match_indices(&old_upper).find(|(i, _)| {
        let after = &name[i + old_upper.len()..];
        *i > 0 && (after.is_empty() || after.starts_with(|c: char| c.is_uppercase() || c.is_ascii_digit()))
    })?;
    Some(format!(
        "{}{}{}",
        &name[..index],
        capitalize(new_class),
        &name[index + old_upper.len()..]
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_name() {
        assert_eq!(derive_name("counter", "Counter", "Tally"), Some("tally".into()));
        assert_eq!(derive_name("lastCounter", "Counter", "Tally"), Some("lastTally".into()));
        assert_eq!(derive_name("counterCache", "Counter", "Tally"), Some("tallyCache".into()));
        assert_eq!(derive_name("counters", "Counter", "Tally"), None);
        assert_eq!(derive_name("encounter", "Counter", "Tally"), None);
    }
}
