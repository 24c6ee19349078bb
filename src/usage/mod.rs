//! Usage discovery and classification.
//!
//! [`UsageCollector::collect`] queries the graph for every symbol of a
//! [`RenameSet`] and tags each reference with the way it must be handled by
//! conflict analysis and apply.

use crate::error::{Diagnostic, DiagnosticLevel, Result};
use crate::graph::{MarkerId, Qualifier, RawReference, SearchScope, SymbolGraph, TextKind, TextSearch};
use crate::search::Progress;
use crate::session::{RenameSet, Refactoring};
use crate::symbol::{accessor_prefixes, capitalize, Location, SymbolId, SymbolInfo, SymbolKind};
use serde::Serialize;
use std::collections::HashSet;

/// Where a usage was found.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSite {
    /// Marker over the usage text; `None` for declarations found by symbol
    /// (overriders), which are edited through their symbol instead.
    pub marker: Option<MarkerId>,
    /// Location at collection time.
    pub location: Location,
}

impl UsageSite {
    fn marked(marker: MarkerId, location: Location) -> Self {
        Self {
            marker: Some(marker),
            location,
        }
    }
}

/// A classified occurrence of a symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Usage {
    /// Reference in code that must be rewritten.
    Structural {
        /// Usage site.
        site: UsageSite,
        /// Symbol the usage is attributed to.
        symbol: SymbolId,
        /// Qualifier in front of the reference.
        qualifier: Option<Qualifier>,
        /// Reference has no text of its own; never edited.
        implicit: bool,
    },
    /// Reference from inside the entity being changed.
    Internal {
        /// Usage site.
        site: UsageSite,
        /// Symbol the usage is attributed to.
        symbol: SymbolId,
        /// Member the reference actually names.
        referenced: SymbolId,
        /// Inside an anonymous or local class.
        inside_anonymous: bool,
        /// The entity referencing itself.
        is_self: bool,
    },
    /// Method overriding the target (or one of its accessors).
    Overriding {
        /// Name of the overriding declaration.
        site: UsageSite,
        /// Symbol the usage is attributed to.
        symbol: SymbolId,
        /// The overridden method.
        overridden: SymbolId,
        /// The overriding method.
        overrider: SymbolId,
    },
    /// Occurrence in a comment, string literal or non-source file.
    NonCode {
        /// Usage site.
        site: UsageSite,
        /// Symbol the usage is attributed to.
        symbol: SymbolId,
        /// Text found at the site.
        text: String,
        /// Where the text was found.
        kind: TextKind,
    },
    /// Reference that physically resolves to a helper of the symbol.
    Related {
        /// Usage site.
        site: UsageSite,
        /// Symbol the usage is attributed to.
        symbol: SymbolId,
        /// Helper the syntax resolves to.
        referenced: SymbolId,
    },
}

impl Usage {
    /// Symbol the usage is attributed to.
    pub fn symbol(&self) -> SymbolId {
        match self {
            Usage::Structural { symbol, .. }
            | Usage::Internal { symbol, .. }
            | Usage::Overriding { symbol, .. }
            | Usage::NonCode { symbol, .. }
            | Usage::Related { symbol, .. } => *symbol,
        }
    }

    /// Where the usage was found.
    pub fn site(&self) -> &UsageSite {
        match self {
            Usage::Structural { site, .. }
            | Usage::Internal { site, .. }
            | Usage::Overriding { site, .. }
            | Usage::NonCode { site, .. }
            | Usage::Related { site, .. } => site,
        }
    }

    /// Location at collection time.
    pub fn location(&self) -> &Location {
        &self.site().location
    }

    /// Variant name.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Usage::Structural { .. } => "structural",
            Usage::Internal { is_self: true, .. } => "self",
            Usage::Internal { .. } => "internal",
            Usage::Overriding { .. } => "overriding",
            Usage::NonCode { .. } => "non_code",
            Usage::Related { .. } => "related",
        }
    }

    /// Whether the usage is deferred to the non-code pass.
    pub fn is_non_code(&self) -> bool {
        matches!(self, Usage::NonCode { .. })
    }
}

/// Output of one collection pass.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    /// Deduplicated usages in discovery order.
    pub usages: Vec<Usage>,
    /// Symbols that could not be resolved and were skipped.
    pub dropped: Vec<SymbolId>,
    /// Problems recorded along the way.
    pub diagnostics: Vec<Diagnostic>,
}

impl Collection {
    fn push(&mut self, seen: &mut HashSet<(Location, SymbolId)>, usage: Usage) {
        if seen.insert((usage.location().clone(), usage.symbol())) {
            log::debug!(
                "{} usage of {} at {}",
                usage.kind_name(),
                usage.symbol(),
                usage.location()
            );
            self.usages.push(usage);
        }
    }
}

/// Finds and classifies usages of a rename set.
pub struct UsageCollector<'g> {
    graph: &'g dyn SymbolGraph,
    text_search: TextSearch,
    accessor_overrides: bool,
}

impl<'g> UsageCollector<'g> {
    /// Create a collector with text search disabled.
    pub fn new(graph: &'g dyn SymbolGraph) -> Self {
        Self {
            graph,
            text_search: TextSearch::default(),
            accessor_overrides: true,
        }
    }

    /// Also search comments, strings and non-source files (renames only).
    pub fn with_text_search(mut self, search: TextSearch) -> Self {
        self.text_search = search;
        self
    }

    /// Report overriders of a renamed field's accessors.
    pub fn with_accessor_overrides(mut self, enabled: bool) -> Self {
        self.accessor_overrides = enabled;
        self
    }

    /// Collect usages for every symbol of `set`.
    ///
    /// Only cancellation is returned as an error; unresolvable symbols are
    /// dropped with a diagnostic.
    pub fn collect(
        &self,
        set: &RenameSet,
        refactoring: &Refactoring,
        progress: &dyn Progress,
    ) -> Result<Collection> {
        let mut collection = Collection::default();
        let mut seen = HashSet::new();
        let total = set.len().max(1) as f64;

        for (index, (id, _)) in set.iter().enumerate() {
            progress.check_cancelled()?;
            progress.set_fraction(index as f64 / total);

            let Some(info) = self.graph.resolve(id) else {
                log::warn!("symbol {} could not be resolved; dropped from collection", id);
                collection.dropped.push(id);
                collection.diagnostics.push(
                    Diagnostic::new(
                        "collect",
                        DiagnosticLevel::Warning,
                        format!("symbol {} could not be resolved and was skipped", id),
                    )
                    .with_symbol(id.to_string()),
                );
                continue;
            };
            progress.set_text(&format!("Searching usages of {}", info.describe()));

            match refactoring {
                Refactoring::Rename => {
                    self.collect_rename(&info, &mut collection, &mut seen, progress)?
                }
                Refactoring::MakeStatic(settings) => self.collect_make_static(
                    &info,
                    settings.replace_usages,
                    &mut collection,
                    &mut seen,
                    progress,
                )?,
                Refactoring::PushDown(_) => {
                    self.collect_push_down(&info, &mut collection, &mut seen, progress)?
                }
            }
        }
        progress.set_fraction(1.0);
        Ok(collection)
    }

    /// The declaration whose inside counts as "internal" for a symbol.
    fn change_scope(&self, info: &SymbolInfo) -> Location {
        match info.kind {
            SymbolKind::Field | SymbolKind::Variable => info
                .container
                .and_then(|c| self.graph.resolve(c))
                .map(|c| c.location)
                .unwrap_or_else(|| info.location.clone()),
            SymbolKind::Method | SymbolKind::Class => info.location.clone(),
        }
    }

    fn collect_rename(
        &self,
        info: &SymbolInfo,
        collection: &mut Collection,
        seen: &mut HashSet<(Location, SymbolId)>,
        progress: &dyn Progress,
    ) -> Result<()> {
        let scope = self.change_scope(info);
        for raw in self.graph.references(info.id, &SearchScope::for_symbol(info)) {
            progress.check_cancelled()?;
            let usage = self.classify(info, &scope, raw);
            collection.push(seen, usage);
        }

        // Calls bound to an overrider follow the renamed method.
        for overrider in self.collect_overriders(info, collection, seen, progress)? {
            let overrider_scope = self.change_scope(&overrider);
            for raw in self
                .graph
                .references(overrider.id, &SearchScope::for_symbol(&overrider))
            {
                progress.check_cancelled()?;
                let usage = self.classify(info, &overrider_scope, raw);
                collection.push(seen, usage);
            }
        }

        if self.text_search.is_enabled() {
            for occurrence in self.graph.text_occurrences(&info.name, self.text_search) {
                collection.push(
                    seen,
                    Usage::NonCode {
                        site: UsageSite::marked(occurrence.marker, occurrence.location),
                        symbol: info.id,
                        text: info.name.clone(),
                        kind: occurrence.kind,
                    },
                );
            }
        }
        Ok(())
    }

    fn classify(&self, info: &SymbolInfo, scope: &Location, raw: RawReference) -> Usage {
        let site = UsageSite::marked(raw.marker, raw.location.clone());
        if raw.resolved != raw.target {
            return Usage::Related {
                site,
                symbol: info.id,
                referenced: raw.resolved,
            };
        }
        let unqualified = raw.qualifier.as_ref().map_or(true, |q| q.is_this);
        if unqualified && !raw.implicit && scope.contains(&raw.location) {
            let is_self = info.location.contains(&raw.location);
            return Usage::Internal {
                site,
                symbol: info.id,
                referenced: info.id,
                inside_anonymous: raw.inside_anonymous,
                is_self,
            };
        }
        Usage::Structural {
            site,
            symbol: info.id,
            qualifier: raw.qualifier,
            implicit: raw.implicit,
        }
    }

    /// Records an overriding usage per overrider and returns the overriders
    /// of `info` itself (not those of its accessors).
    fn collect_overriders(
        &self,
        info: &SymbolInfo,
        collection: &mut Collection,
        seen: &mut HashSet<(Location, SymbolId)>,
        progress: &dyn Progress,
    ) -> Result<Vec<SymbolInfo>> {
        let mut own = Vec::new();
        let overridden: Vec<SymbolId> = match info.kind {
            SymbolKind::Method => vec![info.id],
            SymbolKind::Field if self.accessor_overrides => self.accessors_of(info),
            _ => Vec::new(),
        };
        for method in overridden {
            for overrider in self.graph.overriders(method) {
                progress.check_cancelled()?;
                let Some(overrider_info) = self.graph.resolve(overrider) else {
                    continue;
                };
                collection.push(
                    seen,
                    Usage::Overriding {
                        site: UsageSite {
                            marker: None,
                            location: overrider_info.name_location.clone(),
                        },
                        symbol: method,
                        overridden: method,
                        overrider,
                    },
                );
                if method == info.id {
                    own.push(overrider_info);
                }
            }
        }
        Ok(own)
    }

    /// Accessor methods of a field declared next to it.
    fn accessors_of(&self, field: &SymbolInfo) -> Vec<SymbolId> {
        let Some(container) = field.container else {
            return Vec::new();
        };
        let names: Vec<String> = accessor_prefixes()
            .iter()
            .map(|prefix| format!("{}{}", prefix, capitalize(&field.name)))
            .collect();
        self.graph
            .members(container)
            .into_iter()
            .filter_map(|id| self.graph.resolve(id))
            .filter(|m| m.kind == SymbolKind::Method && names.contains(&m.name))
            .map(|m| m.id)
            .collect()
    }

    fn collect_make_static(
        &self,
        info: &SymbolInfo,
        replace_usages: bool,
        collection: &mut Collection,
        seen: &mut HashSet<(Location, SymbolId)>,
        progress: &dyn Progress,
    ) -> Result<()> {
        let container = info.container;
        for raw in self.graph.references_within(info.id) {
            progress.check_cancelled()?;
            if raw.implicit || raw.qualifier.as_ref().is_some_and(|q| !q.is_this) {
                continue;
            }
            let Some(referenced) = self.graph.resolve(raw.target) else {
                continue;
            };
            let is_self = referenced.id == info.id;
            let is_instance_member = referenced.container.is_some()
                && referenced.container == container
                && referenced.kind.is_member()
                && !referenced.is_static();
            if !is_self && !is_instance_member {
                continue;
            }
            collection.push(
                seen,
                Usage::Internal {
                    site: UsageSite::marked(raw.marker, raw.location),
                    symbol: info.id,
                    referenced: referenced.id,
                    inside_anonymous: raw.inside_anonymous,
                    is_self,
                },
            );
        }

        if replace_usages {
            for raw in self.graph.references(info.id, &SearchScope::for_symbol(info)) {
                progress.check_cancelled()?;
                if info.location.contains(&raw.location) {
                    continue;
                }
                collection.push(
                    seen,
                    Usage::Structural {
                        site: UsageSite::marked(raw.marker, raw.location),
                        symbol: info.id,
                        qualifier: raw.qualifier,
                        implicit: raw.implicit,
                    },
                );
            }
        }

        self.collect_overriders(info, collection, seen, progress)?;
        Ok(())
    }

    fn collect_push_down(
        &self,
        info: &SymbolInfo,
        collection: &mut Collection,
        seen: &mut HashSet<(Location, SymbolId)>,
        progress: &dyn Progress,
    ) -> Result<()> {
        for raw in self.graph.references(info.id, &SearchScope::for_symbol(info)) {
            progress.check_cancelled()?;
            if info.location.contains(&raw.location) {
                continue;
            }
            collection.push(
                seen,
                Usage::Structural {
                    site: UsageSite::marked(raw.marker, raw.location),
                    symbol: info.id,
                    qualifier: raw.qualifier,
                    implicit: raw.implicit,
                },
            );
        }
        Ok(())
    }
}
