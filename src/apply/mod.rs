//! Two-phase apply.
//!
//! Phase 1 performs the structural change symbol by symbol: usages first,
//! the declaration last. A failing symbol is recorded and the remaining
//! symbols still run; nothing already applied is undone. Phase 2 replays
//! non-code usages against the final text, skipping ranges whose content
//! changed. Handler callbacks run after both phases, in registration order.

pub mod handlers;

use crate::error::{CascadeError, Diagnostic, DiagnosticLevel, Result};
use crate::graph::{GraphMutator, MarkerId};
use crate::search::Progress;
use crate::session::{MakeStaticSettings, PushDownSettings, Refactoring, RenameSet};
use crate::symbol::{is_valid_identifier, Location, SymbolId, SymbolInfo, SymbolKind};
use crate::usage::Usage;
use serde::Serialize;

pub use handlers::{FileNameSyncHandler, HandlerRegistry, PerSymbolHandler};

/// Deferred follow-up produced by a [`PerSymbolHandler`].
pub type PostApplyAction = Box<dyn FnOnce(&mut dyn GraphMutator) -> Result<()>>;

/// A prepared callback: handler position in the registry, handler name,
/// symbol and action.
type PendingAction = (usize, String, SymbolId, PostApplyAction);

/// What happened to one symbol of the rename set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SymbolStatus {
    /// Every structural edit succeeded.
    Applied {
        /// Number of edits made.
        edits: usize,
    },
    /// An edit failed; edits made before the failure stay.
    Failed {
        /// Why.
        reason: String,
        /// Number of edits made before the failure.
        edits: usize,
    },
    /// Never started because the session was aborted.
    Skipped {
        /// Why.
        reason: String,
    },
}

/// Per-symbol apply outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolOutcome {
    /// The symbol.
    pub symbol: SymbolId,
    /// Its description before the change.
    pub description: String,
    /// Name it was given.
    pub new_name: String,
    /// Result.
    #[serde(flatten)]
    pub status: SymbolStatus,
}

/// A non-code range that was not written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedOccurrence {
    /// Location captured at collection time.
    pub location: Location,
    /// Why it was skipped.
    pub reason: String,
}

/// Phase 2 summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NonCodeOutcome {
    /// Occurrences rewritten.
    pub written: usize,
    /// Occurrences left alone.
    pub skipped: Vec<SkippedOccurrence>,
}

/// Outcome of a handler callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallbackOutcome {
    /// Handler name.
    pub handler: String,
    /// Symbol it was registered for.
    pub symbol: SymbolId,
    /// Error message if the callback failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything the applier did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplyResult {
    /// One entry per rename set symbol, in set order.
    pub outcomes: Vec<SymbolOutcome>,
    /// Phase 2 summary.
    pub non_code: NonCodeOutcome,
    /// Handler callbacks that ran.
    pub callbacks: Vec<CallbackOutcome>,
    /// Cancellation was observed during phase 1.
    pub aborted: bool,
    /// Problems recorded while applying.
    pub diagnostics: Vec<Diagnostic>,
}

impl ApplyResult {
    /// Outcome for a symbol.
    pub fn outcome(&self, symbol: SymbolId) -> Option<&SymbolOutcome> {
        self.outcomes.iter().find(|o| o.symbol == symbol)
    }

    /// Whether the symbol was fully applied.
    pub fn is_applied(&self, symbol: SymbolId) -> bool {
        self.outcome(symbol)
            .is_some_and(|o| matches!(o.status, SymbolStatus::Applied { .. }))
    }

    /// Number of fully applied symbols.
    pub fn applied_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, SymbolStatus::Applied { .. }))
            .count()
    }

    /// Number of failed symbols.
    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, SymbolStatus::Failed { .. }))
            .count()
    }

    /// No failures, no skips, no abort.
    pub fn is_complete(&self) -> bool {
        !self.aborted && self.applied_count() == self.outcomes.len()
    }
}

/// Applies a finalized rename set.
pub struct TransactionalApplier<'c> {
    handlers: &'c HandlerRegistry,
    check_identifiers: bool,
}

impl<'c> TransactionalApplier<'c> {
    /// Create an applier.
    pub fn new(handlers: &'c HandlerRegistry, check_identifiers: bool) -> Self {
        Self {
            handlers,
            check_identifiers,
        }
    }

    /// Run both phases and the handler callbacks.
    ///
    /// `progress` is only polled between symbols of phase 1; once observed,
    /// cancellation skips the symbols not yet started, phase 2 and callbacks.
    pub fn apply(
        &self,
        graph: &mut dyn GraphMutator,
        set: &RenameSet,
        refactoring: &Refactoring,
        usages: &[Usage],
        progress: &dyn Progress,
    ) -> ApplyResult {
        let mut result = ApplyResult::default();
        let mut actions: Vec<PendingAction> = Vec::new();

        for (id, new_name) in set.iter() {
            if !result.aborted && progress.is_cancelled() {
                log::warn!("apply aborted before {}", id);
                result.aborted = true;
            }
            let description = graph
                .resolve(id)
                .map(|info| info.describe())
                .unwrap_or_else(|| format!("symbol {}", id));
            if result.aborted {
                result.outcomes.push(SymbolOutcome {
                    symbol: id,
                    description,
                    new_name: new_name.to_string(),
                    status: SymbolStatus::Skipped {
                        reason: "session aborted before this symbol was started".to_string(),
                    },
                });
                continue;
            }

            let mut edits = 0;
            let applied = self.apply_symbol(
                graph,
                id,
                new_name,
                refactoring,
                usages,
                &mut edits,
                &mut actions,
            );
            let status = match applied {
                Ok(()) => {
                    log::info!("applied {} ({} edits)", description, edits);
                    SymbolStatus::Applied { edits }
                }
                Err(e) => {
                    log::warn!("failed to apply {}: {}", description, e);
                    result.diagnostics.push(
                        Diagnostic::new("apply", DiagnosticLevel::Error, e.to_string())
                            .with_symbol(description.clone()),
                    );
                    SymbolStatus::Failed {
                        reason: e.to_string(),
                        edits,
                    }
                }
            };
            result.outcomes.push(SymbolOutcome {
                symbol: id,
                description,
                new_name: new_name.to_string(),
                status,
            });
        }

        if result.aborted {
            return result;
        }

        self.apply_non_code(graph, set, usages, &mut result);

        // Stable: symbols keep set order under each handler.
        actions.sort_by_key(|(position, ..)| *position);
        for (_, handler, symbol, action) in actions {
            let error = action(graph).err().map(|e| e.to_string());
            if let Some(message) = &error {
                log::warn!("{} callback for {} failed: {}", handler, symbol, message);
            }
            result.callbacks.push(CallbackOutcome {
                handler,
                symbol,
                error,
            });
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_symbol(
        &self,
        graph: &mut dyn GraphMutator,
        id: SymbolId,
        new_name: &str,
        refactoring: &Refactoring,
        usages: &[Usage],
        edits: &mut usize,
        actions: &mut Vec<PendingAction>,
    ) -> Result<()> {
        let info = graph
            .resolve(id)
            .ok_or_else(|| CascadeError::UnresolvableSymbol {
                symbol: format!("symbol {}", id),
            })?;
        if matches!(refactoring, Refactoring::Rename)
            && self.check_identifiers
            && !is_valid_identifier(info.language, new_name)
        {
            return Err(CascadeError::InvalidOperation {
                symbol: info.describe(),
                reason: format!("'{}' is not a valid identifier", new_name),
            });
        }

        let pending: Vec<(usize, String, PostApplyAction)> = self
            .handlers
            .iter()
            .enumerate()
            .filter(|(_, h)| h.is_applicable(&info, refactoring))
            .filter_map(|(position, h)| {
                h.prepare(graph.as_graph(), &info, new_name)
                    .map(|action| (position, h.name().to_string(), action))
            })
            .collect();

        let own: Vec<&Usage> = usages
            .iter()
            .filter(|u| u.symbol() == info.id && !u.is_non_code())
            .collect();
        match refactoring {
            Refactoring::Rename => rename(graph, &info, new_name, &own, edits)?,
            Refactoring::MakeStatic(settings) => make_static(graph, &info, settings, &own, edits)?,
            Refactoring::PushDown(settings) => push_down(graph, &info, settings, edits)?,
        }

        actions.extend(
            pending
                .into_iter()
                .map(|(position, handler, action)| (position, handler, info.id, action)),
        );
        Ok(())
    }

    fn apply_non_code(
        &self,
        graph: &mut dyn GraphMutator,
        set: &RenameSet,
        usages: &[Usage],
        result: &mut ApplyResult,
    ) {
        for usage in usages {
            let Usage::NonCode {
                site, symbol, text, ..
            } = usage
            else {
                continue;
            };
            let (Some(new_name), true) = (set.get(*symbol), result.is_applied(*symbol)) else {
                continue;
            };
            let Some(marker) = site.marker else {
                continue;
            };
            match graph.replace_marker(marker, text, new_name) {
                Ok(()) => result.non_code.written += 1,
                Err(e) => {
                    log::warn!("skipped non-code occurrence at {}: {}", site.location, e);
                    result.non_code.skipped.push(SkippedOccurrence {
                        location: site.location.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}

fn rename(
    graph: &mut dyn GraphMutator,
    info: &SymbolInfo,
    new_name: &str,
    usages: &[&Usage],
    edits: &mut usize,
) -> Result<()> {
    for usage in usages {
        match usage {
            Usage::Structural { implicit: true, .. } => continue,
            Usage::Structural { site, .. }
            | Usage::Internal { site, .. }
            | Usage::Related { site, .. } => {
                if let Some(marker) = site.marker {
                    graph.replace_marker(marker, &info.name, new_name)?;
                    *edits += 1;
                }
            }
            Usage::Overriding { overrider, .. } => {
                graph.rename_symbol(*overrider, new_name)?;
                *edits += 1;
            }
            Usage::NonCode { .. } => {}
        }
    }
    graph.rename_symbol(info.id, new_name)?;
    *edits += 1;
    Ok(())
}

fn current_text(graph: &dyn GraphMutator, marker: MarkerId) -> Option<String> {
    graph
        .marker_location(marker)
        .and_then(|location| graph.text(&location))
}

fn make_static(
    graph: &mut dyn GraphMutator,
    info: &SymbolInfo,
    settings: &MakeStaticSettings,
    usages: &[&Usage],
    edits: &mut usize,
) -> Result<()> {
    let class = info
        .container
        .and_then(|c| graph.resolve(c))
        .ok_or_else(|| CascadeError::InvalidOperation {
            symbol: info.describe(),
            reason: "member has no containing class".to_string(),
        })?;
    let fields: Vec<(SymbolInfo, String)> = settings
        .field_parameters
        .iter()
        .filter_map(|p| graph.resolve(p.field).map(|f| (f, p.name.clone())))
        .collect();

    let call_arguments = |receiver: Option<&str>| -> Option<String> {
        let mut arguments = Vec::new();
        if settings.make_class_parameter {
            arguments.push(receiver.unwrap_or("this").to_string());
        }
        for (field, _) in &fields {
            arguments.push(match receiver {
                Some(r) => format!("{}.{}", r, field.name),
                None => field.name.clone(),
            });
        }
        (!arguments.is_empty()).then(|| arguments.join(", "))
    };

    // Self usages, then other internal usages, then external call sites.
    let mut ordered: Vec<&Usage> = usages
        .iter()
        .copied()
        .filter(|u| matches!(u, Usage::Internal { is_self: true, .. }))
        .collect();
    ordered.extend(
        usages
            .iter()
            .copied()
            .filter(|u| matches!(u, Usage::Internal { is_self: false, .. })),
    );
    ordered.extend(
        usages
            .iter()
            .copied()
            .filter(|u| matches!(u, Usage::Structural { implicit: false, .. })),
    );

    let mut needs_final = false;
    for usage in ordered {
        match usage {
            Usage::Internal {
                site, is_self: true, ..
            } => {
                let mut arguments = Vec::new();
                if settings.make_class_parameter {
                    arguments.push(settings.class_parameter_name.clone());
                }
                arguments.extend(fields.iter().map(|(_, name)| name.clone()));
                if let (Some(marker), false) = (site.marker, arguments.is_empty()) {
                    graph.prepend_argument(marker, &arguments.join(", "))?;
                    *edits += 1;
                }
            }
            Usage::Internal {
                site,
                referenced,
                inside_anonymous,
                ..
            } => {
                let Some(marker) = site.marker else {
                    continue;
                };
                let Some(member) = graph.resolve(*referenced) else {
                    continue;
                };
                if member.is_static() {
                    continue;
                }
                let replacement = match settings.parameter_for(member.id) {
                    Some(parameter) if member.kind == SymbolKind::Field => parameter.to_string(),
                    _ if settings.make_class_parameter => {
                        format!("{}.{}", settings.class_parameter_name, member.name)
                    }
                    _ => continue,
                };
                graph.replace_marker(marker, &member.name, &replacement)?;
                needs_final |= *inside_anonymous;
                *edits += 1;
            }
            Usage::Structural {
                site, qualifier, ..
            } => {
                let receiver = qualifier
                    .as_ref()
                    .and_then(|q| current_text(graph, q.marker));
                if let (Some(marker), Some(arguments)) =
                    (site.marker, call_arguments(receiver.as_deref()))
                {
                    graph.prepend_argument(marker, &arguments)?;
                    *edits += 1;
                }
                if let (Some(q), Some(text)) = (qualifier, receiver) {
                    graph.replace_marker(q.marker, &text, &class.name)?;
                    *edits += 1;
                }
            }
            _ => {}
        }
    }

    if info.kind == SymbolKind::Method {
        let modifier = if needs_final { "final " } else { "" };
        let mut parameters = Vec::new();
        if settings.make_class_parameter {
            parameters.push(format!(
                "{}{} {}",
                modifier, class.name, settings.class_parameter_name
            ));
        }
        for (field, name) in &fields {
            let type_name = field.type_name.as_deref().unwrap_or("Object");
            parameters.push(format!("{}{} {}", modifier, type_name, name));
        }
        if !parameters.is_empty() {
            graph.add_parameter(info.id, &parameters.join(", "))?;
            *edits += 1;
        }
    }
    graph.make_static(info.id)?;
    *edits += 1;
    Ok(())
}

fn push_down(
    graph: &mut dyn GraphMutator,
    info: &SymbolInfo,
    settings: &PushDownSettings,
    edits: &mut usize,
) -> Result<()> {
    for target in &settings.targets {
        let copy = graph.copy_member(info.id, *target)?;
        log::debug!("pushed {} into {} as {}", info.describe(), target, copy);
        *edits += 1;
    }
    if settings.keep_abstract && info.kind == SymbolKind::Method {
        graph.make_abstract(info.id)?;
    } else {
        graph.delete_member(info.id)?;
    }
    *edits += 1;
    Ok(())
}
