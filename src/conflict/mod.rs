//! Conflict analysis.
//!
//! [`ConflictAnalyzer::analyze`] is a pure function of the rename set, the
//! collected usages and read-only graph queries. Every rule runs on its own
//! and the results are merged per subject into a [`ConflictReport`].

use crate::graph::SymbolGraph;
use crate::session::{MakeStaticSettings, PushDownSettings, Refactoring, RenameSet};
use crate::symbol::{capitalize, Location, SymbolId, SymbolInfo, SymbolKind};
use crate::usage::Usage;
use serde::Serialize;
use std::collections::HashSet;

/// What a conflict is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ConflictSubject {
    /// A declared symbol (usually an existing member that collides).
    Symbol(SymbolId),
    /// A usage site.
    Location(Location),
}

/// How serious a conflict is. Conflicts are advisory either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The result compiles but may behave differently.
    Warning,
    /// The result will most likely not compile.
    Error,
}

/// All reasons recorded against one subject.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictEntry {
    /// Offending symbol or location.
    pub subject: ConflictSubject,
    /// Human-readable subject, e.g. `method B.m()`.
    pub description: String,
    /// Reasons, without duplicates, in discovery order.
    pub reasons: Vec<String>,
    /// Highest severity among the reasons.
    pub severity: Severity,
}

/// Conflicts keyed by subject, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ConflictReport {
    entries: Vec<ConflictEntry>,
}

impl ConflictReport {
    /// Record a reason, merging it into the subject's entry if there is one.
    pub fn add(
        &mut self,
        subject: ConflictSubject,
        description: impl Into<String>,
        reason: impl Into<String>,
        severity: Severity,
    ) {
        let reason = reason.into();
        log::debug!("conflict: {}", reason);
        if let Some(entry) = self.entries.iter_mut().find(|e| e.subject == subject) {
            if !entry.reasons.contains(&reason) {
                entry.reasons.push(reason);
            }
            entry.severity = entry.severity.max(severity);
            return;
        }
        self.entries.push(ConflictEntry {
            subject,
            description: description.into(),
            reasons: vec![reason],
            severity,
        });
    }

    /// Entry for a subject.
    pub fn get(&self, subject: &ConflictSubject) -> Option<&ConflictEntry> {
        self.entries.iter().find(|e| &e.subject == subject)
    }

    /// All entries.
    pub fn entries(&self) -> &[ConflictEntry] {
        &self.entries
    }

    /// Number of distinct subjects.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was reported.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any entry is an error.
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|e| e.severity == Severity::Error)
    }
}

/// Whether two kinds share a namespace inside a class.
fn same_category(a: SymbolKind, b: SymbolKind) -> bool {
    match (a, b) {
        (SymbolKind::Method, SymbolKind::Method) | (SymbolKind::Class, SymbolKind::Class) => true,
        (SymbolKind::Field | SymbolKind::Variable, SymbolKind::Field | SymbolKind::Variable) => {
            true
        }
        _ => false,
    }
}

/// Innermost class whose declaration contains `location`.
pub(crate) fn enclosing_class(graph: &dyn SymbolGraph, location: &Location) -> Option<SymbolId> {
    let mut current = graph.enclosing_member(location);
    while let Some(id) = current {
        let info = graph.resolve(id)?;
        if info.kind == SymbolKind::Class {
            return Some(id);
        }
        current = info.container;
    }
    None
}

/// Detects conflicts for a planned change.
pub struct ConflictAnalyzer<'g> {
    graph: &'g dyn SymbolGraph,
}

impl<'g> ConflictAnalyzer<'g> {
    /// Create an analyzer over a graph.
    pub fn new(graph: &'g dyn SymbolGraph) -> Self {
        Self { graph }
    }

    /// Evaluate usages against the rules for `refactoring`.
    pub fn analyze(
        &self,
        set: &RenameSet,
        refactoring: &Refactoring,
        usages: &[Usage],
    ) -> ConflictReport {
        let mut report = ConflictReport::default();
        self.check_overriding(usages, &mut report);

        match refactoring {
            Refactoring::Rename => {
                for (id, new_name) in set.iter() {
                    let Some(info) = self.graph.resolve(id) else {
                        continue;
                    };
                    if info.name == new_name {
                        continue;
                    }
                    self.check_existing_name(set, &info, new_name, &mut report);
                    self.check_shadowing(&info, new_name, usages, &mut report);
                }
            }
            Refactoring::MakeStatic(settings) => {
                for (id, _) in set.iter() {
                    let Some(info) = self.graph.resolve(id) else {
                        continue;
                    };
                    self.check_internal_access(&info, settings, usages, &mut report);
                    self.check_field_parameters(&info, settings, usages, &mut report);
                }
            }
            Refactoring::PushDown(settings) => {
                for (id, _) in set.iter() {
                    let Some(info) = self.graph.resolve(id) else {
                        continue;
                    };
                    self.check_push_down(&info, settings, usages, &mut report);
                }
            }
        }

        log::info!("analysis found {} conflict(s)", report.len());
        report
    }

    fn describe(&self, id: SymbolId) -> String {
        self.graph
            .resolve(id)
            .map(|info| info.describe())
            .unwrap_or_else(|| format!("symbol {}", id))
    }

    fn describe_site(&self, location: &Location) -> String {
        self.graph
            .enclosing_member(location)
            .map(|id| self.describe(id))
            .unwrap_or_else(|| location.to_string())
    }

    /// Overriders are never silently compatible with the change.
    fn check_overriding(&self, usages: &[Usage], report: &mut ConflictReport) {
        for usage in usages {
            if let Usage::Overriding {
                overridden,
                overrider,
                ..
            } = usage
            {
                let overridden_desc = self.describe(*overridden);
                report.add(
                    ConflictSubject::Symbol(*overridden),
                    overridden_desc.clone(),
                    format!("{} is overridden by {}", overridden_desc, self.describe(*overrider)),
                    Severity::Warning,
                );
            }
        }
    }

    /// A sibling already named `new_name` (after the set's own renames).
    fn check_existing_name(
        &self,
        set: &RenameSet,
        info: &SymbolInfo,
        new_name: &str,
        report: &mut ConflictReport,
    ) {
        let siblings: Vec<SymbolId> = match info.container {
            Some(container) => self.graph.members(container),
            None => self
                .graph
                .symbols()
                .into_iter()
                .filter(|id| {
                    self.graph.resolve(*id).is_some_and(|s| {
                        s.container.is_none() && s.package == info.package
                    })
                })
                .collect(),
        };
        for sibling in siblings {
            if sibling == info.id {
                continue;
            }
            let Some(existing) = self.graph.resolve(sibling) else {
                continue;
            };
            let effective_name = set.get(sibling).unwrap_or(existing.name.as_str());
            if effective_name != new_name || !same_category(existing.kind, info.kind) {
                continue;
            }
            if info.kind == SymbolKind::Method && existing.signature != info.signature {
                continue;
            }
            let scope = info
                .container
                .map(|c| self.describe(c))
                .unwrap_or_else(|| format!("package '{}'", info.package));
            report.add(
                ConflictSubject::Symbol(existing.id),
                existing.describe(),
                format!("{} already contains {}", capitalize(&scope), existing.describe()),
                Severity::Error,
            );
        }
    }

    /// Unqualified field usages inside a method that declares `new_name` locally.
    fn check_shadowing(
        &self,
        info: &SymbolInfo,
        new_name: &str,
        usages: &[Usage],
        report: &mut ConflictReport,
    ) {
        if info.kind != SymbolKind::Field {
            return;
        }
        for usage in usages.iter().filter(|u| u.symbol() == info.id) {
            let unqualified = match usage {
                Usage::Internal { .. } => true,
                Usage::Structural {
                    qualifier, implicit, ..
                } => qualifier.is_none() && !implicit,
                _ => false,
            };
            if !unqualified {
                continue;
            }
            let Some(method) = self.graph.enclosing_member(usage.location()) else {
                continue;
            };
            let shadowing = self.graph.members(method).into_iter().find(|local| {
                self.graph
                    .resolve(*local)
                    .is_some_and(|l| l.kind == SymbolKind::Variable && l.name == new_name)
            });
            if shadowing.is_some() {
                report.add(
                    ConflictSubject::Location(usage.location().clone()),
                    format!("usage of {} at {}", info.name, usage.location()),
                    format!(
                        "Renamed {} would be shadowed by local variable {} in {}",
                        info.describe(),
                        new_name,
                        self.describe(method)
                    ),
                    Severity::Error,
                );
            }
        }
    }

    /// Instance members used from inside a member that becomes static.
    fn check_internal_access(
        &self,
        info: &SymbolInfo,
        settings: &MakeStaticSettings,
        usages: &[Usage],
        report: &mut ConflictReport,
    ) {
        for usage in usages {
            let Usage::Internal {
                symbol,
                referenced,
                is_self: false,
                ..
            } = usage
            else {
                continue;
            };
            if *symbol != info.id {
                continue;
            }
            let Some(member) = self.graph.resolve(*referenced) else {
                continue;
            };
            if member.is_static() || settings.make_class_parameter {
                continue;
            }
            let reason = if member.kind == SymbolKind::Field {
                if settings.parameter_for(member.id).is_some() {
                    continue;
                }
                format!(
                    "{} uses non-static {}, which is not passed as a parameter",
                    info.describe(),
                    member.describe()
                )
            } else {
                format!("{} uses {}, which needs class instance", info.describe(), member.describe())
            };
            report.add(
                ConflictSubject::Symbol(member.id),
                member.describe(),
                reason,
                Severity::Error,
            );
        }
    }

    /// Promoted fields that call sites cannot read, keyed by field and
    /// reported once per calling class.
    fn check_field_parameters(
        &self,
        info: &SymbolInfo,
        settings: &MakeStaticSettings,
        usages: &[Usage],
        report: &mut ConflictReport,
    ) {
        if settings.field_parameters.is_empty() {
            return;
        }
        let mut processed: HashSet<ConflictSubject> = HashSet::new();
        for usage in usages {
            let Usage::Structural {
                symbol,
                implicit: false,
                ..
            } = usage
            else {
                continue;
            };
            if *symbol != info.id {
                continue;
            }
            let accessing = enclosing_class(self.graph, usage.location());
            let site = match accessing {
                Some(class) => ConflictSubject::Symbol(class),
                None => ConflictSubject::Location(usage.location().clone()),
            };
            if !processed.insert(site) {
                continue;
            }
            let inaccessible: Vec<SymbolInfo> = settings
                .field_parameters
                .iter()
                .filter(|p| !self.graph.is_accessible(p.field, usage.location()))
                .filter_map(|p| self.graph.resolve(p.field))
                .collect();
            let container = match accessing {
                Some(class) => self.describe(class),
                None => self.describe_site(usage.location()),
            };
            let reason = match inaccessible.as_slice() {
                [] => continue,
                [single] => format!("Field {} is not accessible from {}", single.name, container),
                many => format!(
                    "Fields {} are not accessible from {}",
                    many.iter().map(|f| f.name.as_str()).collect::<Vec<_>>().join(", "),
                    container
                ),
            };
            for field in &inaccessible {
                report.add(
                    ConflictSubject::Symbol(field.id),
                    field.describe(),
                    reason.clone(),
                    Severity::Error,
                );
            }
        }
    }

    fn check_push_down(
        &self,
        member: &SymbolInfo,
        settings: &PushDownSettings,
        usages: &[Usage],
        report: &mut ConflictReport,
    ) {
        for target in &settings.targets {
            let Some(target) = self.graph.resolve(*target) else {
                continue;
            };
            self.check_target_collision(member, &target, report);
            self.check_visibility_after_move(member, &target, usages, report);
        }
        if !(settings.keep_abstract && member.kind == SymbolKind::Method) {
            self.check_source_class(member, usages, report);
        }
    }

    /// Collisions are keyed by the member already present in the target.
    fn check_target_collision(
        &self,
        member: &SymbolInfo,
        target: &SymbolInfo,
        report: &mut ConflictReport,
    ) {
        for existing in self.graph.members(target.id) {
            let Some(existing) = self.graph.resolve(existing) else {
                continue;
            };
            if existing.name != member.name || !same_category(existing.kind, member.kind) {
                continue;
            }
            let reason = match member.kind {
                SymbolKind::Method => {
                    if existing.signature != member.signature || member.is_abstract() {
                        continue;
                    }
                    format!("{} is already overridden in {}", member.describe(), target.describe())
                }
                SymbolKind::Class => format!(
                    "{} already contains inner class named {}",
                    capitalize(&target.describe()),
                    member.name
                ),
                SymbolKind::Field | SymbolKind::Variable => format!(
                    "{} already contains field {}",
                    capitalize(&target.describe()),
                    member.name
                ),
            };
            report.add(
                ConflictSubject::Symbol(existing.id),
                existing.describe(),
                reason,
                Severity::Error,
            );
        }
    }

    /// One warning per target: the scan stops at the first offending call site.
    fn check_visibility_after_move(
        &self,
        member: &SymbolInfo,
        target: &SymbolInfo,
        usages: &[Usage],
        report: &mut ConflictReport,
    ) {
        for usage in usages {
            let Usage::Structural {
                symbol,
                qualifier,
                implicit: false,
                ..
            } = usage
            else {
                continue;
            };
            if *symbol != member.id {
                continue;
            }
            let accessing = qualifier
                .as_ref()
                .filter(|q| !q.is_this)
                .and_then(|q| q.class)
                .or_else(|| enclosing_class(self.graph, usage.location()));
            let visible = accessing.is_some_and(|class| self.graph.is_inheritor_or_self(class, target.id));
            if visible {
                continue;
            }
            let (subject, description) = match accessing {
                Some(class) => (ConflictSubject::Symbol(class), self.describe(class)),
                None => (
                    ConflictSubject::Location(usage.location().clone()),
                    usage.location().to_string(),
                ),
            };
            report.add(
                subject,
                description,
                format!(
                    "{} pushed down to {} will not be visible from certain call sites",
                    capitalize(&member.describe()),
                    target.describe()
                ),
                Severity::Warning,
            );
            break;
        }
    }

    /// Members staying in the source class that use the pushed member.
    fn check_source_class(&self, member: &SymbolInfo, usages: &[Usage], report: &mut ConflictReport) {
        let Some(source) = member.container else {
            return;
        };
        for usage in usages.iter().filter(|u| u.symbol() == member.id) {
            if !matches!(usage, Usage::Structural { implicit: false, .. }) {
                continue;
            }
            let Some(using) = self.graph.enclosing_member(usage.location()) else {
                continue;
            };
            let Some(using_info) = self.graph.resolve(using) else {
                continue;
            };
            if using == member.id || using_info.container != Some(source) {
                continue;
            }
            report.add(
                ConflictSubject::Symbol(using),
                using_info.describe(),
                format!(
                    "{} uses {}, which is pushed down",
                    capitalize(&using_info.describe()),
                    member.describe()
                ),
                Severity::Error,
            );
        }
    }
}
