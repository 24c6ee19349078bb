//! Refactoring sessions.
//!
//! A [`RefactoringSession`] walks one change through collection, conflict
//! analysis, confirmation, cascading and apply:
//!
//! ```text
//! Collecting -> Analyzing -> AwaitingConfirmation -> Cascading -> Applying -> Done
//!     ^                                                  |            |
//!     +------------------ accepted candidates -----------+            +-> Failed
//! ```
//!
//! `Cancelled` is reachable from every state before `Applying`. Nothing is
//! edited before `Applying`, so a cancelled session leaves the graph as it
//! found it.

mod request;

pub use request::{
    FieldParameter, MakeStaticSettings, PushDownSettings, Refactoring, RenameSet, SessionRequest,
};

use crate::apply::{ApplyResult, TransactionalApplier};
use crate::cascade::{CascadeCandidate, CascadeResolver};
use crate::config::EngineConfig;
use crate::conflict::{ConflictAnalyzer, ConflictReport};
use crate::error::{CascadeError, Diagnostic, Result};
use crate::graph::{GraphMutator, SymbolGraph, TextSearch};
use crate::search::Progress;
use crate::symbol::{SymbolId, SymbolInfo, SymbolKind};
use crate::usage::{Usage, UsageCollector};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Usages are to be collected.
    Collecting,
    /// Conflicts are being computed.
    Analyzing,
    /// Waiting for the caller to accept or decline the conflict report.
    AwaitingConfirmation,
    /// Cascade candidates are being proposed and decided.
    Cascading,
    /// Ready to apply, or applying.
    Applying,
    /// Apply finished; per-symbol failures are in the result.
    Done,
    /// Stopped before anything was edited.
    Cancelled,
    /// Apply was aborted midway.
    Failed,
}

impl SessionState {
    /// Whether the session has nothing left to do.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Done | SessionState::Cancelled | SessionState::Failed
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Collecting => "collecting",
            SessionState::Analyzing => "analyzing",
            SessionState::AwaitingConfirmation => "awaiting-confirmation",
            SessionState::Cascading => "cascading",
            SessionState::Applying => "applying",
            SessionState::Done => "done",
            SessionState::Cancelled => "cancelled",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// The caller's side of the confirmation boundary.
pub trait Decider {
    /// Proceed despite the conflict report?
    fn confirm(&mut self, conflicts: &ConflictReport, usages: &[Usage]) -> bool;

    /// One accept/decline decision per candidate, in order.
    fn decide(&mut self, candidates: &[CascadeCandidate]) -> Vec<bool>;
}

/// Fixed answers, for plans and the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoDecider {
    /// Proceed even when conflicts were reported.
    pub proceed_on_conflicts: bool,
    /// Accept every cascade candidate.
    pub accept_cascades: bool,
}

impl Decider for AutoDecider {
    fn confirm(&mut self, conflicts: &ConflictReport, _usages: &[Usage]) -> bool {
        conflicts.is_empty() || self.proceed_on_conflicts
    }

    fn decide(&mut self, candidates: &[CascadeCandidate]) -> Vec<bool> {
        vec![self.accept_cascades; candidates.len()]
    }
}

/// Serializable snapshot of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    /// Session id.
    pub id: String,
    /// RFC 3339 start time.
    pub started_at: String,
    /// Refactoring kind.
    pub refactoring: &'static str,
    /// Current state.
    pub state: SessionState,
    /// Rename set entries, as descriptions of the symbols.
    pub renames: Vec<RenameEntry>,
    /// Usages of the last collection pass.
    pub usages: Vec<Usage>,
    /// Conflicts of the last analysis.
    pub conflicts: ConflictReport,
    /// Candidates still awaiting a decision.
    pub candidates: Vec<CascadeCandidate>,
    /// Problems recorded so far.
    pub diagnostics: Vec<Diagnostic>,
    /// Apply result, once applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ApplyResult>,
}

/// One rename set entry in a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenameEntry {
    /// The symbol.
    pub symbol: SymbolId,
    /// New name.
    pub new_name: String,
}

/// One refactoring in progress.
#[derive(Debug)]
pub struct RefactoringSession {
    id: uuid::Uuid,
    started_at: String,
    config: EngineConfig,
    refactoring: Refactoring,
    text_search: TextSearch,
    primary: SymbolId,
    set: RenameSet,
    state: SessionState,
    usages: Vec<Usage>,
    conflicts: ConflictReport,
    candidates: Vec<CascadeCandidate>,
    declined: HashSet<(SymbolId, String)>,
    diagnostics: Vec<Diagnostic>,
    result: Option<ApplyResult>,
}

/// Validate a request and start a session in `Collecting`.
///
/// The request is checked against the current graph: the primary symbol must
/// resolve and suit the refactoring, and a rename needs a new name.
pub fn begin_session(
    config: EngineConfig,
    graph: &dyn SymbolGraph,
    request: SessionRequest,
) -> Result<RefactoringSession> {
    let primary = graph
        .resolve(request.primary)
        .ok_or_else(|| CascadeError::UnresolvableSymbol {
            symbol: request.primary.to_string(),
        })?;
    let new_name = match &request.refactoring {
        Refactoring::Rename => {
            let name = request.new_name.clone().ok_or_else(|| invalid(&primary, "no new name given"))?;
            if name == primary.name {
                return Err(invalid(&primary, "the new name equals the current name"));
            }
            name
        }
        Refactoring::MakeStatic(settings) => {
            validate_make_static(graph, &primary, settings)?;
            primary.name.clone()
        }
        Refactoring::PushDown(settings) => {
            validate_push_down(graph, &primary, settings)?;
            primary.name.clone()
        }
    };

    let mut set = RenameSet::new();
    set.insert(primary.id, new_name);

    let text_search = TextSearch {
        comments_and_strings: request.text_search.comments_and_strings
            || config.text_search.comments_and_strings,
        plain_text_files: request.text_search.plain_text_files
            || config.text_search.plain_text_files,
    };
    let session = RefactoringSession {
        id: uuid::Uuid::new_v4(),
        started_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        config,
        refactoring: request.refactoring,
        text_search,
        primary: primary.id,
        set,
        state: SessionState::Collecting,
        usages: Vec::new(),
        conflicts: ConflictReport::default(),
        candidates: Vec::new(),
        declined: HashSet::new(),
        diagnostics: Vec::new(),
        result: None,
    };
    log::info!(
        "session {} started: {} {}",
        session.id,
        session.refactoring.name(),
        primary.describe()
    );
    Ok(session)
}

fn invalid(symbol: &SymbolInfo, reason: &str) -> CascadeError {
    CascadeError::InvalidOperation {
        symbol: symbol.describe(),
        reason: reason.to_string(),
    }
}

fn validate_make_static(
    graph: &dyn SymbolGraph,
    primary: &SymbolInfo,
    settings: &MakeStaticSettings,
) -> Result<()> {
    if !matches!(primary.kind, SymbolKind::Method | SymbolKind::Class) {
        return Err(invalid(primary, "only methods and inner classes can be made static"));
    }
    let Some(container) = primary.container else {
        return Err(invalid(primary, "a top-level class is already static"));
    };
    if primary.is_static() {
        return Err(invalid(primary, "already static"));
    }
    let mut names = HashSet::new();
    if settings.make_class_parameter {
        names.insert(settings.class_parameter_name.as_str());
    }
    for parameter in &settings.field_parameters {
        let field = graph.resolve(parameter.field).ok_or_else(|| {
            CascadeError::UnresolvableSymbol {
                symbol: parameter.field.to_string(),
            }
        })?;
        if field.kind != SymbolKind::Field || field.container != Some(container) {
            return Err(invalid(
                primary,
                &format!("{} is not a field of the containing class", field.describe()),
            ));
        }
        if !names.insert(parameter.name.as_str()) {
            return Err(invalid(
                primary,
                &format!("parameter name {} is used twice", parameter.name),
            ));
        }
    }
    Ok(())
}

fn validate_push_down(
    graph: &dyn SymbolGraph,
    primary: &SymbolInfo,
    settings: &PushDownSettings,
) -> Result<()> {
    let Some(source) = primary.container else {
        return Err(invalid(primary, "only members of a class can be pushed down"));
    };
    if settings.targets.is_empty() {
        return Err(invalid(primary, "no target classes given"));
    }
    for target in &settings.targets {
        let class = graph
            .resolve(*target)
            .ok_or_else(|| CascadeError::UnresolvableSymbol {
                symbol: target.to_string(),
            })?;
        if class.kind != SymbolKind::Class
            || class.id == source
            || !graph.is_inheritor_or_self(class.id, source)
        {
            return Err(invalid(
                primary,
                &format!("{} is not a subclass of the containing class", class.describe()),
            ));
        }
    }
    Ok(())
}

impl RefactoringSession {
    /// Unique id of this session.
    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The symbol the session started from.
    pub fn primary(&self) -> SymbolId {
        self.primary
    }

    /// The refactoring being performed.
    pub fn refactoring(&self) -> &Refactoring {
        &self.refactoring
    }

    /// Symbols to change and their new names.
    pub fn rename_set(&self) -> &RenameSet {
        &self.set
    }

    /// Usages of the last collection pass.
    pub fn usages(&self) -> &[Usage] {
        &self.usages
    }

    /// Conflicts of the last analysis.
    pub fn conflicts(&self) -> &ConflictReport {
        &self.conflicts
    }

    /// Candidates awaiting a decision.
    pub fn candidates(&self) -> &[CascadeCandidate] {
        &self.candidates
    }

    /// Problems recorded so far.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// The apply result, once applied.
    pub fn result(&self) -> Option<&ApplyResult> {
        self.result.as_ref()
    }

    fn expect_state(&self, expected: SessionState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CascadeError::InvalidState {
                expected: expected.to_string(),
                actual: self.state.to_string(),
            })
        }
    }

    fn transition(&mut self, next: SessionState) {
        log::info!("session {}: {} -> {}", self.id, self.state, next);
        self.state = next;
    }

    /// Collect usages of the rename set, then analyze them.
    ///
    /// Ends in `AwaitingConfirmation`, or in `Cancelled` with
    /// [`CascadeError::SessionCancelled`] if `progress` asked to stop.
    pub fn collect(&mut self, graph: &dyn SymbolGraph, progress: &dyn Progress) -> Result<()> {
        self.expect_state(SessionState::Collecting)?;
        let collector = UsageCollector::new(graph)
            .with_text_search(self.text_search)
            .with_accessor_overrides(self.config.accessor_overrides);
        let collection = match collector.collect(&self.set, &self.refactoring, progress) {
            Ok(collection) => collection,
            Err(CascadeError::SessionCancelled) => {
                self.transition(SessionState::Cancelled);
                return Err(CascadeError::SessionCancelled);
            }
            Err(e) => return Err(e),
        };
        log::info!(
            "session {}: {} usages of {} symbols",
            self.id,
            collection.usages.len(),
            self.set.len()
        );
        self.usages = collection.usages;
        self.diagnostics.extend(collection.diagnostics);

        self.transition(SessionState::Analyzing);
        self.conflicts =
            ConflictAnalyzer::new(graph).analyze(&self.set, &self.refactoring, &self.usages);
        if !self.conflicts.is_empty() {
            log::info!("session {}: {} conflicts", self.id, self.conflicts.len());
        }
        self.transition(SessionState::AwaitingConfirmation);
        Ok(())
    }

    /// Answer the conflict report: proceed to cascading or cancel.
    pub fn confirm(&mut self, proceed: bool) -> Result<()> {
        self.expect_state(SessionState::AwaitingConfirmation)?;
        if proceed {
            self.transition(SessionState::Cascading);
        } else {
            self.transition(SessionState::Cancelled);
        }
        Ok(())
    }

    /// Ask the cascade policies for dependent renames.
    ///
    /// Candidates the caller declined earlier are not offered again. With
    /// nothing to decide the session moves straight to `Applying`.
    pub fn propose_cascade(
        &mut self,
        graph: &dyn SymbolGraph,
        progress: &dyn Progress,
    ) -> Result<&[CascadeCandidate]> {
        self.expect_state(SessionState::Cascading)?;
        let resolver = CascadeResolver::new(graph, &self.config.policies);
        let proposed =
            match resolver.propose(&self.set, &self.refactoring, &self.usages, progress) {
                Ok(proposed) => proposed,
                Err(CascadeError::SessionCancelled) => {
                    self.transition(SessionState::Cancelled);
                    return Err(CascadeError::SessionCancelled);
                }
                Err(e) => return Err(e),
            };
        self.candidates = proposed
            .into_iter()
            .filter(|c| !self.declined.contains(&(c.symbol, c.new_name.clone())))
            .collect();
        if self.candidates.is_empty() {
            self.transition(SessionState::Applying);
        }
        Ok(&self.candidates)
    }

    /// Accept or decline each pending candidate, in order.
    ///
    /// Accepted candidates join the rename set and send the session back to
    /// `Collecting`; declining everything moves on to `Applying`.
    pub fn resolve_cascade(&mut self, decisions: &[bool]) -> Result<()> {
        self.expect_state(SessionState::Cascading)?;
        if decisions.len() != self.candidates.len() {
            return Err(CascadeError::Other(format!(
                "expected {} cascade decisions, got {}",
                self.candidates.len(),
                decisions.len()
            )));
        }
        let mut accepted = 0;
        for (candidate, accept) in std::mem::take(&mut self.candidates).into_iter().zip(decisions) {
            if !*accept {
                self.declined.insert((candidate.symbol, candidate.new_name));
                continue;
            }
            if self.set.insert(candidate.symbol, candidate.new_name.clone()) {
                log::info!(
                    "session {}: cascading {} -> {}",
                    self.id,
                    candidate.description,
                    candidate.new_name
                );
                accepted += 1;
            } else {
                log::warn!(
                    "{} already renamed, ignoring proposal {}",
                    candidate.description,
                    candidate.new_name
                );
            }
        }
        if accepted > 0 {
            self.transition(SessionState::Collecting);
        } else {
            self.transition(SessionState::Applying);
        }
        Ok(())
    }

    /// Stop the session. Only possible before `Applying`.
    pub fn cancel(&mut self) -> Result<()> {
        match self.state {
            SessionState::Collecting
            | SessionState::Analyzing
            | SessionState::AwaitingConfirmation
            | SessionState::Cascading => {
                self.transition(SessionState::Cancelled);
                Ok(())
            }
            other => Err(CascadeError::InvalidState {
                expected: "a state before applying".to_string(),
                actual: other.to_string(),
            }),
        }
    }

    /// Apply the finalized rename set.
    ///
    /// The caller provides exclusive write access through `graph`. Ends in
    /// `Done`, or `Failed` when `progress` cancelled midway.
    pub fn run(
        &mut self,
        graph: &mut dyn GraphMutator,
        progress: &dyn Progress,
    ) -> Result<&ApplyResult> {
        self.expect_state(SessionState::Applying)?;
        let applier =
            TransactionalApplier::new(&self.config.handlers, self.config.check_identifiers);
        let result = applier.apply(graph, &self.set, &self.refactoring, &self.usages, progress);
        log::info!(
            "session {}: {} applied, {} failed, {} non-code occurrences written",
            self.id,
            result.applied_count(),
            result.failed_count(),
            result.non_code.written
        );
        let next = if result.aborted {
            SessionState::Failed
        } else {
            SessionState::Done
        };
        self.diagnostics.extend(result.diagnostics.iter().cloned());
        self.transition(next);
        Ok(self.result.insert(result))
    }

    /// Run the session to a terminal state, asking `decider` at each boundary.
    ///
    /// Cancellation is reported through the returned state, not as an error.
    pub fn drive(
        &mut self,
        graph: &mut dyn GraphMutator,
        decider: &mut dyn Decider,
        progress: &dyn Progress,
    ) -> Result<SessionState> {
        loop {
            let step = match self.state {
                SessionState::Collecting | SessionState::Analyzing => {
                    self.collect(graph.as_graph(), progress)
                }
                SessionState::AwaitingConfirmation => {
                    let proceed = decider.confirm(&self.conflicts, &self.usages);
                    self.confirm(proceed)
                }
                SessionState::Cascading => match self.propose_cascade(graph.as_graph(), progress) {
                    Ok(_) => {
                        if self.state == SessionState::Cascading {
                            let decisions = decider.decide(&self.candidates);
                            self.resolve_cascade(&decisions)
                        } else {
                            Ok(())
                        }
                    }
                    Err(e) => Err(e),
                },
                SessionState::Applying => self.run(graph, progress).map(|_| ()),
                state => return Ok(state),
            };
            match step {
                Ok(()) => {}
                Err(CascadeError::SessionCancelled) => return Ok(self.state),
                Err(e) => return Err(e),
            }
        }
    }

    /// Snapshot for display or JSON output.
    pub fn report(&self) -> SessionReport {
        SessionReport {
            id: self.id.to_string(),
            started_at: self.started_at.clone(),
            refactoring: self.refactoring.name(),
            state: self.state,
            renames: self
                .set
                .iter()
                .map(|(symbol, new_name)| RenameEntry {
                    symbol,
                    new_name: new_name.to_string(),
                })
                .collect(),
            usages: self.usages.clone(),
            conflicts: self.conflicts.clone(),
            candidates: self.candidates.clone(),
            diagnostics: self.diagnostics.clone(),
            result: self.result.clone(),
        }
    }
}
