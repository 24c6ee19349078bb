//! JSON plan format for sequential multi-step refactorings.
//!
//! Each step is one full session, decided automatically by the step's flags.
//! Steps run in order against the workspace the plan file lives in; the plan
//! stops at the first failing step and earlier steps stay applied.

use crate::config::EngineSettings;
use crate::error::{CascadeError, Result};
use crate::graph::{lookup, load_workspace, FileSummary, MemoryGraph, SymbolGraph};
use crate::search::NoProgress;
use crate::session::{
    begin_session, AutoDecider, FieldParameter, MakeStaticSettings, PushDownSettings,
    SessionReport, SessionRequest, SessionState,
};
use crate::symbol::{SymbolId, SymbolKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// A refactoring plan containing multiple sequential steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Steps to execute, in order.
    pub steps: Vec<PlanStep>,
}

/// One refactoring step.
///
/// Equivalent to one `cascade rename`, `make-static` or `push-down`
/// invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanStep {
    /// `rename`, `make_static` or `push_down`.
    pub op: String,

    /// Qualified name of the primary symbol, e.g. `Counter.count`.
    pub symbol: String,

    /// New name (rename only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,

    /// Qualified names of target subclasses (push-down only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,

    /// Keep an abstract declaration in the source class (push-down only).
    #[serde(default)]
    pub keep_abstract: bool,

    /// Name of the class instance parameter (make-static only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_param: Option<String>,

    /// Field name to parameter name (make-static only).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_params: BTreeMap<String, String>,

    /// Rewrite call sites (make-static only).
    #[serde(default = "default_true")]
    pub replace_usages: bool,

    /// Also rewrite occurrences in comments and string literals.
    #[serde(default)]
    pub search_in_comments: bool,

    /// Also rewrite occurrences in non-source files.
    #[serde(default)]
    pub search_text_occurrences: bool,

    /// Accept every cascade candidate.
    #[serde(default)]
    pub accept_cascades: bool,

    /// Proceed even when conflicts are reported.
    #[serde(default)]
    pub proceed_on_conflicts: bool,
}

fn default_true() -> bool {
    true
}

/// Parse a plan from a JSON file.
///
/// # Returns
/// * `Ok(Plan)` - Parsed plan with validated schema
/// * `Err(CascadeError)` - I/O error, JSON parse error or schema validation error
pub fn parse_plan(plan_path: &Path) -> Result<Plan> {
    let content = fs::read_to_string(plan_path).map_err(|e| CascadeError::io(plan_path, e))?;

    let plan: Plan =
        serde_json::from_str(&content).map_err(|e| CascadeError::InvalidPlanSchema {
            message: format!("JSON parse error: {}", e),
        })?;

    if plan.steps.is_empty() {
        return Err(CascadeError::InvalidPlanSchema {
            message: "Plan must contain at least one step".to_string(),
        });
    }

    for (i, step) in plan.steps.iter().enumerate() {
        validate_step(step).map_err(|message| CascadeError::InvalidPlanSchema {
            message: format!("Step {} {}", i + 1, message),
        })?;
    }

    Ok(plan)
}

fn validate_step(step: &PlanStep) -> std::result::Result<(), String> {
    if step.symbol.is_empty() {
        return Err("has empty 'symbol' field".to_string());
    }
    match step.op.as_str() {
        "rename" => match step.to.as_deref() {
            None | Some("") => Err("has no 'to' field".to_string()),
            Some(_) => Ok(()),
        },
        "make_static" => Ok(()),
        "push_down" if step.targets.is_empty() => Err("has no 'targets'".to_string()),
        "push_down" => Ok(()),
        other => Err(format!(
            "has invalid 'op': '{}'. Must be one of: rename, make_static, push_down",
            other
        )),
    }
}

/// Translate a step into a session request against `graph`.
pub fn build_request(graph: &dyn SymbolGraph, step: &PlanStep) -> Result<SessionRequest> {
    let primary = lookup(graph, &step.symbol)?;
    let request = match step.op.as_str() {
        "rename" => {
            let to = step.to.clone().ok_or_else(|| CascadeError::InvalidPlanSchema {
                message: format!("rename of {} has no new name", step.symbol),
            })?;
            SessionRequest::rename(primary, to)
        }
        "make_static" => {
            let mut settings = MakeStaticSettings {
                replace_usages: step.replace_usages,
                ..MakeStaticSettings::default()
            };
            if let Some(name) = &step.class_param {
                settings.make_class_parameter = true;
                settings.class_parameter_name = name.clone();
            }
            for (field, name) in &step.field_params {
                settings.field_parameters.push(FieldParameter {
                    field: sibling_field(graph, primary, field)?,
                    name: name.clone(),
                });
            }
            SessionRequest::make_static(primary, settings)
        }
        "push_down" => {
            let targets = step
                .targets
                .iter()
                .map(|t| lookup(graph, t))
                .collect::<Result<Vec<_>>>()?;
            SessionRequest::push_down(
                primary,
                PushDownSettings {
                    targets,
                    keep_abstract: step.keep_abstract,
                },
            )
        }
        other => {
            return Err(CascadeError::InvalidPlanSchema {
                message: format!("unknown op '{}'", other),
            })
        }
    };
    Ok(request
        .search_in_comments(step.search_in_comments)
        .search_text_occurrences(step.search_text_occurrences))
}

/// Field `name` of the class containing `member`.
fn sibling_field(
    graph: &dyn SymbolGraph,
    member: SymbolId,
    name: &str,
) -> Result<SymbolId> {
    let container = graph
        .resolve(member)
        .and_then(|info| info.container)
        .ok_or_else(|| CascadeError::SymbolNotFound(name.to_string()))?;
    graph
        .members(container)
        .into_iter()
        .filter_map(|id| graph.resolve(id))
        .find(|info| info.kind == SymbolKind::Field && info.name == name)
        .map(|info| info.id)
        .ok_or_else(|| CascadeError::SymbolNotFound(name.to_string()))
}

/// Run one step as a full session against an in-memory graph.
///
/// Nothing is written to disk; see [`MemoryGraph::persist`].
pub fn run_step(
    graph: &mut MemoryGraph,
    settings: &EngineSettings,
    step: &PlanStep,
) -> Result<SessionReport> {
    let request = build_request(&*graph, step)?;
    let mut session = begin_session(settings.clone().into_config(), &*graph, request)?;
    let mut decider = AutoDecider {
        proceed_on_conflicts: step.proceed_on_conflicts,
        accept_cascades: step.accept_cascades,
    };
    session.drive(graph, &mut decider, &NoProgress)?;
    Ok(session.report())
}

/// Why a finished step does not count as a success, if it does not.
pub fn step_failure(report: &SessionReport) -> Option<String> {
    match report.state {
        SessionState::Done => {
            let result = report.result.as_ref()?;
            if result.is_complete() {
                None
            } else {
                Some(format!(
                    "{} of {} symbols failed",
                    result.failed_count(),
                    result.outcomes.len()
                ))
            }
        }
        SessionState::Cancelled => Some(format!(
            "cancelled with {} unresolved conflicts",
            report.conflicts.len()
        )),
        other => Some(format!("session ended in state {}", other)),
    }
}

/// Execute a plan with multiple sequential steps.
///
/// This function:
/// 1. Parses the plan from JSON
/// 2. Loads the workspace and its settings
/// 3. Runs each step as a session and persists it before the next
/// 4. Stops on first failure; previous steps remain applied (no global rollback)
///
/// # Returns
/// * `Ok(Vec<String>)` - Success messages for each executed step
/// * `Err(CascadeError)` - First error encountered during execution
pub fn execute_plan(plan_path: &Path, workspace_dir: &Path) -> Result<Vec<String>> {
    let plan = parse_plan(plan_path)?;
    let settings = EngineSettings::load(workspace_dir)?;

    let mut success_messages = Vec::new();
    for (step_num, step) in plan.steps.iter().enumerate() {
        let step_index = step_num + 1;
        match execute_single_step(workspace_dir, &settings, step) {
            Ok(msg) => {
                log::info!("Step {}: {}", step_index, msg);
                success_messages.push(msg);
            }
            Err(e) => {
                return Err(CascadeError::PlanExecutionFailed {
                    step: step_index,
                    error: e.to_string(),
                });
            }
        }
    }

    Ok(success_messages)
}

/// Load, run and persist one step.
fn execute_single_step(
    workspace_dir: &Path,
    settings: &EngineSettings,
    step: &PlanStep,
) -> Result<String> {
    let mut graph = load_workspace(workspace_dir)?;
    let report = run_step(&mut graph, settings, step)?;
    if let Some(reason) = step_failure(&report) {
        return Err(CascadeError::Other(reason));
    }
    let written: Vec<FileSummary> = graph.persist()?;
    let applied = report.result.as_ref().map_or(0, |r| r.applied_count());
    Ok(format!(
        "{} {}: {} symbols changed, {} files written",
        step.op,
        step.symbol,
        applied,
        written.len()
    ))
}
