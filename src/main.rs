//! Cascade CLI binary
//!
//! This is the main entry point for the cascade command-line interface.
//! The CLI is a thin adapter over existing APIs - NO logic is implemented here.

use cascade::cli::{CliErrorPayload, CliSuccessPayload, Commands, SessionArgs};
use cascade::plan::PlanStep;
use cascade::session::{SessionReport, SessionState};
use cascade::CascadeError;
use std::path::Path;
use std::process::ExitCode;

/// Exit code when conflicts were declined and nothing was applied.
const EXIT_DECLINED: u8 = 2;
/// Exit code when apply reported per-symbol failures or was aborted.
const EXIT_PARTIAL: u8 = 3;

fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = cascade::cli::parse_args();

    // Initialize logger if verbose
    if cli.verbose {
        env_logger::init();
    }

    if let Commands::Plan { file } = &cli.command {
        return match execute_plan(file) {
            Ok(msg) => {
                println!("{}", msg);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::from(1)
            }
        };
    }

    let Some((session, step)) = cli.command.to_step() else {
        return ExitCode::from(1);
    };
    match execute_session(session, &step) {
        Ok((report, written)) => print_report(session, &report, written),
        Err(e) => {
            if session.json {
                print_json(&CliErrorPayload::from_error(&e));
            } else {
                eprintln!("Error: {}", e);
            }
            ExitCode::from(1)
        }
    }
}

/// Execute one refactoring command.
///
/// This function is a thin adapter that:
/// 1. Loads the workspace and its settings
/// 2. Runs the step as an automatically decided session
/// 3. Persists the workspace unless this is a dry run or nothing was applied
///
/// All logic is delegated to the plan module.
fn execute_session(
    session: &SessionArgs,
    step: &PlanStep,
) -> Result<(SessionReport, usize), CascadeError> {
    let mut graph = cascade::graph::load_workspace(&session.workspace)?;
    let settings = cascade::EngineSettings::load(&session.workspace)?;
    let report = cascade::plan::run_step(&mut graph, &settings, step)?;

    let applied = report.result.as_ref().is_some_and(|r| r.applied_count() > 0);
    let written = if session.dry_run || !applied {
        0
    } else {
        graph.persist()?.len()
    };
    Ok((report, written))
}

/// Execute the plan command.
///
/// The workspace is the directory containing the plan file.
fn execute_plan(plan_path: &Path) -> Result<String, CascadeError> {
    let workspace_dir = plan_path
        .parent()
        .ok_or_else(|| CascadeError::Other(
            "Cannot determine workspace directory from plan path".to_string(),
        ))?;

    let messages = cascade::plan::execute_plan(plan_path, workspace_dir)?;
    for (i, msg) in messages.iter().enumerate() {
        println!("Step {}: {}", i + 1, msg);
    }

    Ok(format!(
        "Plan executed successfully: {} steps completed",
        messages.len()
    ))
}

fn exit_code(report: &SessionReport) -> ExitCode {
    match report.state {
        SessionState::Done if report.result.as_ref().is_some_and(|r| r.is_complete()) => {
            ExitCode::SUCCESS
        }
        SessionState::Cancelled => ExitCode::from(EXIT_DECLINED),
        _ => ExitCode::from(EXIT_PARTIAL),
    }
}

fn print_report(session: &SessionArgs, report: &SessionReport, written: usize) -> ExitCode {
    let summary = summarize(report, written, session.dry_run);
    if session.json {
        match serde_json::to_value(report) {
            Ok(data) => print_json(&CliSuccessPayload::with_data(summary, data)),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::from(1);
            }
        }
    } else {
        for entry in report.conflicts.entries() {
            for reason in &entry.reasons {
                println!("conflict: {}", reason);
            }
        }
        for diagnostic in &report.diagnostics {
            println!("{:?}: {}", diagnostic.level, diagnostic.message);
        }
        if let Some(result) = &report.result {
            for outcome in &result.outcomes {
                println!("{} -> {}: {:?}", outcome.description, outcome.new_name, outcome.status);
            }
        }
        println!("{}", summary);
    }
    exit_code(report)
}

fn summarize(report: &SessionReport, written: usize, dry_run: bool) -> String {
    match (&report.result, report.state) {
        (Some(result), _) => format!(
            "{} {}: {} applied, {} failed, {} files written{}",
            report.refactoring,
            report.state,
            result.applied_count(),
            result.failed_count(),
            written,
            if dry_run { " (dry run)" } else { "" }
        ),
        (None, state) => format!(
            "{} {}: {} usages, {} conflicts, nothing applied",
            report.refactoring,
            state,
            report.usages.len(),
            report.conflicts.len()
        ),
    }
}

fn print_json<T: serde::Serialize>(payload: &T) {
    match serde_json::to_string_pretty(payload) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error: {}", e),
    }
}
