//! Command-line interface for Cascade.
//!
//! This module handles argument parsing and output payloads only.
//! NO refactoring logic is performed here.

use crate::error::CascadeError;
use crate::plan::PlanStep;
use clap::Parser;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Cascade: multi-entity refactoring engine.
#[derive(Parser, Debug)]
#[command(name = "cascade")]
#[command(author, version, about, long_about = None)]
#[command(subcommand_required = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Options shared by every refactoring command.
#[derive(clap::Args, Debug, Clone)]
pub struct SessionArgs {
    /// Workspace directory containing `cascade.json`.
    #[arg(short, long, default_value = ".")]
    pub workspace: PathBuf,

    /// Qualified name of the symbol, e.g. `Counter.count`.
    #[arg(short, long)]
    pub symbol: String,

    /// Also rewrite occurrences in comments and string literals.
    #[arg(long)]
    pub search_in_comments: bool,

    /// Also rewrite occurrences in non-source files.
    #[arg(long)]
    pub search_text: bool,

    /// Proceed even when conflicts are reported.
    #[arg(short, long)]
    pub yes: bool,

    /// Accept every proposed cascading rename.
    #[arg(long)]
    pub accept_cascades: bool,

    /// Run the session without writing any file.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the session report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Available Cascade commands.
#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Rename a symbol along with its usages and dependent symbols.
    Rename {
        /// Session options.
        #[command(flatten)]
        session: SessionArgs,

        /// New name.
        #[arg(short, long)]
        to: String,
    },

    /// Turn an instance method or inner class into a static one.
    MakeStatic {
        /// Session options.
        #[command(flatten)]
        session: SessionArgs,

        /// Pass the former receiver as a parameter with this name.
        #[arg(long, value_name = "NAME")]
        class_param: Option<String>,

        /// Pass a field as its own parameter (`field=name`, repeatable).
        #[arg(long = "field-param", value_name = "FIELD=NAME", value_parser = parse_field_param)]
        field_params: Vec<(String, String)>,

        /// Leave call sites untouched.
        #[arg(long)]
        no_replace_usages: bool,
    },

    /// Move a member from its class into subclasses.
    PushDown {
        /// Session options.
        #[command(flatten)]
        session: SessionArgs,

        /// Qualified name of a target subclass (repeatable).
        #[arg(short, long = "target", required = true)]
        targets: Vec<String>,

        /// Leave an abstract declaration of a pushed method behind.
        #[arg(long)]
        keep_abstract: bool,
    },

    /// Execute a multi-step refactoring plan.
    Plan {
        /// Path to the plan.json file.
        #[arg(short, long)]
        file: PathBuf,
    },
}

impl Commands {
    /// Session options and the equivalent plan step, for refactoring commands.
    pub fn to_step(&self) -> Option<(&SessionArgs, PlanStep)> {
        let (session, mut step) = match self {
            Commands::Rename { session, to } => (
                session,
                PlanStep {
                    op: "rename".to_string(),
                    to: Some(to.clone()),
                    ..PlanStep::default()
                },
            ),
            Commands::MakeStatic {
                session,
                class_param,
                field_params,
                no_replace_usages,
            } => (
                session,
                PlanStep {
                    op: "make_static".to_string(),
                    class_param: class_param.clone(),
                    field_params: field_params.iter().cloned().collect::<BTreeMap<_, _>>(),
                    replace_usages: !no_replace_usages,
                    ..PlanStep::default()
                },
            ),
            Commands::PushDown {
                session,
                targets,
                keep_abstract,
            } => (
                session,
                PlanStep {
                    op: "push_down".to_string(),
                    targets: targets.clone(),
                    keep_abstract: *keep_abstract,
                    ..PlanStep::default()
                },
            ),
            Commands::Plan { .. } => return None,
        };
        step.symbol = session.symbol.clone();
        step.search_in_comments = session.search_in_comments;
        step.search_text_occurrences = session.search_text;
        step.accept_cascades = session.accept_cascades;
        step.proceed_on_conflicts = session.yes;
        Some((session, step))
    }
}

fn parse_field_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((field, name)) if !field.is_empty() && !name.is_empty() => {
            Ok((field.to_string(), name.to_string()))
        }
        _ => Err(format!("expected FIELD=NAME, got '{}'", raw)),
    }
}

/// Parse command-line arguments.
///
/// This function is the entry point for CLI argument parsing.
/// It returns the parsed Cli struct or exits on error.
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// JSON success payload for CLI responses.
#[derive(Serialize)]
pub struct CliSuccessPayload {
    /// Status indicator ("ok").
    pub status: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Optional structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CliSuccessPayload {
    /// Construct a payload containing only the message.
    pub fn message_only(message: String) -> Self {
        Self {
            status: "ok",
            message,
            data: None,
        }
    }

    /// Construct a payload with structured data.
    pub fn with_data(message: String, data: Value) -> Self {
        Self {
            status: "ok",
            message,
            data: Some(data),
        }
    }
}

/// JSON error payload for CLI responses.
#[derive(Serialize)]
pub struct CliErrorPayload {
    /// Status indicator ("error").
    pub status: &'static str,
    /// Structured error details.
    pub error: ErrorDetails,
}

/// Details for a CLI error payload.
#[derive(Serialize)]
pub struct ErrorDetails {
    /// Error kind identifier (SymbolNotFound, etc.).
    pub kind: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Optional symbol context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Optional file context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl CliErrorPayload {
    /// Build payload from a CascadeError instance.
    pub fn from_error(error: &CascadeError) -> Self {
        CliErrorPayload {
            status: "error",
            error: ErrorDetails {
                kind: error.kind(),
                message: error.to_string(),
                symbol: error.symbol().map(|s| s.to_string()),
                file: error
                    .file_path()
                    .map(|path| path.to_string_lossy().to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rename_args_become_plan_step() {
        let cli = Cli::try_parse_from([
            "cascade",
            "rename",
            "--workspace",
            "/tmp/ws",
            "--symbol",
            "Counter.count",
            "--to",
            "value",
            "--yes",
            "--accept-cascades",
        ])
        .unwrap();
        let (session, step) = cli.command.to_step().unwrap();
        assert_eq!(session.workspace, PathBuf::from("/tmp/ws"));
        assert_eq!(step.op, "rename");
        assert_eq!(step.to.as_deref(), Some("value"));
        assert!(step.proceed_on_conflicts);
        assert!(step.accept_cascades);
    }

    #[test]
    fn test_field_params_parse() {
        let cli = Cli::try_parse_from([
            "cascade",
            "make-static",
            "-s",
            "A.m",
            "--class-param",
            "a",
            "--field-param",
            "x=px",
            "--field-param",
            "y=py",
        ])
        .unwrap();
        let (_, step) = cli.command.to_step().unwrap();
        assert_eq!(step.class_param.as_deref(), Some("a"));
        assert_eq!(step.field_params.get("x").map(String::as_str), Some("px"));
        assert_eq!(step.field_params.len(), 2);
        assert!(step.replace_usages);
    }

    #[test]
    fn test_malformed_field_param_is_rejected() {
        let parsed = Cli::try_parse_from(["cascade", "make-static", "-s", "A.m", "--field-param", "x"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_error_payload_carries_kind() {
        let payload = CliErrorPayload::from_error(&CascadeError::SymbolNotFound("A.zz".into()));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"]["kind"], "SymbolNotFound");
        assert_eq!(json["error"]["symbol"], "A.zz");
    }
}
