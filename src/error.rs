//! Cascade error types.
//!
//! All errors are typed and provide root cause information. Collection and
//! analysis problems are never raised through these: they are recorded as
//! [`Diagnostic`]s and conflict entries instead.

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for Cascade operations.
#[derive(Error, Debug)]
pub enum CascadeError {
    /// I/O error during file operations.
    #[error("I/O error for path {path}: {source}")]
    Io {
        /// The file path that caused the I/O error.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Tree-sitter parsing error.
    #[error("Parse error in {file}: {message}")]
    Parse {
        /// The file that failed to parse.
        file: PathBuf,
        /// The parse error message.
        message: String,
    },

    /// A symbol could not be located in the graph (deleted or invalidated by an edit).
    #[error("Unresolvable symbol: {symbol}")]
    UnresolvableSymbol {
        /// Description of the symbol that could not be resolved.
        symbol: String,
    },

    /// A structural edit is illegal given the current tree shape.
    #[error("Invalid operation on {symbol}: {reason}")]
    InvalidOperation {
        /// Description of the symbol being changed.
        symbol: String,
        /// Why the edit was rejected.
        reason: String,
    },

    /// A captured range no longer matches the current content.
    #[error("Stale usage at {file}:{start}..{end}: {reason}")]
    StaleUsage {
        /// File containing the stale range.
        file: String,
        /// Captured start byte offset.
        start: usize,
        /// Captured end byte offset.
        end: usize,
        /// What did not match.
        reason: String,
    },

    /// The caller cancelled the session.
    #[error("Session cancelled")]
    SessionCancelled,

    /// A session operation was invoked in the wrong state.
    #[error("Invalid session state: expected {expected}, was {actual}")]
    InvalidState {
        /// The state(s) the operation requires.
        expected: String,
        /// The state the session was in.
        actual: String,
    },

    /// Symbol not found by qualified name.
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// Qualified name matches more than one symbol.
    #[error("Ambiguous symbol '{name}': candidates {candidates:?}")]
    AmbiguousSymbol {
        /// The ambiguous qualified name.
        name: String,
        /// Descriptions of the matching symbols.
        candidates: Vec<String>,
    },

    /// Workspace manifest is malformed or inconsistent with the sources.
    #[error("Invalid manifest: {message}")]
    InvalidManifest {
        /// The validation error message.
        message: String,
    },

    /// Invalid plan schema.
    #[error("Invalid plan schema: {message}")]
    InvalidPlanSchema {
        /// The schema validation error message.
        message: String,
    },

    /// Plan execution failed at step.
    #[error("Plan execution failed at step {step}: {error}")]
    PlanExecutionFailed {
        /// The step number that failed.
        step: usize,
        /// The error that occurred.
        error: String,
    },

    /// Generic error with context.
    #[error("{0}")]
    Other(String),
}

impl CascadeError {
    /// Build an [`CascadeError::Io`] for a known path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CascadeError::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable identifier of the error variant, for JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            CascadeError::Io { .. } => "Io",
            CascadeError::Json(_) => "Json",
            CascadeError::Parse { .. } => "Parse",
            CascadeError::UnresolvableSymbol { .. } => "UnresolvableSymbol",
            CascadeError::InvalidOperation { .. } => "InvalidOperation",
            CascadeError::StaleUsage { .. } => "StaleUsage",
            CascadeError::SessionCancelled => "SessionCancelled",
            CascadeError::InvalidState { .. } => "InvalidState",
            CascadeError::SymbolNotFound(_) => "SymbolNotFound",
            CascadeError::AmbiguousSymbol { .. } => "AmbiguousSymbol",
            CascadeError::InvalidManifest { .. } => "InvalidManifest",
            CascadeError::InvalidPlanSchema { .. } => "InvalidPlanSchema",
            CascadeError::PlanExecutionFailed { .. } => "PlanExecutionFailed",
            CascadeError::Other(_) => "Other",
        }
    }

    /// Symbol context carried by the error, if any.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            CascadeError::UnresolvableSymbol { symbol }
            | CascadeError::InvalidOperation { symbol, .. } => Some(symbol),
            CascadeError::SymbolNotFound(name) | CascadeError::AmbiguousSymbol { name, .. } => {
                Some(name)
            }
            _ => None,
        }
    }

    /// File context carried by the error, if any.
    pub fn file_path(&self) -> Option<&Path> {
        match self {
            CascadeError::Io { path, .. } | CascadeError::Parse { file: path, .. } => Some(path),
            CascadeError::StaleUsage { file, .. } => Some(Path::new(file)),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CascadeError {
    fn from(err: std::io::Error) -> Self {
        CascadeError::Io {
            path: PathBuf::from("<unknown>"),
            source: err,
        }
    }
}

/// Result type alias for Cascade operations.
pub type Result<T> = std::result::Result<T, CascadeError>;

/// Severity of a recorded diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    /// Informational note.
    Note,
    /// Something was skipped or dropped but the pipeline continued.
    Warning,
    /// A step failed for one symbol.
    Error,
}

/// A non-fatal problem recorded while running a pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    /// Pipeline stage that produced the diagnostic (e.g. "collect").
    pub stage: String,
    /// Severity.
    pub level: DiagnosticLevel,
    /// Human-readable message.
    pub message: String,
    /// Symbol the diagnostic is about, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// File the diagnostic is about, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic.
    pub fn new(stage: &str, level: DiagnosticLevel, message: impl Into<String>) -> Self {
        Self {
            stage: stage.to_string(),
            level,
            message: message.into(),
            symbol: None,
            file: None,
        }
    }

    /// Attach the symbol this diagnostic refers to.
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    /// Attach the file this diagnostic refers to.
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}
