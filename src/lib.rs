//! Cascade: multi-entity refactoring engine.
//!
//! A refactoring starts from one symbol and grows into a set of related
//! changes. This library collects and classifies the usages of every symbol
//! in that set, reports conflicts before anything is touched, proposes
//! cascading renames through pluggable policies, and applies the result in
//! two phases: structural edits first, comment and text occurrences after.

#![warn(missing_docs)]
// env_logger is used by src/main.rs (binary), not this library
#![expect(unused_crate_dependencies)]

pub mod apply;
pub mod cascade;
pub mod cli;
pub mod config;
pub mod conflict;
pub mod error;
pub mod graph;
pub mod plan;
pub mod search;
pub mod session;
pub mod symbol;
pub mod usage;

/// Re-export common error types for convenience.
pub use error::{CascadeError, Result};

/// Re-export the engine configuration.
pub use config::{EngineConfig, EngineSettings};

/// Re-export the in-memory graph.
pub use graph::MemoryGraph;

/// Re-export session entry points.
pub use session::{begin_session, RefactoringSession, SessionRequest, SessionState};

/// Cascade version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
