//! Progress reporting and cancellation for the suspension points.
//!
//! Reference collection and cascade policy searches are the only places that
//! poll a [`Progress`]; analysis and apply run without interleaving.

pub mod text;

use crate::error::{CascadeError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Progress and cancellation channel consumed by long-running searches.
pub trait Progress {
    /// Describe what is being searched.
    fn set_text(&self, _text: &str) {}

    /// Report completion in `[0.0, 1.0]`.
    fn set_fraction(&self, _fraction: f64) {}

    /// Whether the caller asked to stop.
    fn is_cancelled(&self) -> bool;

    /// Return [`CascadeError::SessionCancelled`] if cancellation was requested.
    fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(CascadeError::SessionCancelled)
        } else {
            Ok(())
        }
    }
}

/// A progress sink that never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Shared cancellation flag; clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl Progress for CancellationToken {
    fn set_text(&self, text: &str) {
        log::debug!("progress: {}", text);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
