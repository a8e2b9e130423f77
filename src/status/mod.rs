//! Status artifact reporting
//!
//! The status artifact is the submitter's only view of a run besides the exit
//! code. It is overwritten on every run, never appended to, and carries either
//! the compiler's diagnostics verbatim or one of the fixed messages below.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::artifacts::write_atomic;

/// Status text when the toolchain or container runtime cannot be reached
pub const ENVIRONMENT_FAILURE_MESSAGE: &str = "Build environment unavailable";

/// Status text after external cancellation
pub const CANCELLED_MESSAGE: &str = "Compilation cancelled";

/// Status text after the toolchain hit the time limit
pub fn timeout_message(seconds: u64) -> String {
    format!("Compilation timed out after {} seconds", seconds)
}

/// Status reporting errors
#[derive(Debug, thiserror::Error)]
#[error("failed to write status artifact {path}: {source}")]
pub struct StatusError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Writes the status artifact of one submission
#[derive(Debug, Clone)]
pub struct StatusReporter {
    path: PathBuf,
}

impl StatusReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the status artifact with `text`
    pub fn report(&self, text: &str) -> Result<(), StatusError> {
        debug!(bytes = text.len(), "writing status artifact");
        write_atomic(&self.path, text.as_bytes()).map_err(|source| StatusError {
            path: self.path.clone(),
            source,
        })
    }
}
