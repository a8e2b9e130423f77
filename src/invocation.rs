//! Toolchain invocation construction
//!
//! The invocation is an immutable argument vector assembled from typed
//! configuration (profile + isolation + submission paths). It is handed to
//! the executor as a literal list and never goes through a shell, so a
//! crafted file name or flag cannot inject commands.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::artifacts::SubmissionPaths;
use crate::isolation::{Capability, IsolationConfig, IsolationKind};
use crate::toolchain::{ToolchainError, ToolchainProfile};

/// Invocation construction errors
#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    #[error("toolchain profile error: {0}")]
    Toolchain(#[from] ToolchainError),

    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),
}

/// A fully constructed command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    /// Program to execute
    pub program: String,

    /// Arguments, passed verbatim
    pub args: Vec<String>,

    pub isolation: IsolationKind,

    /// Host capabilities this invocation relies on
    pub capabilities: Vec<Capability>,

    /// Working directory for the local process, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl Invocation {
    /// Program followed by its arguments
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Format as JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Builds the invocation for one submission
pub struct InvocationBuilder<'a> {
    profile: &'a ToolchainProfile,
    isolation: &'a IsolationConfig,
}

impl<'a> InvocationBuilder<'a> {
    pub fn new(profile: &'a ToolchainProfile, isolation: &'a IsolationConfig) -> Self {
        Self { profile, isolation }
    }

    /// Assemble the command for a submission
    ///
    /// Source, output and manifest paths are translated to what the compiler
    /// sees: local paths in direct mode, mount-relative paths in container
    /// modes.
    pub fn build(&self, paths: &SubmissionPaths) -> Result<Invocation, InvocationError> {
        let dir = self.isolation.toolchain_dir(paths);
        let names = paths.names();

        let source = path_arg(&dir.join(&names.source))?;
        let output = path_arg(&dir.join(&names.binary))?;
        let manifest = if self.profile.needs_symbol_manifest() {
            Some(path_arg(&dir.join(&names.symbol_manifest))?)
        } else {
            None
        };

        let compiler_args = self
            .profile
            .compiler_args(&source, &output, manifest.as_deref())?;

        Ok(self.isolation.wrap(self.profile, compiler_args, paths))
    }
}

fn path_arg(path: &Path) -> Result<String, InvocationError> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| InvocationError::NonUtf8Path(path.to_path_buf()))
}
