//! Sanitize-and-build pipeline
//!
//! One submission, in strict sequence:
//! 1. Resolve the project directory under the project base
//! 2. Read the source and gate it through the sanitizer
//! 3. Write the source back (rewrite mode) and the symbol manifest (retain)
//! 4. Build the invocation for the selected profile and isolation mode
//! 5. Run the toolchain under the time limit and cancellation token
//! 6. Write the status artifact (and summary.json when enabled)
//!
//! A rejection stops at step 2: the toolchain is never invoked and no binary
//! is produced. Environment failures (unreachable compiler or runtime,
//! unreadable artifacts) leave a fixed status that names no paths.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rvb_sanitizer::{SanitizeMode, SanitizeRejection, REJECTION_MESSAGE};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::artifacts::{remove_if_exists, write_atomic, ArtifactError, SubmissionPaths};
use crate::cancel::CancellationToken;
use crate::config::LaneConfig;
use crate::executor::{BuildOutcome, BuildResult, Executor, ExecutorConfig, ExecutorError};
use crate::invocation::{Invocation, InvocationBuilder, InvocationError};
use crate::status::{timeout_message, StatusError, StatusReporter, CANCELLED_MESSAGE, ENVIRONMENT_FAILURE_MESSAGE};
use crate::summary::{
    is_runtime_failure_code, signal_exit_code, BuildSummary, FailureKind, Status,
    EXIT_CODE_CANCELLED, EXIT_CODE_ENVIRONMENT, EXIT_CODE_REJECTED, EXIT_CODE_SUCCESS,
    EXIT_CODE_TIMEOUT,
};
use crate::toolchain::Method;

/// Pipeline errors
///
/// Every variant is an environment failure: the submission itself was never
/// judged.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("project layout error: {0}")]
    Artifacts(#[from] ArtifactError),

    #[error("failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invocation error: {0}")]
    Invocation(#[from] InvocationError),

    #[error("executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("container runtime failed with exit code {code}")]
    RuntimeUnavailable { code: i32 },

    #[error("status error: {0}")]
    Status(#[from] StatusError),
}

impl PipelineError {
    /// Exit code for this error
    pub fn exit_code(&self) -> i32 {
        EXIT_CODE_ENVIRONMENT
    }

    pub fn failure_kind(&self) -> FailureKind {
        FailureKind::EnvironmentFailure
    }

    fn io(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> Self {
        let path = path.to_path_buf();
        move |source| PipelineError::Io {
            action,
            path,
            source,
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// How a submission ended
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub status: Status,

    /// Failure kind (when status is not success)
    pub failure_kind: Option<FailureKind>,

    /// Exit code the caller should return
    pub exit_code: i32,

    /// Exit code of the toolchain process, when it exited on its own
    pub toolchain_exit_code: Option<i32>,

    /// Present when the sanitizer rejected the source
    pub rejection: Option<SanitizeRejection>,

    /// The binary, when the build succeeded
    pub binary: Option<PathBuf>,

    pub duration: Duration,
}

impl PipelineOutcome {
    pub fn success(&self) -> bool {
        self.status == Status::Success
    }
}

/// The pipeline
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: LaneConfig,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(config: LaneConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use a shared cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &LaneConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Construct the toolchain invocation for a submission without running it
    pub fn plan(
        &self,
        project_base: impl Into<PathBuf>,
        project_dir: impl AsRef<Path>,
        method: Method,
    ) -> PipelineResult<Invocation> {
        let paths = SubmissionPaths::new(project_base, project_dir, self.config.artifacts.clone())?;
        let profile = self.config.profile(method);
        Ok(InvocationBuilder::new(profile, &self.config.isolation).build(&paths)?)
    }

    /// Sanitize and build one submission
    ///
    /// `Ok` carries every judged outcome (success, rejection, toolchain
    /// failure, timeout, cancellation) with its status already written. `Err`
    /// is an environment failure; the fixed environment status is written
    /// when the project directory is usable.
    pub fn run(
        &self,
        project_base: impl Into<PathBuf>,
        project_dir: impl AsRef<Path>,
        method: Method,
    ) -> PipelineResult<PipelineOutcome> {
        let start = Instant::now();
        let paths = SubmissionPaths::new(project_base, project_dir, self.config.artifacts.clone())
            .map_err(|e| {
                error!(error = %e, "rejecting project directory");
                e
            })?;

        info!(
            project = %paths.relative().display(),
            method = %method,
            isolation = %self.config.isolation.mode,
            "starting build"
        );

        match self.execute(&paths, method, start) {
            Ok(outcome) => {
                info!(
                    status = ?outcome.status,
                    exit_code = outcome.exit_code,
                    duration_ms = outcome.duration.as_millis() as u64,
                    "build finished"
                );
                Ok(outcome)
            }
            Err(e) => {
                error!(error = %e, "build environment failure");
                self.report_environment_failure(&paths, method, start);
                Err(e)
            }
        }
    }

    fn execute(
        &self,
        paths: &SubmissionPaths,
        method: Method,
        start: Instant,
    ) -> PipelineResult<PipelineOutcome> {
        paths.ensure_exists()?;
        let profile = self.config.profile(method);
        let reporter = StatusReporter::new(paths.status());

        let source_path = paths.source();
        let source = fs::read(&source_path).map_err(PipelineError::io("read", &source_path))?;

        if self.config.artifacts.remove_stale_binary {
            self.remove_binary(paths)?;
        }

        let sanitized = match self.config.sanitizer.build().sanitize_bytes(&source) {
            Ok(text) => text,
            Err(rejection) => {
                warn!(
                    line = rejection.line,
                    directive = %rejection.directive,
                    reason = %rejection.kind.to_machine_string(),
                    "source rejected"
                );
                reporter.report(REJECTION_MESSAGE)?;
                let outcome = PipelineOutcome {
                    status: Status::Rejected,
                    failure_kind: Some(FailureKind::ValidationRejection),
                    exit_code: EXIT_CODE_REJECTED,
                    toolchain_exit_code: None,
                    rejection: Some(rejection),
                    binary: None,
                    duration: start.elapsed(),
                };
                self.write_summary(paths, method, &outcome, None, None);
                return Ok(outcome);
            }
        };
        debug!(bytes = sanitized.len(), "source accepted");

        if self.config.sanitizer.mode == SanitizeMode::Rewrite {
            write_atomic(&source_path, sanitized.as_bytes())
                .map_err(PipelineError::io("rewrite", &source_path))?;
        }

        if profile.needs_symbol_manifest() {
            let manifest = paths.symbol_manifest();
            write_atomic(&manifest, profile.retention_manifest().as_bytes())
                .map_err(PipelineError::io("write", &manifest))?;
            debug!(symbols = ?profile.retain_symbols, "wrote symbol manifest");
        }

        let invocation = InvocationBuilder::new(profile, &self.config.isolation).build(paths)?;
        info!(argv = ?invocation.argv(), "toolchain invocation");

        let result = if self.cancel.is_cancelled() {
            warn!("cancelled before the toolchain started");
            BuildResult {
                outcome: BuildOutcome::Cancelled,
                stdout: Vec::new(),
                stderr: Vec::new(),
                duration: Duration::ZERO,
            }
        } else {
            Executor::new(ExecutorConfig::from(&self.config.timeout))
                .with_cancellation(self.cancel.clone())
                .run(&invocation)?
        };

        if !result.stdout.is_empty() {
            debug!(stdout = %String::from_utf8_lossy(&result.stdout), "toolchain stdout");
        }

        let (status, failure_kind, exit_code, text) = match result.outcome {
            BuildOutcome::Exited(code)
                if self.config.isolation.mode.uses_runtime() && is_runtime_failure_code(code) =>
            {
                warn!(code, stderr = %result.stderr_text(), "container runtime failure");
                return Err(PipelineError::RuntimeUnavailable { code });
            }
            BuildOutcome::Exited(EXIT_CODE_SUCCESS) => {
                (Status::Success, None, EXIT_CODE_SUCCESS, result.stderr_text())
            }
            BuildOutcome::Exited(code) => (
                Status::Failed,
                Some(FailureKind::ToolchainFailure),
                code,
                result.stderr_text(),
            ),
            BuildOutcome::Signaled(signal) => (
                Status::Failed,
                Some(FailureKind::ToolchainFailure),
                signal_exit_code(signal),
                result.stderr_text(),
            ),
            BuildOutcome::TimedOut => (
                Status::Failed,
                Some(FailureKind::ToolchainTimeout),
                EXIT_CODE_TIMEOUT,
                timeout_message(self.config.timeout.overall_seconds),
            ),
            BuildOutcome::Cancelled => (
                Status::Cancelled,
                Some(FailureKind::Cancelled),
                EXIT_CODE_CANCELLED,
                CANCELLED_MESSAGE.to_string(),
            ),
        };

        if status != Status::Success && self.config.artifacts.remove_stale_binary {
            // A killed linker can leave a partial output behind.
            self.remove_binary(paths)?;
        }
        reporter.report(&text)?;

        let binary = paths.binary();
        let outcome = PipelineOutcome {
            status,
            failure_kind,
            exit_code,
            toolchain_exit_code: match result.outcome {
                BuildOutcome::Exited(code) => Some(code),
                _ => None,
            },
            rejection: None,
            binary: (status == Status::Success && binary.is_file()).then_some(binary),
            duration: start.elapsed(),
        };

        let signal = match result.outcome {
            BuildOutcome::Signaled(signal) => Some(signal),
            _ => None,
        };
        self.write_summary(paths, method, &outcome, Some(sanitized.as_bytes()), signal);
        Ok(outcome)
    }

    fn remove_binary(&self, paths: &SubmissionPaths) -> PipelineResult<()> {
        let binary = paths.binary();
        if remove_if_exists(&binary).map_err(PipelineError::io("remove", &binary))? {
            debug!("removed stale binary");
        }
        Ok(())
    }

    /// Best effort: the original error is what gets returned
    fn report_environment_failure(&self, paths: &SubmissionPaths, method: Method, start: Instant) {
        if !paths.local_dir().is_dir() {
            return;
        }
        if let Err(e) = StatusReporter::new(paths.status()).report(ENVIRONMENT_FAILURE_MESSAGE) {
            error!(error = %e, "could not write environment failure status");
        }
        if self.config.artifacts.remove_stale_binary {
            if let Err(e) = remove_if_exists(&paths.binary()) {
                error!(error = %e, "could not remove binary after environment failure");
            }
        }
        let outcome = PipelineOutcome {
            status: Status::Failed,
            failure_kind: Some(FailureKind::EnvironmentFailure),
            exit_code: EXIT_CODE_ENVIRONMENT,
            toolchain_exit_code: None,
            rejection: None,
            binary: None,
            duration: start.elapsed(),
        };
        self.write_summary(paths, method, &outcome, None, None);
    }

    fn write_summary(
        &self,
        paths: &SubmissionPaths,
        method: Method,
        outcome: &PipelineOutcome,
        source: Option<&[u8]>,
        signal: Option<i32>,
    ) {
        if !self.config.report.write_summary {
            return;
        }

        let isolation = self.config.isolation.mode;
        let duration_ms = outcome.duration.as_millis() as u64;
        let mut summary = match outcome.failure_kind {
            None => BuildSummary::success(method, isolation, duration_ms),
            Some(kind) => {
                BuildSummary::failure(kind, outcome.exit_code, method, isolation, duration_ms)
            }
        };
        if let Some(code) = outcome.toolchain_exit_code {
            summary = summary.with_toolchain_exit_code(code);
        }
        if let Some(signal) = signal {
            summary = summary.with_toolchain_term_signal(signal);
        }
        if let Some(source) = source {
            summary = summary.with_source(source);
        }

        if let Err(e) = summary.write_to_file(&paths.summary()) {
            warn!(error = %e, "could not write summary.json");
        }
    }
}

/// Build one submission with the built-in configuration
///
/// `method` is the raw discriminant: "linux" selects the hosted profile,
/// anything else (or nothing) selects bare-metal.
pub fn run(
    project_base: impl Into<PathBuf>,
    project_dir: impl AsRef<Path>,
    method: Option<&str>,
) -> PipelineResult<PipelineOutcome> {
    Pipeline::new(LaneConfig::default()).run(
        project_base,
        project_dir,
        Method::from_discriminant(method),
    )
}
