//! Outcome taxonomy and reserved exit codes

use serde::{Deserialize, Serialize};

/// Clean build
pub const EXIT_CODE_SUCCESS: i32 = 0;

/// Sanitizer rejected the source
pub const EXIT_CODE_REJECTED: i32 = 666;

/// Toolchain exceeded the time limit
pub const EXIT_CODE_TIMEOUT: i32 = 667;

/// Toolchain, container runtime or project artifacts unavailable
pub const EXIT_CODE_ENVIRONMENT: i32 = 668;

/// Build cancelled from outside
pub const EXIT_CODE_CANCELLED: i32 = 669;

/// Run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Toolchain exited 0
    Success,
    /// Toolchain ran but the build did not succeed
    Failed,
    /// Sanitizer rejected the source (no execution)
    Rejected,
    /// Cancelled from outside
    Cancelled,
}

impl Status {
    pub fn is_failure(&self) -> bool {
        !matches!(self, Status::Success)
    }
}

/// Failure kind - categorizes the cause of failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Inclusion directive escaping the project directory
    ValidationRejection,
    /// Compiler exited non-zero (or died on a signal)
    ToolchainFailure,
    /// Compiler exceeded the time limit
    ToolchainTimeout,
    /// Compiler or container runtime unreachable, or project I/O failed
    EnvironmentFailure,
    /// External cancellation
    Cancelled,
}

impl FailureKind {
    /// Reserved exit code, if the kind has one
    ///
    /// Toolchain failures have none: the compiler's own code is passed through.
    pub fn reserved_exit_code(&self) -> Option<i32> {
        match self {
            FailureKind::ValidationRejection => Some(EXIT_CODE_REJECTED),
            FailureKind::ToolchainFailure => None,
            FailureKind::ToolchainTimeout => Some(EXIT_CODE_TIMEOUT),
            FailureKind::EnvironmentFailure => Some(EXIT_CODE_ENVIRONMENT),
            FailureKind::Cancelled => Some(EXIT_CODE_CANCELLED),
        }
    }

    pub fn status(&self) -> Status {
        match self {
            FailureKind::ValidationRejection => Status::Rejected,
            FailureKind::Cancelled => Status::Cancelled,
            _ => Status::Failed,
        }
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            FailureKind::ValidationRejection => "Source rejected by sanitizer",
            FailureKind::ToolchainFailure => "Compilation failed",
            FailureKind::ToolchainTimeout => "Compilation timed out",
            FailureKind::EnvironmentFailure => "Build environment unavailable",
            FailureKind::Cancelled => "Compilation cancelled",
        }
    }
}

/// Exit code for a process killed by `signal`, as a shell reports it
pub fn signal_exit_code(signal: i32) -> i32 {
    128 + signal
}

/// Whether a container runtime exit code means the runtime itself failed
///
/// `docker run`/`docker exec` (and podman) reserve 125 for daemon errors,
/// 126 for a command that cannot be invoked and 127 for one that is missing.
pub fn is_runtime_failure_code(code: i32) -> bool {
    matches!(code, 125..=127)
}
