//! rv-build lane: sanitize-and-build for untrusted RISC-V submissions
//!
//! Takes user-submitted C++ source from a project directory, rejects
//! inclusion directives that reach outside it, cross-compiles the rest with a
//! RISC-V toolchain (locally or in a container) and leaves a status artifact
//! plus an exit code behind.

pub mod artifacts;
pub mod cancel;
pub mod config;
pub mod executor;
pub mod invocation;
pub mod isolation;
pub mod pipeline;
pub mod signal;
pub mod status;
pub mod summary;
pub mod timeout;
pub mod toolchain;

pub use artifacts::{ArtifactError, ArtifactsConfig, SubmissionPaths};
pub use cancel::CancellationToken;
pub use config::{CliOverrides, ConfigError, EffectiveConfig, LaneConfig};
pub use executor::{BuildOutcome, BuildResult, Executor, ExecutorConfig, ExecutorError};
pub use invocation::{Invocation, InvocationBuilder, InvocationError};
pub use isolation::{Capability, IsolationConfig, IsolationKind, Privilege};
pub use pipeline::{run, Pipeline, PipelineError, PipelineOutcome};
pub use summary::{BuildSummary, FailureKind, Status};
pub use toolchain::{select_profile, Method, StripPolicy, ToolchainProfile};

pub use rvb_sanitizer::{sanitize, SanitizeMode, SanitizeRejection, Sanitizer, SanitizerConfig};
