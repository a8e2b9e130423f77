//! Outcome taxonomy, exit codes and the optional summary.json

mod build_summary;
mod failure;

pub use build_summary::{BuildSummary, SUMMARY_SCHEMA_ID, SUMMARY_SCHEMA_VERSION};
pub use failure::{
    is_runtime_failure_code, signal_exit_code, FailureKind, Status, EXIT_CODE_CANCELLED,
    EXIT_CODE_ENVIRONMENT, EXIT_CODE_REJECTED, EXIT_CODE_SUCCESS, EXIT_CODE_TIMEOUT,
};
