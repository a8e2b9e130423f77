//! Explain output for sanitizer decisions
//!
//! Structured JSON and human-readable forms of a single decision, used by
//! the `check` command.

use serde::{Deserialize, Serialize};

use crate::result::{SanitizeRejection, REJECTION_CODE, REJECTION_MESSAGE};

/// A sanitizer decision in displayable form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizeExplanation {
    /// Whether the source passed the gate
    pub accepted: bool,

    /// Exit code the pipeline would use for this decision alone
    pub code: i32,

    /// Flagged line (1-based), if rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,

    /// Matched directive, if rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directive: Option<String>,

    /// Machine-readable reason, if rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Submitter-facing message, if rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SanitizeExplanation {
    /// Build from a sanitizer outcome
    pub fn from_outcome(outcome: &Result<(), SanitizeRejection>) -> Self {
        match outcome {
            Ok(()) => Self {
                accepted: true,
                code: 0,
                line: None,
                directive: None,
                reason: None,
                message: None,
            },
            Err(rejection) => Self {
                accepted: false,
                code: REJECTION_CODE,
                line: Some(rejection.line).filter(|l| *l > 0),
                directive: Some(rejection.directive.clone()).filter(|d| !d.is_empty()),
                reason: Some(rejection.kind.to_machine_string()),
                message: Some(REJECTION_MESSAGE.to_string()),
            },
        }
    }

    /// Format as JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Format as human-readable text
    pub fn to_human(&self) -> String {
        if self.accepted {
            return "Decision: ACCEPTED".to_string();
        }

        let mut lines = vec!["Decision: REJECTED".to_string()];
        if let Some(line) = self.line {
            lines.push(format!("Line: {}", line));
        }
        if let Some(ref directive) = self.directive {
            lines.push(format!("Directive: {}", directive));
        }
        if let Some(ref reason) = self.reason {
            lines.push(format!("Reason: {}", reason));
        }
        lines.push(format!("Exit code: {}", self.code));
        lines.join("\n")
    }
}
