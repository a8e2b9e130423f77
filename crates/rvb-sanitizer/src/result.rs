//! Rejection types returned by the sanitizer
//!
//! A rejection carries enough detail to log where the submission went wrong,
//! but the text shown to the submitter is always the fixed [`REJECTION_MESSAGE`].

use serde::{Deserialize, Serialize};

/// Message written to the status artifact for every rejected submission
pub const REJECTION_MESSAGE: &str = "Invalid characters in statement";

/// Reserved exit code for a rejected submission
///
/// Chosen outside the range a cross-compiler returns on its own.
pub const REJECTION_CODE: i32 = 666;

/// Why a line was flagged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionKind {
    /// Directive argument contains a path separator (e.g. `/`)
    PathSeparator(String),

    /// Directive argument contains the `..` traversal token
    ParentTraversal,

    /// Source bytes are not valid UTF-8 text
    InvalidEncoding,
}

impl RejectionKind {
    /// Machine-readable form, e.g. "PATH_SEPARATOR:/"
    pub fn to_machine_string(&self) -> String {
        match self {
            RejectionKind::PathSeparator(sep) => format!("PATH_SEPARATOR:{}", sep),
            RejectionKind::ParentTraversal => "PARENT_TRAVERSAL".to_string(),
            RejectionKind::InvalidEncoding => "INVALID_ENCODING".to_string(),
        }
    }
}

impl std::fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionKind::PathSeparator(sep) => write!(f, "path separator '{}'", sep),
            RejectionKind::ParentTraversal => write!(f, "parent-directory traversal '..'"),
            RejectionKind::InvalidEncoding => write!(f, "source is not valid UTF-8"),
        }
    }
}

/// A rejected submission
///
/// Produced on the first flagged line; nothing after that line is inspected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("rejected at line {line}: {kind} in `{directive}` directive")]
pub struct SanitizeRejection {
    /// 1-based line number (first physical line of a continued line)
    pub line: usize,

    /// The directive token that matched, e.g. "#include"
    pub directive: String,

    /// What made the line unsafe
    pub kind: RejectionKind,
}

impl SanitizeRejection {
    /// Rejection for input that cannot be decoded as text
    pub fn invalid_encoding() -> Self {
        Self {
            line: 0,
            directive: String::new(),
            kind: RejectionKind::InvalidEncoding,
        }
    }

    /// The fixed, submitter-facing message
    pub fn message(&self) -> &'static str {
        REJECTION_MESSAGE
    }

    /// The reserved rejection exit code
    pub fn code(&self) -> i32 {
        REJECTION_CODE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_is_fixed_regardless_of_kind() {
        let a = SanitizeRejection {
            line: 3,
            directive: "#include".to_string(),
            kind: RejectionKind::ParentTraversal,
        };
        let b = SanitizeRejection::invalid_encoding();
        assert_eq!(a.message(), "Invalid characters in statement");
        assert_eq!(a.message(), b.message());
        assert_eq!(a.code(), 666);
        assert_eq!(b.code(), 666);
    }

    #[test]
    fn test_machine_strings() {
        assert_eq!(
            RejectionKind::PathSeparator("/".to_string()).to_machine_string(),
            "PATH_SEPARATOR:/"
        );
        assert_eq!(RejectionKind::ParentTraversal.to_machine_string(), "PARENT_TRAVERSAL");
        assert_eq!(RejectionKind::InvalidEncoding.to_machine_string(), "INVALID_ENCODING");
    }

    #[test]
    fn test_display_mentions_line_and_directive() {
        let rejection = SanitizeRejection {
            line: 12,
            directive: "#include".to_string(),
            kind: RejectionKind::PathSeparator("/".to_string()),
        };
        let text = rejection.to_string();
        assert!(text.contains("line 12"));
        assert!(text.contains("#include"));
    }

    #[test]
    fn test_serialize_kind_tagged() {
        let json = serde_json::to_value(RejectionKind::PathSeparator("/".to_string())).unwrap();
        assert_eq!(json["type"], "PATH_SEPARATOR");
        assert_eq!(json["details"], "/");
    }
}
