//! Sanitizer gate for submitted source
//!
//! The sanitizer is a deny-on-match gate that runs before any toolchain is
//! invoked. It flags a line when the line carries an inclusion directive AND
//! either a path separator or the `..` traversal token, which is the pattern
//! used to pull host files into a translation unit compiled on a real
//! filesystem.
//!
//! The check is purely syntactic. It does not run the preprocessor, so an
//! include whose operand comes from a macro (`#define P "/etc/passwd"`
//! followed by `#include P`) is not seen, nor is anything the compiler reads
//! by other means. The toolchain's isolation mode is the real boundary.
//!
//! It is a pure function over text. Writing the result back to storage is the
//! caller's job, and only happens on a clean result.

mod explain;
mod result;

pub use explain::SanitizeExplanation;
pub use result::{RejectionKind, SanitizeRejection, REJECTION_CODE, REJECTION_MESSAGE};

use serde::{Deserialize, Serialize};

/// Directive that is always checked, whatever the configuration says
pub const INCLUDE_DIRECTIVE: &str = "#include";

/// Preprocessor keywords recognized after a spaced `#` (or the `%:` digraph)
const SPACED_KEYWORDS: &[&str] = &["include", "import"];

/// What the caller does with a clean result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanitizeMode {
    /// Write the sanitized text back over the source artifact
    #[default]
    Rewrite,
    /// Validate only; the source artifact is left untouched
    PassThrough,
}

/// Patterns the sanitizer looks for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizerConfig {
    /// Substrings that mark a line as an inclusion directive
    pub directive_tokens: Vec<String>,

    /// Path separators that may not appear on a directive line
    pub separators: Vec<String>,

    /// Parent-directory traversal token
    pub traversal_token: String,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            directive_tokens: vec![
                INCLUDE_DIRECTIVE.to_string(),
                "#import".to_string(),
                ".incbin".to_string(),
            ],
            separators: vec!["/".to_string(), "\\".to_string()],
            traversal_token: "..".to_string(),
        }
    }
}

/// The sanitizer
#[derive(Debug, Clone)]
pub struct Sanitizer {
    directive_tokens: Vec<String>,
    separators: Vec<String>,
    traversal_token: String,
}

impl Sanitizer {
    /// Create a sanitizer from configuration
    ///
    /// Empty patterns are dropped (an empty substring matches every line),
    /// and `#include` is always part of the directive set.
    pub fn new(config: SanitizerConfig) -> Self {
        let mut directive_tokens: Vec<String> = config
            .directive_tokens
            .into_iter()
            .filter(|t| !t.is_empty())
            .collect();
        if !directive_tokens.iter().any(|t| t == INCLUDE_DIRECTIVE) {
            directive_tokens.insert(0, INCLUDE_DIRECTIVE.to_string());
        }

        let separators = config
            .separators
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect();

        let traversal_token = if config.traversal_token.is_empty() {
            "..".to_string()
        } else {
            config.traversal_token
        };

        Self {
            directive_tokens,
            separators,
            traversal_token,
        }
    }

    /// Validate source text
    ///
    /// Returns the concatenation of all lines, unchanged, when no line is
    /// flagged. Stops at the first flagged line otherwise.
    ///
    /// A physical line ending in `\` continues onto the next one, so a
    /// directive split across lines is checked as a whole.
    pub fn sanitize(&self, source: &str) -> Result<String, SanitizeRejection> {
        let mut sanitized = String::with_capacity(source.len());
        let mut logical = String::new();
        let mut logical_start: Option<usize> = None;

        for (index, line) in source.split_inclusive('\n').enumerate() {
            let line_no = index + 1;
            let body = line.trim_end_matches('\n').trim_end_matches('\r');
            let start = *logical_start.get_or_insert(line_no);

            if let Some(continued) = body.strip_suffix('\\') {
                logical.push_str(continued);
                sanitized.push_str(line);
                continue;
            }

            logical.push_str(body);
            self.check_logical_line(&logical, start)?;
            logical.clear();
            logical_start = None;

            sanitized.push_str(line);
        }

        // Trailing continuation with nothing after it
        if let Some(start) = logical_start {
            self.check_logical_line(&logical, start)?;
        }

        Ok(sanitized)
    }

    /// Validate raw bytes, rejecting anything that is not UTF-8
    pub fn sanitize_bytes(&self, source: &[u8]) -> Result<String, SanitizeRejection> {
        let text = std::str::from_utf8(source).map_err(|_| SanitizeRejection::invalid_encoding())?;
        self.sanitize(text)
    }

    /// Run the check and package the decision for display
    pub fn explain(&self, source: &str) -> SanitizeExplanation {
        SanitizeExplanation::from_outcome(&self.sanitize(source).map(|_| ()))
    }

    /// Check a single logical line
    ///
    /// Returns the matched directive and the reason when the line is unsafe.
    pub fn check_line(&self, line: &str) -> Option<(String, RejectionKind)> {
        let directive = self.find_directive(line)?;

        if let Some(sep) = self.separators.iter().find(|s| line.contains(s.as_str())) {
            return Some((directive, RejectionKind::PathSeparator(sep.clone())));
        }
        if line.contains(&self.traversal_token) {
            return Some((directive, RejectionKind::ParentTraversal));
        }
        None
    }

    /// The directive tokens in effect
    pub fn directive_tokens(&self) -> &[String] {
        &self.directive_tokens
    }

    fn check_logical_line(&self, line: &str, line_no: usize) -> Result<(), SanitizeRejection> {
        match self.check_line(line) {
            Some((directive, kind)) => Err(SanitizeRejection {
                line: line_no,
                directive,
                kind,
            }),
            None => Ok(()),
        }
    }

    fn find_directive(&self, line: &str) -> Option<String> {
        if let Some(token) = self
            .directive_tokens
            .iter()
            .find(|t| line.contains(t.as_str()))
        {
            return Some(token.clone());
        }

        // `#  include` and `%:include` are the same directive to the preprocessor
        let trimmed = line.trim_start();
        let rest = trimmed
            .strip_prefix('#')
            .or_else(|| trimmed.strip_prefix("%:"))?
            .trim_start();
        SPACED_KEYWORDS
            .iter()
            .find(|kw| rest.starts_with(*kw))
            .map(|kw| format!("#{}", kw))
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(SanitizerConfig::default())
    }
}

/// Validate source text with the default patterns
pub fn sanitize(source: &str) -> Result<String, SanitizeRejection> {
    Sanitizer::default().sanitize(source)
}
