//! Machine-readable build summary (summary.json)
//!
//! Written next to the status artifact when `report.write_summary` is on. It
//! records how the run ended, never what the compiler said and never any
//! host or container path.

use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::failure::{FailureKind, Status, EXIT_CODE_SUCCESS};
use crate::artifacts::write_atomic;
use crate::isolation::IsolationKind;
use crate::toolchain::Method;

/// Schema version for summary.json
pub const SUMMARY_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for summary.json
pub const SUMMARY_SCHEMA_ID: &str = "rv-build/summary@1";

/// Build summary (summary.json)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSummary {
    pub schema_version: u32,

    pub schema_id: String,

    /// Unique per pipeline run
    pub run_id: String,

    pub created_at: DateTime<Utc>,

    pub status: Status,

    /// Failure kind (when status is not success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,

    /// Exit code the pipeline returns
    pub exit_code: i32,

    /// Exit code of the toolchain process, when it exited on its own
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toolchain_exit_code: Option<i32>,

    /// Signal that killed the toolchain process (e.g. "SIG9")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toolchain_term_signal: Option<String>,

    pub method: Method,

    pub isolation: IsolationKind,

    /// SHA-256 of the source as compiled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_sha256: Option<String>,

    pub human_summary: String,

    pub duration_ms: u64,
}

impl BuildSummary {
    /// Summary for a clean build
    pub fn success(method: Method, isolation: IsolationKind, duration_ms: u64) -> Self {
        Self {
            schema_version: SUMMARY_SCHEMA_VERSION,
            schema_id: SUMMARY_SCHEMA_ID.to_string(),
            run_id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            status: Status::Success,
            failure_kind: None,
            exit_code: EXIT_CODE_SUCCESS,
            toolchain_exit_code: Some(EXIT_CODE_SUCCESS),
            toolchain_term_signal: None,
            method,
            isolation,
            source_sha256: None,
            human_summary: "Build succeeded".to_string(),
            duration_ms,
        }
    }

    /// Summary for any unsuccessful run
    pub fn failure(
        failure_kind: FailureKind,
        exit_code: i32,
        method: Method,
        isolation: IsolationKind,
        duration_ms: u64,
    ) -> Self {
        Self {
            schema_version: SUMMARY_SCHEMA_VERSION,
            schema_id: SUMMARY_SCHEMA_ID.to_string(),
            run_id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            status: failure_kind.status(),
            failure_kind: Some(failure_kind),
            exit_code,
            toolchain_exit_code: None,
            toolchain_term_signal: None,
            method,
            isolation,
            source_sha256: None,
            human_summary: failure_kind.description().to_string(),
            duration_ms,
        }
    }

    pub fn with_toolchain_exit_code(mut self, code: i32) -> Self {
        self.toolchain_exit_code = Some(code);
        self
    }

    pub fn with_toolchain_term_signal(mut self, signal: i32) -> Self {
        self.toolchain_term_signal = Some(format!("SIG{}", signal));
        self
    }

    /// Record the digest of the compiled source
    pub fn with_source(mut self, source: &[u8]) -> Self {
        self.source_sha256 = Some(hex::encode(Sha256::digest(source)));
        self
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Write to file (write-then-rename)
    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {}", e)))?;
        write_atomic(path, json.as_bytes())
    }
}
