//! Timeout enforcement for toolchain invocations
//!
//! An untrusted submission can make a compiler run for a very long time
//! (pathological templates, huge constexpr evaluation), so every invocation
//! has a wall-clock ceiling. When it is exceeded the executor terminates the
//! process group: SIGTERM first, SIGKILL after the grace period.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Upper bound for `overall_seconds`
pub const MAX_OVERALL_SECONDS: u64 = 3600;

/// Upper bound for `grace_seconds`
pub const MAX_GRACE_SECONDS: u64 = 60;

/// Timeout configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Maximum wall-clock time per invocation (default: 30)
    pub overall_seconds: u64,

    /// Time between SIGTERM and SIGKILL (default: 2)
    pub grace_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            overall_seconds: 30,
            grace_seconds: 2,
        }
    }
}

impl TimeoutConfig {
    pub fn validate(&self) -> Result<(), TimeoutValidationError> {
        if self.overall_seconds == 0 || self.overall_seconds > MAX_OVERALL_SECONDS {
            return Err(TimeoutValidationError::OverallOutOfBounds {
                value: self.overall_seconds,
            });
        }
        if self.grace_seconds > MAX_GRACE_SECONDS {
            return Err(TimeoutValidationError::GraceOutOfBounds {
                value: self.grace_seconds,
            });
        }
        Ok(())
    }

    pub fn overall(&self) -> Duration {
        Duration::from_secs(self.overall_seconds)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_seconds)
    }
}

/// Timeout validation errors
#[derive(Debug, thiserror::Error)]
pub enum TimeoutValidationError {
    #[error("overall_seconds must be in (0, 3600], got {value}")]
    OverallOutOfBounds { value: u64 },

    #[error("grace_seconds must be at most 60, got {value}")]
    GraceOutOfBounds { value: u64 },
}

/// Tracks the deadline of a single invocation
#[derive(Debug)]
pub struct TimeoutEnforcer {
    limit: Duration,
    start_time: Instant,
}

impl TimeoutEnforcer {
    pub fn new(limit: Duration) -> Self {
        Self {
            limit,
            start_time: Instant::now(),
        }
    }

    /// Whether the deadline has passed
    pub fn expired(&self) -> bool {
        self.start_time.elapsed() > self.limit
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Time left before the deadline
    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.elapsed())
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }
}
