//! Lane configuration
//!
//! Three layers, merged as JSON values and then deserialized into a typed
//! [`LaneConfig`]:
//! 1. Built-in defaults
//! 2. Host config (`--config`, or /etc/rv-build/lane.toml when present)
//! 3. CLI flags

mod defaults;
mod effective;
mod merge;

pub use defaults::{builtin_layer, discover_host_config, DEFAULT_HOST_CONFIG_PATH};
pub use effective::{CliOverrides, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use merge::{deep_merge, merge_layers};

use std::path::PathBuf;

use rvb_sanitizer::{SanitizeMode, Sanitizer, SanitizerConfig};
use serde::{Deserialize, Serialize};

use crate::artifacts::{ArtifactError, ArtifactsConfig};
use crate::isolation::{IsolationConfig, IsolationError};
use crate::timeout::{TimeoutConfig, TimeoutValidationError};
use crate::toolchain::{Method, ToolchainError, ToolchainProfile};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Deserialize(#[source] serde_json::Error),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("profiles.{method}: {source}")]
    Profile {
        method: Method,
        #[source]
        source: ToolchainError,
    },

    #[error("isolation: {0}")]
    Isolation(#[from] IsolationError),

    #[error("timeout: {0}")]
    Timeout(#[from] TimeoutValidationError),

    #[error("artifacts: {0}")]
    Artifacts(#[from] ArtifactError),
}

/// `[sanitizer]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SanitizerSection {
    /// Write the source back when clean, or leave it untouched
    pub mode: SanitizeMode,
    pub directive_tokens: Vec<String>,
    pub separators: Vec<String>,
    pub traversal_token: String,
}

impl Default for SanitizerSection {
    fn default() -> Self {
        let patterns = SanitizerConfig::default();
        Self {
            mode: SanitizeMode::default(),
            directive_tokens: patterns.directive_tokens,
            separators: patterns.separators,
            traversal_token: patterns.traversal_token,
        }
    }
}

impl SanitizerSection {
    pub fn patterns(&self) -> SanitizerConfig {
        SanitizerConfig {
            directive_tokens: self.directive_tokens.clone(),
            separators: self.separators.clone(),
            traversal_token: self.traversal_token.clone(),
        }
    }

    pub fn build(&self) -> Sanitizer {
        Sanitizer::new(self.patterns())
    }
}

/// `[profiles.bare_metal]` and `[profiles.linux]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfilesConfig {
    pub bare_metal: ToolchainProfile,
    pub linux: ToolchainProfile,
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            bare_metal: ToolchainProfile::bare_metal(),
            linux: ToolchainProfile::linux(),
        }
    }
}

/// `[report]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    /// Write summary.json next to the status artifact
    pub write_summary: bool,
}

/// Fully resolved lane configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LaneConfig {
    pub sanitizer: SanitizerSection,
    pub profiles: ProfilesConfig,
    pub isolation: IsolationConfig,
    pub timeout: TimeoutConfig,
    pub artifacts: ArtifactsConfig,
    pub report: ReportConfig,
}

impl LaneConfig {
    /// Built-in defaults overlaid with a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let layer = effective::parse_toml(contents, &PathBuf::from("<inline>"))?;
        let merged = merge_layers([builtin_layer()?, layer]);
        let config: LaneConfig =
            serde_json::from_value(merged).map_err(ConfigError::Deserialize)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for method in [Method::BareMetal, Method::Linux] {
            self.profile(method)
                .validate()
                .map_err(|source| ConfigError::Profile { method, source })?;
        }
        self.isolation.validate()?;
        self.timeout.validate()?;
        self.artifacts.validate()?;
        Ok(())
    }

    /// Profile for a method
    pub fn profile(&self, method: Method) -> &ToolchainProfile {
        match method {
            Method::BareMetal => &self.profiles.bare_metal,
            Method::Linux => &self.profiles.linux,
        }
    }
}
