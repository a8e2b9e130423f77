//! Effective configuration with provenance
//!
//! Records which layers contributed to the resolved [`LaneConfig`], with a
//! digest of each config file so a run can be traced back to the exact
//! host configuration it used.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::defaults::builtin_layer;
use super::merge::merge_layers;
use super::{ConfigError, LaneConfig};
use crate::isolation::IsolationKind;
use crate::toolchain::StripPolicy;

/// Origin of a configuration layer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    Host,
    Cli,
}

/// A contributing layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (host layer only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the raw file bytes (host layer only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Flags from the command line that override configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    pub isolation: Option<IsolationKind>,
    pub timeout_seconds: Option<u64>,
    /// Applies to both profiles
    pub strip: Option<StripPolicy>,
    pub pass_through: bool,
}

impl CliOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// The overrides as a mergeable layer
    pub fn to_value(&self) -> Value {
        let mut layer = Map::new();
        if let Some(mode) = self.isolation {
            layer.insert("isolation".to_string(), json!({ "mode": mode }));
        }
        if let Some(seconds) = self.timeout_seconds {
            layer.insert("timeout".to_string(), json!({ "overall_seconds": seconds }));
        }
        if let Some(strip) = self.strip {
            layer.insert(
                "profiles".to_string(),
                json!({
                    "bare_metal": { "strip": strip },
                    "linux": { "strip": strip },
                }),
            );
        }
        if self.pass_through {
            layer.insert("sanitizer".to_string(), json!({ "mode": "pass_through" }));
        }
        Value::Object(layer)
    }
}

/// Resolved configuration plus the layers it came from
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub config: LaneConfig,

    /// Contributing layers in precedence order
    pub sources: Vec<ConfigSource>,
}

impl EffectiveConfig {
    /// Merge built-in defaults, the host file (if any) and CLI overrides
    pub fn build(
        host_config_path: Option<&Path>,
        cli_overrides: &CliOverrides,
    ) -> Result<Self, ConfigError> {
        let mut layers = vec![builtin_layer()?];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        if let Some(path) = host_config_path {
            let (value, digest) = load_toml_file(path)?;
            debug!(path = %path.display(), digest = %digest, "loaded host config");
            layers.push(value);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Host,
                path: Some(path.display().to_string()),
                digest: Some(digest),
            });
        }

        if !cli_overrides.is_empty() {
            layers.push(cli_overrides.to_value());
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let config: LaneConfig =
            serde_json::from_value(merge_layers(layers)).map_err(ConfigError::Deserialize)?;
        config.validate()?;

        Ok(Self { config, sources })
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Read a TOML file, returning it as a layer plus the digest of its bytes
fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
    let bytes = fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let digest = hex::encode(Sha256::digest(&bytes));

    let contents = String::from_utf8(bytes).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: format!("invalid UTF-8: {}", e),
    })?;
    Ok((parse_toml(&contents, path)?, digest))
}

pub(super) fn parse_toml(contents: &str, path: &Path) -> Result<Value, ConfigError> {
    let parse_error = |message: String| ConfigError::Parse {
        path: PathBuf::from(path),
        message,
    };
    let table: toml::Table = toml::from_str(contents).map_err(|e| parse_error(e.to_string()))?;
    serde_json::to_value(table).map_err(|e| parse_error(e.to_string()))
}
