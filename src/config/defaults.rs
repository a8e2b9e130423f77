//! Built-in defaults (lowest-precedence layer)

use std::path::{Path, PathBuf};

use serde_json::Value;

use super::{ConfigError, LaneConfig};

/// Host configuration read when no `--config` is given, if it exists
pub const DEFAULT_HOST_CONFIG_PATH: &str = "/etc/rv-build/lane.toml";

/// Host config file to load
///
/// An explicit path is always used (and must exist). Without one, the default
/// path is used only if the file is there.
pub fn discover_host_config(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        let default = Path::new(DEFAULT_HOST_CONFIG_PATH);
        default.is_file().then(|| default.to_path_buf())
    })
}

/// The built-in configuration as a mergeable layer
pub fn builtin_layer() -> Result<Value, ConfigError> {
    serde_json::to_value(LaneConfig::default()).map_err(ConfigError::Serialize)
}
