//! Isolation modes for the toolchain invocation
//!
//! The same compiler command runs in one of three ways:
//! - `direct`: a local child process against local paths
//! - `container`: a disposable `run --rm` instance of the profile's image,
//!   with the project base mounted at a fixed mount point and a fixed
//!   non-root uid:gid
//! - `exec`: `exec` into the profile's long-lived, already running instance,
//!   which already has the project base at a shared mount
//!
//! Container modes translate local paths to mount-relative paths. Elevated
//! access to the container runtime is an explicit capability, never implied.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::artifacts::SubmissionPaths;
use crate::invocation::Invocation;
use crate::toolchain::ToolchainProfile;

/// How the toolchain is sandboxed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationKind {
    Direct,
    Container,
    Exec,
}

impl IsolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationKind::Direct => "direct",
            IsolationKind::Container => "container",
            IsolationKind::Exec => "exec",
        }
    }

    /// Whether the invocation goes through a container runtime
    pub fn uses_runtime(&self) -> bool {
        !matches!(self, IsolationKind::Direct)
    }
}

impl std::fmt::Display for IsolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IsolationKind {
    type Err = IsolationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(IsolationKind::Direct),
            "container" => Ok(IsolationKind::Container),
            "exec" => Ok(IsolationKind::Exec),
            other => Err(IsolationError::UnknownMode(other.to_string())),
        }
    }
}

/// Local privilege used to reach the container runtime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
    #[default]
    None,
    /// Prefix the runtime command with the configured elevation command
    Sudo,
}

/// Capabilities an invocation needs from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    /// Runs the container runtime client with elevated local privilege
    ElevatedRuntimeAccess,
}

/// Isolation errors
#[derive(Debug, thiserror::Error)]
pub enum IsolationError {
    #[error("unknown isolation mode '{0}' (expected direct, container or exec)")]
    UnknownMode(String),

    #[error("container runtime binary is empty")]
    EmptyRuntime,

    #[error("{name} must be an absolute path, got '{value}'")]
    RelativeMount { name: &'static str, value: String },

    #[error("user must be numeric uid:gid, got '{0}'")]
    InvalidUser(String),

    #[error("user must not be root (uid 0)")]
    RootUser,

    #[error("privilege 'sudo' needs a non-empty elevation_command")]
    EmptyElevationCommand,

    #[error("privilege 'sudo' only applies to container isolation modes")]
    PrivilegeWithoutRuntime,
}

/// Isolation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IsolationConfig {
    pub mode: IsolationKind,

    /// Container runtime client, e.g. "docker" or "podman"
    pub runtime: String,

    /// Where the project base is mounted in disposable containers
    pub mount_point: String,

    /// Where long-lived instances already have the project base mounted
    pub shared_mount: String,

    /// Numeric uid:gid the toolchain runs as inside a container
    pub user: String,

    /// Disposable containers get no network
    pub network_disabled: bool,

    pub privilege: Privilege,

    /// Command prepended when `privilege` is `sudo`
    pub elevation_command: Vec<String>,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            mode: IsolationKind::Direct,
            runtime: "docker".to_string(),
            mount_point: "/mnt".to_string(),
            shared_mount: "/mnt".to_string(),
            user: "1000:1000".to_string(),
            network_disabled: true,
            privilege: Privilege::None,
            elevation_command: vec!["sudo".to_string(), "-n".to_string()],
        }
    }
}

impl IsolationConfig {
    pub fn validate(&self) -> Result<(), IsolationError> {
        if self.runtime.trim().is_empty() {
            return Err(IsolationError::EmptyRuntime);
        }
        for (name, value) in [
            ("mount_point", &self.mount_point),
            ("shared_mount", &self.shared_mount),
        ] {
            if !Path::new(value).is_absolute() {
                return Err(IsolationError::RelativeMount {
                    name,
                    value: value.clone(),
                });
            }
        }

        let (uid, gid) = self
            .user
            .split_once(':')
            .ok_or_else(|| IsolationError::InvalidUser(self.user.clone()))?;
        let uid: u32 = uid
            .parse()
            .map_err(|_| IsolationError::InvalidUser(self.user.clone()))?;
        gid.parse::<u32>()
            .map_err(|_| IsolationError::InvalidUser(self.user.clone()))?;
        if uid == 0 {
            return Err(IsolationError::RootUser);
        }

        if self.privilege == Privilege::Sudo {
            if self.elevation_command.is_empty() || self.elevation_command[0].trim().is_empty() {
                return Err(IsolationError::EmptyElevationCommand);
            }
            if !self.mode.uses_runtime() {
                return Err(IsolationError::PrivilegeWithoutRuntime);
            }
        }
        Ok(())
    }

    /// Capabilities the configured mode requires
    pub fn required_capabilities(&self) -> Vec<Capability> {
        if self.mode.uses_runtime() && self.privilege == Privilege::Sudo {
            vec![Capability::ElevatedRuntimeAccess]
        } else {
            Vec::new()
        }
    }

    /// Project directory as the compiler sees it
    pub fn toolchain_dir(&self, paths: &SubmissionPaths) -> PathBuf {
        match self.mode {
            IsolationKind::Direct => paths.local_dir(),
            IsolationKind::Container => paths.dir_under(Path::new(&self.mount_point)),
            IsolationKind::Exec => paths.dir_under(Path::new(&self.shared_mount)),
        }
    }

    /// Wrap a compiler command for the configured mode
    pub fn wrap(
        &self,
        profile: &ToolchainProfile,
        compiler_args: Vec<String>,
        paths: &SubmissionPaths,
    ) -> Invocation {
        let workdir = self.toolchain_dir(paths);

        let (program, args, working_dir) = match self.mode {
            IsolationKind::Direct => (profile.compiler.clone(), compiler_args, Some(workdir)),
            IsolationKind::Container => {
                let mut args = vec![
                    "run".to_string(),
                    "--rm".to_string(),
                    "--user".to_string(),
                    self.user.clone(),
                ];
                if self.network_disabled {
                    args.push("--network".to_string());
                    args.push("none".to_string());
                }
                args.push("--volume".to_string());
                args.push(format!("{}:{}", paths.base().display(), self.mount_point));
                args.push("--workdir".to_string());
                args.push(workdir.display().to_string());
                args.push(profile.image.clone());
                args.push(profile.compiler.clone());
                args.extend(compiler_args);
                (self.runtime.clone(), args, None)
            }
            IsolationKind::Exec => {
                let mut args = vec![
                    "exec".to_string(),
                    "--user".to_string(),
                    self.user.clone(),
                    "--workdir".to_string(),
                    workdir.display().to_string(),
                    profile.instance.clone(),
                    profile.compiler.clone(),
                ];
                args.extend(compiler_args);
                (self.runtime.clone(), args, None)
            }
        };

        let capabilities = self.required_capabilities();
        let elevation = self
            .elevation_command
            .split_first()
            .filter(|_| capabilities.contains(&Capability::ElevatedRuntimeAccess));
        let (program, args) = match elevation {
            Some((elevated_program, elevated_args)) => {
                warn!(
                    runtime = %self.runtime,
                    elevation = %self.elevation_command.join(" "),
                    "container runtime invoked with elevated privilege"
                );
                let mut elevated = elevated_args.to_vec();
                elevated.push(program);
                elevated.extend(args);
                (elevated_program.clone(), elevated)
            }
            None => (program, args),
        };

        Invocation {
            program,
            args,
            isolation: self.mode,
            capabilities,
            working_dir,
        }
    }
}
