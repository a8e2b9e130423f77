//! Submission artifacts and their on-disk layout
//!
//! A submission lives at `<project_base>/<project_dir>/` and owns the source,
//! status, binary, symbol manifest and optional summary files. The directory
//! itself belongs to whoever provisioned it: the pipeline reads and
//! overwrites files inside it, and never creates or removes it.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Artifact errors
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("project directory must be a relative path without '..': {0}")]
    InvalidProjectDir(String),

    #[error("artifact file name must be a plain file name: {0}")]
    InvalidFileName(String),

    #[error("project directory does not exist: {0}")]
    MissingProjectDir(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// File names inside the project directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactsConfig {
    /// Submitted source text
    pub source: String,

    /// Status text, overwritten on every run
    pub status: String,

    /// Compiled binary
    pub binary: String,

    /// Symbol-retention manifest (retain strip policy only)
    pub symbol_manifest: String,

    /// Machine-readable summary (when enabled)
    pub summary: String,

    /// Delete a binary left by an earlier run before building, so the binary
    /// exists only when the latest run succeeded
    pub remove_stale_binary: bool,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            source: "code.cpp".to_string(),
            status: "status.txt".to_string(),
            binary: "binary".to_string(),
            symbol_manifest: "symbols.txt".to_string(),
            summary: "summary.json".to_string(),
            remove_stale_binary: true,
        }
    }
}

impl ArtifactsConfig {
    pub fn validate(&self) -> Result<(), ArtifactError> {
        for name in [
            &self.source,
            &self.status,
            &self.binary,
            &self.symbol_manifest,
            &self.summary,
        ] {
            if !is_plain_file_name(name) {
                return Err(ArtifactError::InvalidFileName(name.clone()));
            }
        }
        Ok(())
    }
}

/// Resolved paths for one submission
#[derive(Debug, Clone)]
pub struct SubmissionPaths {
    base: PathBuf,
    relative: PathBuf,
    names: ArtifactsConfig,
}

impl SubmissionPaths {
    /// Resolve a submission
    ///
    /// `project_dir` is taken relative to `project_base` and may not escape
    /// it. An empty `project_dir` means the base itself. A relative
    /// `project_base` is resolved against the current directory, since the
    /// compiler runs elsewhere and container mounts need a host path.
    pub fn new(
        project_base: impl Into<PathBuf>,
        project_dir: impl AsRef<Path>,
        names: ArtifactsConfig,
    ) -> Result<Self, ArtifactError> {
        names.validate()?;

        let project_dir = project_dir.as_ref();
        let mut relative = PathBuf::new();
        for component in project_dir.components() {
            match component {
                Component::Normal(part) => relative.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(ArtifactError::InvalidProjectDir(
                        project_dir.display().to_string(),
                    ))
                }
            }
        }

        Ok(Self {
            base: absolute_base(project_base.into())?,
            relative,
            names,
        })
    }

    /// Project base on the local filesystem
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Project directory relative to the base
    pub fn relative(&self) -> &Path {
        &self.relative
    }

    pub fn names(&self) -> &ArtifactsConfig {
        &self.names
    }

    /// Project directory on the local filesystem
    pub fn local_dir(&self) -> PathBuf {
        self.base.join(&self.relative)
    }

    /// Project directory as seen under another root (e.g. a container mount)
    pub fn dir_under(&self, root: &Path) -> PathBuf {
        root.join(&self.relative)
    }

    pub fn source(&self) -> PathBuf {
        self.local_dir().join(&self.names.source)
    }

    pub fn status(&self) -> PathBuf {
        self.local_dir().join(&self.names.status)
    }

    pub fn binary(&self) -> PathBuf {
        self.local_dir().join(&self.names.binary)
    }

    pub fn symbol_manifest(&self) -> PathBuf {
        self.local_dir().join(&self.names.symbol_manifest)
    }

    pub fn summary(&self) -> PathBuf {
        self.local_dir().join(&self.names.summary)
    }

    /// Fail unless the project directory was provisioned
    pub fn ensure_exists(&self) -> Result<(), ArtifactError> {
        if self.local_dir().is_dir() {
            Ok(())
        } else {
            Err(ArtifactError::MissingProjectDir(
                self.relative.display().to_string(),
            ))
        }
    }
}

/// Replace a file's contents via write-then-rename
///
/// Readers see either the old contents or the new, never a partial write.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let temp_path = path.with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));

    fs::write(&temp_path, contents)?;
    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    Ok(())
}

/// Remove a file if present; returns whether something was removed
pub fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn absolute_base(base: PathBuf) -> Result<PathBuf, ArtifactError> {
    let joined = if base.is_absolute() {
        base
    } else {
        std::env::current_dir()?.join(base)
    };
    Ok(joined
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect())
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(components.next(), Some(Component::Normal(_))) && components.next().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_layout() {
        let paths = SubmissionPaths::new("/srv/projects", "abc/123", ArtifactsConfig::default()).unwrap();
        assert_eq!(paths.local_dir(), PathBuf::from("/srv/projects/abc/123"));
        assert_eq!(paths.source(), PathBuf::from("/srv/projects/abc/123/code.cpp"));
        assert_eq!(paths.status(), PathBuf::from("/srv/projects/abc/123/status.txt"));
        assert_eq!(paths.binary(), PathBuf::from("/srv/projects/abc/123/binary"));
        assert_eq!(paths.dir_under(Path::new("/mnt")), PathBuf::from("/mnt/abc/123"));
    }

    #[test]
    fn test_relative_base_made_absolute() {
        let cwd = std::env::current_dir().unwrap();
        let paths = SubmissionPaths::new("./projects", "p1", ArtifactsConfig::default()).unwrap();
        assert!(paths.base().is_absolute());
        assert_eq!(paths.base(), cwd.join("projects"));
        assert_eq!(paths.source(), cwd.join("projects/p1/code.cpp"));
    }

    #[test]
    fn test_project_dir_may_not_escape() {
        for bad in ["../other", "/etc", "a/../../b"] {
            assert!(
                matches!(
                    SubmissionPaths::new("/srv", bad, ArtifactsConfig::default()),
                    Err(ArtifactError::InvalidProjectDir(_))
                ),
                "{} should be refused",
                bad
            );
        }
    }

    #[test]
    fn test_curdir_components_dropped() {
        let paths = SubmissionPaths::new("/srv", "./a/./b", ArtifactsConfig::default()).unwrap();
        assert_eq!(paths.relative(), Path::new("a/b"));
        let paths = SubmissionPaths::new("/srv", "", ArtifactsConfig::default()).unwrap();
        assert_eq!(paths.local_dir(), PathBuf::from("/srv"));
    }

    #[test]
    fn test_file_names_must_be_plain() {
        let names = ArtifactsConfig {
            binary: "../binary".to_string(),
            ..ArtifactsConfig::default()
        };
        assert!(matches!(names.validate(), Err(ArtifactError::InvalidFileName(_))));

        let names = ArtifactsConfig {
            status: "out/status.txt".to_string(),
            ..ArtifactsConfig::default()
        };
        assert!(names.validate().is_err());
        assert!(ArtifactsConfig::default().validate().is_ok());
    }

    #[test]
    fn test_write_atomic_replaces_and_cleans_temp() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("status.txt");
        fs::write(&path, "old contents that are longer").unwrap();

        write_atomic(&path, b"new").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        assert!(!temp.path().join(".status.txt.tmp").exists());
    }

    #[test]
    fn test_remove_if_exists() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("binary");
        assert!(!remove_if_exists(&path).unwrap());
        fs::write(&path, b"\x7fELF").unwrap();
        assert!(remove_if_exists(&path).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_ensure_exists() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("p1")).unwrap();
        let ok = SubmissionPaths::new(temp.path(), "p1", ArtifactsConfig::default()).unwrap();
        assert!(ok.ensure_exists().is_ok());
        let missing = SubmissionPaths::new(temp.path(), "p2", ArtifactsConfig::default()).unwrap();
        assert!(matches!(missing.ensure_exists(), Err(ArtifactError::MissingProjectDir(_))));
    }
}
