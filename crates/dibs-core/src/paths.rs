//! Shared-path resolution for the assignments store.
//!
//! Every process that coordinates on a repository must compute the same
//! assignments path for the same repository id, otherwise the mutex next to
//! it guards nothing. The config root is therefore resolved once, explicitly,
//! and threaded through as a value rather than read ambiently at call sites.

use std::path::{Path, PathBuf};

/// Environment variable overriding the config root (XDG-style).
pub const CONFIG_DIR_ENV: &str = "DIBS_CONFIG_DIR";

/// Errors from config-root resolution and repository-id validation.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("no config directory available on this platform; set {CONFIG_DIR_ENV}")]
    NoConfigRoot,
    #[error("invalid repository id {0:?}: must be non-empty and contain no path separators")]
    InvalidRepositoryId(String),
}

/// Resolved filesystem layout for the shared coordination area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordPaths {
    config_root: PathBuf,
}

impl CoordPaths {
    /// Build from an explicit config root. Used by tests and embedders.
    #[must_use]
    pub fn new(config_root: impl Into<PathBuf>) -> Self {
        Self {
            config_root: config_root.into(),
        }
    }

    /// Resolve the config root: `DIBS_CONFIG_DIR` wins, otherwise the
    /// per-OS user config directory plus the `dibs` app subdirectory.
    pub fn from_env() -> Result<Self, PathError> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::new(PathBuf::from(dir)));
        }
        dirs::config_dir()
            .map(|base| Self::new(base.join("dibs")))
            .ok_or(PathError::NoConfigRoot)
    }

    /// The resolved config root directory.
    #[must_use]
    pub fn config_root(&self) -> &Path {
        &self.config_root
    }

    /// Path of the coordination config file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config_root.join("config.toml")
    }

    /// Deterministic assignments-file path for a repository:
    /// `<configRoot>/shared/<repositoryId>/assignments.json`.
    pub fn assignments_path(&self, repository_id: &str) -> Result<PathBuf, PathError> {
        validate_repository_id(repository_id)?;
        Ok(self
            .config_root
            .join("shared")
            .join(repository_id)
            .join("assignments.json"))
    }
}

/// Mutex marker path for an assignments file: sibling with `.lock` appended.
#[must_use]
pub fn lock_path_for(assignments_path: &Path) -> PathBuf {
    let mut name = assignments_path
        .file_name()
        .map_or_else(|| "assignments.json".into(), ToOwned::to_owned);
    name.push(".lock");
    assignments_path.with_file_name(name)
}

fn validate_repository_id(id: &str) -> Result<(), PathError> {
    // A separator-bearing id would escape the shared directory.
    if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
        return Err(PathError::InvalidRepositoryId(id.to_string()));
    }
    Ok(())
}
