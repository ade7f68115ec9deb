//! Where configuration files live.

use crate::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Per-user defaults, `~/.config/arraylink/config.toml` on Linux.
pub(crate) fn user_config_file() -> Result<PathBuf, ConfigError> {
    ProjectDirs::from("io", "Arraylink", "arraylink")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .ok_or_else(|| ConfigError::XdgError("no home directory to hold user config".to_string()))
}

/// Shared project file, `arraylink.toml`.
pub(crate) fn project_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
    project_dir.as_ref().join("arraylink.toml")
}

/// Machine-local overrides, `arraylink.local.toml`, kept out of version
/// control.
pub(crate) fn local_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
    project_dir.as_ref().join("arraylink.local.toml")
}
