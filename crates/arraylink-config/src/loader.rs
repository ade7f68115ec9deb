//! Layered loading of [`ArraylinkConfig`].
//!
//! Sources merge lowest precedence first: built-in defaults, the user file,
//! the project file, the local override file, then `ARRAYLINK_*` variables
//! with `__` between section and key.

use crate::{ArraylinkConfig, paths};
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Builder for one configuration load.
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    user_file: Option<PathBuf>,
    validate: bool,
}

impl ConfigLoader {
    /// Loader rooted at the current directory, reading the user file if the
    /// platform has a config directory.
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "ARRAYLINK".to_string(),
            user_file: paths::user_config_file().ok(),
            validate: false,
        }
    }

    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "ARRAYLINK")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Skips the per-user file, so only the project directory and the
    /// environment apply.
    pub fn without_user_file(mut self) -> Self {
        self.user_file = None;
        self
    }

    /// Rejects a merged configuration a client could not run with.
    pub fn validated(mut self) -> Self {
        self.validate = true;
        self
    }

    /// Config files that exist, lowest precedence first.
    pub fn files(&self) -> Vec<PathBuf> {
        self.user_file
            .iter()
            .cloned()
            .chain([
                paths::project_config_file(&self.project_dir),
                paths::local_config_file(&self.project_dir),
            ])
            .filter(|file| file.exists())
            .collect()
    }

    pub fn load(self) -> Result<ArraylinkConfig> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&ArraylinkConfig::default())?);

        for file in self.files() {
            builder = builder.add_source(config::File::from(file).format(config::FileFormat::Toml));
        }

        // ARRAYLINK_SESSION__REFRESH_WAIT_SECS=10
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: ArraylinkConfig = builder
            .build()
            .and_then(config::Config::try_deserialize)
            .with_context(|| format!("Failed to load configuration for {}", self.project_dir.display()))?;

        config.resolve_paths(&self.project_dir);

        if self.validate {
            config.validate().context("Configuration is not usable")?;
        }

        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
