//! Configuration management for arraylink
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (ARRAYLINK_* prefix, highest precedence)
//! 2. arraylink.local.toml (gitignored, local overrides)
//! 3. arraylink.toml (git-tracked, project config)
//! 4. ~/.config/arraylink/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)
//!
//! Credentials are deliberately absent; callers supply them at runtime.

use anyhow::Result;
use arraylink_types::{ClientId, NodeId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;

/// Main arraylink configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArraylinkConfig {
    pub array: ArrayConfig,
    pub session: SessionConfig,
    pub flight: FlightConfig,
    pub cache: CacheConfig,
    pub cluster: ClusterConfig,
}

/// The storage array this client manages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArrayConfig {
    /// Management endpoint, e.g. `10.0.0.5:443`.
    pub endpoint: String,
    /// Overrides the id derived from the endpoint.
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub refresh_wait_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_wait_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightConfig {
    pub wait_timeout_secs: u64,
}

impl Default for FlightConfig {
    fn default() -> Self {
        Self {
            wait_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub snapshot_owner_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            snapshot_owner_capacity: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub node_id: u64,
    pub lease_ttl_secs: u64,
    /// Cluster topology; absent means this node runs standalone.
    pub topology_file: Option<PathBuf>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_id: 0,
            lease_ttl_secs: 60,
            topology_file: None,
        }
    }
}

impl ArraylinkConfig {
    /// Load and validate configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().validated().load()
    }

    /// Load and validate configuration for a specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new()
            .with_project_dir(project_dir)
            .validated()
            .load()
    }

    /// Load a single TOML file, skipping every other source
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Configuration for one array at `endpoint`, defaults elsewhere
    pub fn for_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            array: ArrayConfig {
                endpoint: endpoint.into(),
                client_id: None,
            },
            ..Default::default()
        }
    }

    /// Reject values the client cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.array.endpoint.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "array.endpoint must be set".to_string(),
            ));
        }
        if self.session.refresh_wait_secs == 0 {
            return Err(ConfigError::ValidationError(
                "session.refresh_wait_secs must be > 0".to_string(),
            ));
        }
        if self.flight.wait_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "flight.wait_timeout_secs must be > 0".to_string(),
            ));
        }
        if self.cache.snapshot_owner_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "cache.snapshot_owner_capacity must be > 0".to_string(),
            ));
        }
        if self.cluster.lease_ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "cluster.lease_ttl_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Id every node managing this array keys its session refreshes on
    pub fn client_id(&self) -> ClientId {
        match &self.array.client_id {
            Some(id) => ClientId::new(id.clone()),
            None => ClientId::for_endpoint(&self.array.endpoint),
        }
    }

    pub fn node_id(&self) -> NodeId {
        NodeId::new(self.cluster.node_id)
    }

    pub fn refresh_wait(&self) -> Duration {
        Duration::from_secs(self.session.refresh_wait_secs)
    }

    pub fn flight_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.flight.wait_timeout_secs)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.cluster.lease_ttl_secs)
    }

    /// Resolve relative paths to absolute
    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        let base = base_dir.as_ref();

        if let Some(topology) = &self.cluster.topology_file {
            if topology.is_relative() {
                self.cluster.topology_file = Some(base.join(topology));
            }
        }
    }
}
