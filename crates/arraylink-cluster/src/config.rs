//! Cluster topology configuration.

use crate::{Error, Result};
use arraylink_types::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default lifetime of a claim before another node may take it over.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(60);

/// Membership of the management cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// How long a node may hold a claim before it is considered dead.
    pub lease_ttl_ms: u64,

    /// Member nodes.
    pub nodes: Vec<NodeConfig>,
}

/// Configuration for a single management node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node ID.
    pub id: NodeId,

    /// Address other nodes reach it on.
    pub address: String,
}

impl ClusterConfig {
    /// Creates a local topology of `node_count` nodes on consecutive ports.
    pub fn new(node_count: usize, base_port: u16) -> Result<Self> {
        if node_count == 0 {
            return Err(Error::InvalidNodeCount(node_count));
        }
        if usize::from(u16::MAX - base_port) < node_count - 1 {
            return Err(Error::InvalidPortRange(base_port, node_count));
        }

        let nodes = (0..node_count)
            .map(|id| NodeConfig {
                id: NodeId::new(id as u64),
                address: format!("127.0.0.1:{}", base_port + id as u16),
            })
            .collect();

        Ok(Self {
            lease_ttl_ms: DEFAULT_LEASE_TTL.as_millis() as u64,
            nodes,
        })
    }

    /// Loads a topology from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotInitialized(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;

        Ok(config)
    }

    /// Saves the topology as TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;

        Ok(())
    }

    /// Checks that the topology is usable.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::InvalidNodeCount(0));
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id) {
                return Err(Error::DuplicateNode(node.id));
            }
        }

        if self.lease_ttl_ms == 0 {
            return Err(Error::Config("lease_ttl_ms must be > 0".to_string()));
        }

        Ok(())
    }

    /// Returns the configuration for a specific node.
    pub fn node(&self, id: NodeId) -> Option<&NodeConfig> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Returns true if `id` is a member.
    pub fn is_member(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_millis(self.lease_ttl_ms)
    }

    #[must_use]
    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl_ms = ttl.as_millis() as u64;
        self
    }
}
