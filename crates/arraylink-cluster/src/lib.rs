//! Multi-node coordination for arraylink.
//!
//! Lets several management nodes share one storage array without stepping on
//! each other's sessions:
//! - Cluster topology stored as TOML
//! - Lease-based claims so one node executes a keyed operation at a time
//! - Lease TTL takeover when the owning node disappears

pub mod config;
pub mod error;
pub mod lease;

pub use config::{ClusterConfig, DEFAULT_LEASE_TTL, NodeConfig};
pub use error::{Error, Result};
pub use lease::{LeaseChannel, LeaseTable};

use std::path::Path;
use std::sync::Arc;

/// Writes a local topology of `node_count` nodes to `path`.
pub fn init_cluster(path: &Path, node_count: usize, base_port: u16) -> Result<ClusterConfig> {
    let config = ClusterConfig::new(node_count, base_port)?;
    config.save(path)?;
    Ok(config)
}

/// Loads the topology at `path` and opens a lease table for its members.
pub fn open_cluster(path: &Path) -> Result<Arc<LeaseTable>> {
    let config = ClusterConfig::load(path)?;
    LeaseTable::new(&config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arraylink_types::NodeId;
    use tempfile::TempDir;

    #[test]
    fn init_then_open() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("topology.toml");

        init_cluster(&path, 3, 7400).unwrap();
        let table = open_cluster(&path).unwrap();

        assert_eq!(table.ttl(), DEFAULT_LEASE_TTL);
        assert!(table.channel(NodeId::new(2)).is_ok());
        assert!(table.channel(NodeId::new(3)).is_err());
    }
}
