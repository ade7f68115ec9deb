//! Error types for cluster management.

use arraylink_types::NodeId;
use std::path::PathBuf;
use thiserror::Error;

/// Cluster management errors.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Topology file missing.
    #[error("Cluster topology not found at {0}")]
    NotInitialized(PathBuf),

    /// Node not found.
    #[error("{0} is not a cluster member")]
    NodeNotFound(NodeId),

    /// Same node listed twice.
    #[error("{0} is listed more than once")]
    DuplicateNode(NodeId),

    /// Invalid node count.
    #[error("Invalid node count: {0} (must be >= 1)")]
    InvalidNodeCount(usize),

    /// Invalid port range.
    #[error("Invalid port range: base={0}, nodes={1}")]
    InvalidPortRange(u16, usize),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

/// Result type for cluster operations.
pub type Result<T> = std::result::Result<T, Error>;
