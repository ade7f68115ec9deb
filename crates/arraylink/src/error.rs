//! Errors raised while assembling a client.
//!
//! Calls against the array fail with [`ClientError`]; this type only covers
//! what can go wrong before the first call.

use arraylink_config::ConfigError;
use arraylink_session::ClientError;
use arraylink_types::NodeId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cluster topology error: {0}")]
    Cluster(#[from] arraylink_cluster::Error),

    /// The cluster channel was opened for a different node than configured.
    #[error("cluster channel speaks for {channel}, but this node is configured as {configured}")]
    NodeMismatch { configured: NodeId, channel: NodeId },

    /// Both shared refresh flights and a cluster channel were supplied.
    #[error("shared refresh flights already carry their own cluster channel; set only one")]
    ConflictingCoordination,
}

/// Result type for client assembly.
pub type Result<T> = std::result::Result<T, Error>;
