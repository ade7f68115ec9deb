//! Error types for single-flight execution.

use arraylink_types::{NodeId, OperationKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures produced by the coordinator itself, as opposed to failures of the
/// operation it runs.
///
/// `Clone` and serializable so the same value can be handed to every waiter,
/// local or remote.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlightError {
    /// A waiter gave up before the executor finished.
    #[error("timed out after {waited_ms}ms waiting for in-flight {key}")]
    Timeout { key: OperationKey, waited_ms: u64 },

    /// The executor went away without delivering a result.
    #[error("executor of {0} went away before completing it")]
    Abandoned(OperationKey),

    /// The cluster channel refused or failed the claim.
    #[error("cluster coordination failed for {key}: {reason}")]
    Coordination { key: OperationKey, reason: String },

    /// A result published by another node could not be decoded.
    #[error("failed to decode result of {key}: {reason}")]
    Codec { key: OperationKey, reason: String },
}

impl FlightError {
    /// Returns true if this is a `Timeout` error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns the key the error refers to.
    pub fn key(&self) -> &OperationKey {
        match self {
            Self::Timeout { key, .. } | Self::Coordination { key, .. } | Self::Codec { key, .. } => {
                key
            }
            Self::Abandoned(key) => key,
        }
    }
}

/// Errors reported by a [`crate::ClusterChannel`] implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The node is not a member of the cluster the channel serves.
    #[error("{0} is not a cluster member")]
    UnknownNode(NodeId),

    /// A node tried to publish a result for a key it does not own.
    #[error("{node} does not hold the lease for {key}")]
    NotOwner { node: NodeId, key: OperationKey },

    /// The channel could not be reached.
    #[error("cluster channel unavailable: {0}")]
    Unavailable(String),
}

/// Result type for single-flight operations.
pub type Result<T> = std::result::Result<T, FlightError>;
