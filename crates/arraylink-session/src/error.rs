//! Error types for remote calls.

use arraylink_flight::FlightError;
use arraylink_types::{BusinessError, ErrorCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced to callers of the array.
///
/// Serializable and `Clone` because a failed session refresh is delivered to
/// every waiter of the refresh flight, including waiters on other nodes.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientError {
    /// The array refused the account. Never retried.
    #[error("login as {username} failed: code {code}, message: {message}")]
    Authentication {
        username: String,
        code: ErrorCode,
        message: String,
    },

    /// The array rejected an operation.
    #[error("{operation} failed: code {code}, message: {message}")]
    Remote {
        operation: String,
        code: ErrorCode,
        message: String,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Flight(#[from] FlightError),

    #[error("failed to encode {operation} request: {reason}")]
    Encode { operation: String, reason: String },

    #[error("failed to decode {operation} response: {reason}")]
    Decode { operation: String, reason: String },
}

impl ClientError {
    /// Builds a `Remote` error from an array rejection.
    pub fn remote(operation: &str, error: BusinessError) -> Self {
        Self::Remote {
            operation: operation.to_string(),
            code: error.code,
            message: error.message,
        }
    }

    /// Returns the array's error code, if the array produced one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Authentication { code, .. } | Self::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if the array reported the session expired.
    pub fn is_session_expired(&self) -> bool {
        self.code().is_some_and(ErrorCode::is_session_expired)
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Result type for remote calls.
pub type Result<T> = std::result::Result<T, ClientError>;
