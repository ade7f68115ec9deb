//! The wire contract with the array's management API.
//!
//! The session layer does not know how requests travel (HTTP, a message bus,
//! an in-memory fake). It hands an [`Envelope`] to a [`Transport`] and gets
//! back either a [`Reply`] the array produced or a [`TransportError`] when no
//! reply arrived at all.

use std::fmt;

use arraylink_types::{BusinessError, SessionToken};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A named request with its parameters and the session it runs under.
#[derive(Clone)]
pub struct Envelope {
    pub operation: &'static str,
    pub session: Option<SessionToken>,
    pub params: Value,
}

impl Envelope {
    pub fn new(operation: &'static str, params: Value) -> Self {
        Self {
            operation,
            session: None,
            params,
        }
    }

    #[must_use]
    pub fn with_session(mut self, token: SessionToken) -> Self {
        self.session = Some(token);
        self
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Params may carry credentials (login), so only the shape is shown.
        f.debug_struct("Envelope")
            .field("operation", &self.operation)
            .field("session", &self.session.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}

/// What the array answered.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Success(Value),
    Rejected(BusinessError),
}

impl Reply {
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::Rejected(e) if e.is_session_expired())
    }
}

/// The request never produced a reply.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("transport failure: {0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(cause: impl Into<String>) -> Self {
        Self(cause.into())
    }
}

/// Delivers envelopes to the array.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, envelope: Envelope) -> Result<Reply, TransportError>;
}
