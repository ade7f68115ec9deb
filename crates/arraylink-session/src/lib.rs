//! Session lifecycle and resilient calls against a storage array.
//!
//! - [`Transport`]: how envelopes reach the array (pluggable)
//! - [`SessionManager`]: owns the token, refreshes it through single-flight
//! - [`ResilientExecutor`]: retries once on session expiry and classifies
//!   business errors into "return" and "raise"
//!
//! Enable the `testing` feature for [`testing::FakeArray`], a scripted
//! in-memory array.

mod auth;
mod error;
mod executor;
mod request;
mod session;
mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use auth::{Login, LoginReply, Probe};
pub use error::{ClientError, Result};
pub use executor::ResilientExecutor;
pub use request::{Ack, Outcome, QueryParams, QueryRequest, Request};
pub use session::{
    DEFAULT_REFRESH_WAIT, REFRESH_OPERATION, RefreshFlights, SessionManager, SessionState,
};
pub use transport::{Envelope, Reply, Transport, TransportError};
