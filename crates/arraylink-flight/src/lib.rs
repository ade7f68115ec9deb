//! Single-flight execution for `arraylink`.
//!
//! Collapses concurrent executions of a named operation into one:
//! - [`SingleFlight`] deduplicates callers inside this process
//! - [`ClusterChannel`] extends the guarantee across management nodes
//! - Every caller of one flight receives the identical result or failure
//! - Completed flights are cleared immediately; a later call runs again
//!
//! ```ignore
//! use arraylink_flight::{SingleFlight, DEFAULT_WAIT_TIMEOUT};
//! use arraylink_types::OperationKey;
//!
//! let flights: SingleFlight<String, FlightError> = SingleFlight::standalone(DEFAULT_WAIT_TIMEOUT);
//! let key = OperationKey::new("refresh-session", client_id.as_str());
//! let token = flights.execute(&key, || login()).await?;
//! ```

mod channel;
mod codec;
mod coordinator;
mod error;
mod registry;

pub use channel::{Claim, ClusterChannel, Published, StandaloneChannel, Subscription};
pub use coordinator::{DEFAULT_WAIT_TIMEOUT, SingleFlight};
pub use error::{ChannelError, FlightError, Result};
