//! # arraylink
//!
//! Control-plane client for session-authenticated storage array management
//! APIs, built for clusters of management nodes that share one array.
//!
//! - **One login per expiry** - concurrent expiry detections, on one node or
//!   across the cluster, collapse into a single re-authentication
//! - **Transparent retry** - a call that hits an expired session is refreshed
//!   and retried exactly once
//! - **Idempotent helpers** - "already gone" and "already mapped" replies are
//!   treated as success where that is safe
//! - **Cached reverse lookups** - snapshot-to-client-group lookups are cached
//!   and verified before use
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          ArrayClient                         │
//! │  ┌──────────────────┐   ┌────────────────┐   ┌────────────┐  │
//! │  │ResilientExecutor │ → │ SessionManager │ → │SingleFlight│  │
//! │  │ (retry/classify) │   │ (token state)  │   │ (+cluster) │  │
//! │  └────────┬─────────┘   └────────────────┘   └────────────┘  │
//! │           ↓                                                  │
//! │      Transport                                               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use arraylink::{ArrayClient, ArraylinkConfig, Credentials};
//!
//! let config = ArraylinkConfig::load()?;
//! let client = ArrayClient::builder(transport, Credentials::new("admin", password))
//!     .config(config)
//!     .build()?;
//!
//! // Succeeds whether or not the snapshot still exists.
//! client.delete_snapshot("snap-42").await?;
//! ```

pub mod api;
mod client;
mod error;
mod result_cache;

pub use client::{ArrayClient, ClientBuilder, lease_table};
pub use error::{Error, Result};
pub use result_cache::ResultCache;

// Re-export the building blocks
pub use arraylink_cluster::{ClusterConfig, LeaseChannel, LeaseTable, NodeConfig};
pub use arraylink_config::{ArraylinkConfig, ConfigError, ConfigLoader};
pub use arraylink_flight::{
    ChannelError, ClusterChannel, DEFAULT_WAIT_TIMEOUT, FlightError, SingleFlight,
    StandaloneChannel,
};
pub use arraylink_session::{
    Ack, ClientError, Envelope, Outcome, QueryParams, QueryRequest, RefreshFlights, Reply, Request,
    ResilientExecutor, SessionManager, SessionState, Transport, TransportError,
};
pub use arraylink_types::{
    BusinessError, ClientId, Credentials, ErrorCode, NodeId, OperationKey, SessionToken,
};
