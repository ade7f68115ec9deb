//! Cluster coordination channel.
//!
//! The coordinator asks the channel who executes a key cluster-wide:
//! [`ClusterChannel::claim_or_join`] grants the executor role to exactly one
//! node per in-flight key and subscribes every other node to the result the
//! executor later hands to [`ClusterChannel::publish_result`].
//!
//! How the claim is stored (a designated leader per key, a lease in a shared
//! store, ...) is up to the implementation.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use arraylink_types::{NodeId, OperationKey};
use async_trait::async_trait;
use tokio::sync::watch;

use crate::ChannelError;

/// What an executor hands back to the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Published {
    /// Encoded `Result<V, E>` of the operation.
    Completed(Vec<u8>),
    /// The executor went away without a result.
    Abandoned,
}

/// Role granted to a node by [`ClusterChannel::claim_or_join`].
pub enum Claim {
    /// This node runs the operation and must publish the result.
    Executor,
    /// Another node runs it; the result arrives through the subscription.
    Waiter(Subscription),
}

impl fmt::Debug for Claim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Executor => f.write_str("Executor"),
            Self::Waiter(_) => f.write_str("Waiter(..)"),
        }
    }
}

/// Pending delivery of another node's result.
pub struct Subscription {
    inner: Pin<Box<dyn Future<Output = Option<Published>> + Send>>,
}

impl Subscription {
    /// Wraps any future that resolves to the published outcome, or `None` if
    /// the channel lost track of the flight.
    pub fn new(fut: impl Future<Output = Option<Published>> + Send + 'static) -> Self {
        Self { inner: Box::pin(fut) }
    }

    /// Subscription fed by a `watch` slot that the owner fills exactly once.
    pub fn from_watch(mut rx: watch::Receiver<Option<Published>>) -> Self {
        Self::new(async move {
            rx.wait_for(Option::is_some)
                .await
                .ok()
                .and_then(|slot| slot.clone())
        })
    }

    /// Waits for the executor's outcome.
    pub async fn recv(self) -> Option<Published> {
        self.inner.await
    }
}

/// Cluster-wide ownership handshake for in-flight keys.
#[async_trait]
pub trait ClusterChannel: Send + Sync {
    /// The node this channel speaks for.
    fn node_id(&self) -> NodeId;

    /// Claims `key` for this node, or subscribes to the node that holds it.
    async fn claim_or_join(&self, key: &OperationKey) -> Result<Claim, ChannelError>;

    /// Releases `key` and delivers `outcome` to every subscribed node.
    async fn publish_result(&self, key: &OperationKey, outcome: Published)
    -> Result<(), ChannelError>;

    /// How often a live executor must call [`ClusterChannel::renew`], or
    /// `None` if claims never expire.
    fn renew_interval(&self) -> Option<Duration> {
        None
    }

    /// Extends this node's claim on `key` while its operation is running.
    async fn renew(&self, _key: &OperationKey) -> Result<(), ChannelError> {
        Ok(())
    }
}

/// Channel for a node that runs alone: every claim makes it the executor.
#[derive(Debug, Clone, Copy)]
pub struct StandaloneChannel {
    node: NodeId,
}

impl StandaloneChannel {
    pub fn new(node: NodeId) -> Self {
        Self { node }
    }
}

impl Default for StandaloneChannel {
    fn default() -> Self {
        Self::new(NodeId::new(0))
    }
}

#[async_trait]
impl ClusterChannel for StandaloneChannel {
    fn node_id(&self) -> NodeId {
        self.node
    }

    async fn claim_or_join(&self, _key: &OperationKey) -> Result<Claim, ChannelError> {
        Ok(Claim::Executor)
    }

    async fn publish_result(
        &self,
        _key: &OperationKey,
        _outcome: Published,
    ) -> Result<(), ChannelError> {
        Ok(())
    }
}
