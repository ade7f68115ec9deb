//! The single-flight coordinator.

use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use arraylink_types::{NodeId, OperationKey};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, instrument, warn};

use crate::channel::{Claim, ClusterChannel, Published, StandaloneChannel, Subscription};
use crate::codec;
use crate::registry::{FlightGuard, FlightRegistry, Role};
use crate::FlightError;

/// Default bound a waiter blocks for before giving up.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Collapses concurrent executions of the same [`OperationKey`] into one,
/// within this process and, through a [`ClusterChannel`], across the cluster.
///
/// Locally, the first caller for a key runs the operation on its own task and
/// every concurrent caller waits for that result. Only the caller that opens
/// the local flight talks to the cluster channel: if another node already
/// holds the key, a relay task waits for that node's published result and
/// completes the local flight with it, while every local caller, the opener
/// included, waits under its own bound.
///
/// Results must be serializable because they may have been produced on
/// another node; errors must absorb [`FlightError`] because waiting itself
/// can fail.
pub struct SingleFlight<V, E>
where
    V: Clone,
    E: Clone + From<FlightError>,
{
    registry: Arc<FlightRegistry<V, E>>,
    channel: Arc<dyn ClusterChannel>,
    wait_timeout: Duration,
}

impl<V, E> SingleFlight<V, E>
where
    V: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
    E: Clone + Send + Sync + Serialize + DeserializeOwned + From<FlightError> + 'static,
{
    /// Creates a coordinator that deduplicates across the cluster `channel`
    /// serves.
    pub fn new(channel: Arc<dyn ClusterChannel>, wait_timeout: Duration) -> Self {
        Self {
            registry: Arc::new(FlightRegistry::new()),
            channel,
            wait_timeout,
        }
    }

    /// Creates a coordinator for a node with no peers.
    pub fn standalone(wait_timeout: Duration) -> Self {
        Self::new(Arc::new(StandaloneChannel::default()), wait_timeout)
    }

    pub fn node_id(&self) -> NodeId {
        self.channel.node_id()
    }

    /// Bound used by [`SingleFlight::execute`].
    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    /// Runs `op` unless the same key is already in flight, in which case the
    /// in-flight result is returned instead.
    pub async fn execute<F, Fut>(&self, key: &OperationKey, op: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        self.execute_settled(key, self.wait_timeout, op, |_| {}).await
    }

    /// Like [`SingleFlight::execute`] with a caller-specific wait bound.
    pub async fn execute_with_timeout<F, Fut>(
        &self,
        key: &OperationKey,
        wait: Duration,
        op: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        self.execute_settled(key, wait, op, |_| {}).await
    }

    /// Like [`SingleFlight::execute_with_timeout`], and additionally runs
    /// `settle` exactly once per flight executed on this node, after `op`
    /// finishes and before any local waiter is released.
    ///
    /// `settle` is where state derived from the outcome gets written, so the
    /// write happens under the flight's serialization. It does not run for a
    /// result relayed from another node; every local caller receives that one
    /// as a waiter.
    #[instrument(skip_all, fields(key = %key, node = %self.channel.node_id()))]
    pub async fn execute_settled<F, Fut, S>(
        &self,
        key: &OperationKey,
        wait: Duration,
        op: F,
        settle: S,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        S: FnOnce(&Result<V, E>),
    {
        let guard = match self.registry.claim(key) {
            Role::Waiter(waiter) => {
                debug!("joined in-flight operation");
                return waiter.wait(wait).await;
            }
            Role::Executor(guard) => guard,
        };

        let result = match self.channel.claim_or_join(key).await {
            Ok(Claim::Executor) => {
                debug!("executing");
                self.run_leased(key, op).await
            }
            Ok(Claim::Waiter(subscription)) => {
                // The remote wait belongs to the flight, not to this caller:
                // a relay task finishes the flight, and this caller waits on
                // it under its own bound like any other local waiter.
                debug!("in flight on another node; relaying its result");
                let own = guard.subscribe();
                tokio::spawn(relay(key.clone(), subscription, guard));
                return own.wait(wait).await;
            }
            Err(e) => Err(FlightError::Coordination {
                key: key.clone(),
                reason: e.to_string(),
            }
            .into()),
        };

        settle(&result);
        guard.complete(result.clone());
        result
    }

    /// Returns true while `key` is in flight on this node.
    pub fn is_in_flight(&self, key: &OperationKey) -> bool {
        self.registry.contains(key)
    }

    pub fn in_flight_count(&self) -> usize {
        self.registry.len()
    }

    /// Runs `op` under this node's cluster claim on `key`, renewing the
    /// claim while `op` is pending, then publishes the outcome.
    async fn run_leased<F, Fut>(&self, key: &OperationKey, op: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let lease = HeldClaim::new(Arc::clone(&self.channel), key.clone());

        let result = match self.channel.renew_interval().filter(|every| !every.is_zero()) {
            None => op().await,
            Some(every) => {
                let mut op = pin!(op());
                let mut renewals = tokio::time::interval_at(Instant::now() + every, every);
                renewals.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        result = &mut op => break result,
                        _ = renewals.tick() => {
                            if let Err(e) = self.channel.renew(key).await {
                                warn!(error = %e, "failed to renew cluster claim");
                            }
                        }
                    }
                }
            }
        };

        let published = match codec::encode_outcome(key, &result) {
            Ok(bytes) => Published::Completed(bytes),
            Err(e) => {
                warn!(error = %e, "result not encodable; remote waiters will see abandonment");
                Published::Abandoned
            }
        };
        lease.release(published).await;
        result
    }
}

/// Finishes a local flight with the outcome another node publishes.
async fn relay<V, E>(key: OperationKey, subscription: Subscription, guard: FlightGuard<V, E>)
where
    V: Clone + DeserializeOwned,
    E: Clone + DeserializeOwned + From<FlightError>,
{
    let result = match subscription.recv().await {
        Some(Published::Completed(bytes)) => codec::decode_outcome(&key, &bytes),
        None | Some(Published::Abandoned) => Err(FlightError::Abandoned(key).into()),
    };
    guard.complete(result);
}

/// A cluster claim this node must release.
///
/// Releasing publishes the outcome. If the executing task is dropped first,
/// an abandonment is published from a detached task so remote waiters and
/// later claimants are not left on a dead lease.
struct HeldClaim {
    channel: Option<Arc<dyn ClusterChannel>>,
    key: OperationKey,
}

impl HeldClaim {
    fn new(channel: Arc<dyn ClusterChannel>, key: OperationKey) -> Self {
        Self {
            channel: Some(channel),
            key,
        }
    }

    async fn release(mut self, outcome: Published) {
        if let Some(channel) = self.channel.take() {
            if let Err(e) = channel.publish_result(&self.key, outcome).await {
                warn!(key = %self.key, error = %e, "failed to publish result to the cluster");
            }
        }
    }
}

impl Drop for HeldClaim {
    fn drop(&mut self) {
        let Some(channel) = self.channel.take() else {
            return;
        };
        let key = self.key.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = channel.publish_result(&key, Published::Abandoned).await {
                        warn!(key = %key, error = %e, "failed to release abandoned claim");
                    }
                });
            }
            Err(_) => warn!(key = %key, "no runtime to release abandoned claim"),
        }
    }
}
