//! Lease-based claim coordination.
//!
//! A [`LeaseTable`] is the shared store every member node claims keys in.
//! The first node to claim an idle key gets a lease and becomes its executor;
//! every later claimant subscribes to the lease and receives whatever the
//! owner publishes. Publishing releases the lease.
//!
//! Owners renew their lease every third of the TTL while the operation runs,
//! so a lease left unrenewed for a whole TTL is presumed dead (its owner
//! crashed or lost connectivity) and is handed to the next claimant.
//! Subscribers of the dead lease observe an abandoned flight.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use arraylink_flight::{ChannelError, Claim, ClusterChannel, Published, Subscription};
use arraylink_types::{NodeId, OperationKey};
use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{ClusterConfig, Error, Result};

struct Lease {
    owner: NodeId,
    granted_at: Instant,
    tx: watch::Sender<Option<Published>>,
}

/// In-memory lease store shared by the members of one cluster.
pub struct LeaseTable {
    members: HashSet<NodeId>,
    ttl: Duration,
    leases: Mutex<HashMap<OperationKey, Lease>>,
}

impl LeaseTable {
    /// Creates a lease table for the members of `config`.
    pub fn new(config: &ClusterConfig) -> Result<Arc<Self>> {
        config.validate()?;

        Ok(Arc::new(Self {
            members: config.nodes.iter().map(|node| node.id).collect(),
            ttl: config.lease_ttl(),
            leases: Mutex::new(HashMap::new()),
        }))
    }

    /// Returns the channel member `node` uses to claim keys.
    pub fn channel(self: &Arc<Self>, node: NodeId) -> Result<LeaseChannel> {
        if !self.members.contains(&node) {
            return Err(Error::NodeNotFound(node));
        }

        Ok(LeaseChannel {
            table: Arc::clone(self),
            node,
        })
    }

    /// Returns the node currently holding `key`, if any.
    pub fn holder(&self, key: &OperationKey) -> Option<NodeId> {
        self.lock().get(key).map(|lease| lease.owner)
    }

    /// Returns the number of keys currently leased.
    pub fn active_leases(&self) -> usize {
        self.lock().len()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<OperationKey, Lease>> {
        self.leases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn claim(&self, node: NodeId, key: &OperationKey) -> std::result::Result<Claim, ChannelError> {
        if !self.members.contains(&node) {
            return Err(ChannelError::UnknownNode(node));
        }

        let mut leases = self.lock();

        if let Some(lease) = leases.get(key) {
            if lease.granted_at.elapsed() < self.ttl {
                debug!(%key, %node, owner = %lease.owner, "joining leased flight");
                return Ok(Claim::Waiter(Subscription::from_watch(lease.tx.subscribe())));
            }
            warn!(%key, %node, stale_owner = %lease.owner, "lease expired; taking over");
            // Dropping the old sender fails its subscribers as abandoned.
            leases.remove(key);
        }

        let (tx, _rx) = watch::channel(None);
        leases.insert(
            key.clone(),
            Lease {
                owner: node,
                granted_at: Instant::now(),
                tx,
            },
        );
        info!(%key, %node, "lease granted");

        Ok(Claim::Executor)
    }

    fn renew(&self, node: NodeId, key: &OperationKey) -> std::result::Result<(), ChannelError> {
        match self.lock().get_mut(key) {
            Some(lease) if lease.owner == node => {
                lease.granted_at = Instant::now();
                Ok(())
            }
            _ => Err(ChannelError::NotOwner {
                node,
                key: key.clone(),
            }),
        }
    }

    fn publish(
        &self,
        node: NodeId,
        key: &OperationKey,
        outcome: Published,
    ) -> std::result::Result<(), ChannelError> {
        let mut leases = self.lock();

        match leases.get(key) {
            Some(lease) if lease.owner == node => {
                if let Some(lease) = leases.remove(key) {
                    let subscribers = lease.tx.receiver_count();
                    lease.tx.send_replace(Some(outcome));
                    debug!(%key, %node, subscribers, "lease released");
                }
                Ok(())
            }
            _ => Err(ChannelError::NotOwner {
                node,
                key: key.clone(),
            }),
        }
    }
}

/// A member's view of the [`LeaseTable`].
#[derive(Clone)]
pub struct LeaseChannel {
    table: Arc<LeaseTable>,
    node: NodeId,
}

#[async_trait]
impl ClusterChannel for LeaseChannel {
    fn node_id(&self) -> NodeId {
        self.node
    }

    async fn claim_or_join(&self, key: &OperationKey) -> std::result::Result<Claim, ChannelError> {
        self.table.claim(self.node, key)
    }

    async fn publish_result(
        &self,
        key: &OperationKey,
        outcome: Published,
    ) -> std::result::Result<(), ChannelError> {
        self.table.publish(self.node, key, outcome)
    }

    fn renew_interval(&self) -> Option<Duration> {
        Some(self.table.ttl / 3)
    }

    async fn renew(&self, key: &OperationKey) -> std::result::Result<(), ChannelError> {
        self.table.renew(self.node, key)
    }
}
