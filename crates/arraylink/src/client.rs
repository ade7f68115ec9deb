//! The array client: session-resilient calls plus idempotent helpers.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use arraylink_cluster::LeaseTable;
use arraylink_config::ArraylinkConfig;
use arraylink_flight::{ClusterChannel, StandaloneChannel};
use arraylink_session::{
    ClientError, Outcome, QueryParams, RefreshFlights, Request, ResilientExecutor, SessionManager,
    Transport,
};
use arraylink_types::{BusinessError, Credentials};
use tracing::{debug, info, instrument};

use crate::api::codes::{
    BLACKLIST_OPERATION_FAILED, LUN_ALREADY_MAPPED, LUN_ALREADY_UNMAPPED, SNAPSHOT_NOT_FOUND,
    VOLUME_NOT_FOUND,
};
use crate::api::{
    ChangeGroupSnapshots, ClientGroup, DeleteSnapshot, GetVolume, ListGroupSnapshots, LunAction,
    LunResource, QueryClientGroups, RemoveBlacklistPath, Volume,
};
use crate::{Error, ResultCache};

type CallResult<T> = arraylink_session::Result<T>;

/// Client for one storage array.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct ArrayClient {
    executor: ResilientExecutor,
    snapshot_groups: ResultCache<String, String>,
}

impl ArrayClient {
    pub fn builder(transport: Arc<dyn Transport>, credentials: Credentials) -> ClientBuilder {
        ClientBuilder {
            transport,
            credentials,
            config: None,
            channel: None,
            flights: None,
        }
    }

    pub fn executor(&self) -> &ResilientExecutor {
        &self.executor
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        self.executor.session()
    }

    /// Returns the volume, failing if it does not exist.
    pub async fn get_volume(&self, id: &str) -> CallResult<Volume> {
        let reply = self
            .executor
            .call_strict(&GetVolume { id: id.to_string() })
            .await?;
        Ok(reply.volume_detail)
    }

    /// Returns the volume, or `None` if the array does not know it.
    pub async fn get_volume_or_none(&self, id: &str) -> CallResult<Option<Volume>> {
        let outcome = self
            .executor
            .call_ignoring(&GetVolume { id: id.to_string() }, &[VOLUME_NOT_FOUND])
            .await?;
        Ok(outcome.success().map(|reply| reply.volume_detail))
    }

    /// Deletes a snapshot; deleting a missing snapshot succeeds.
    #[instrument(skip(self))]
    pub async fn delete_snapshot(&self, id: &str) -> CallResult<()> {
        let outcome = self
            .executor
            .call_ignoring(&DeleteSnapshot { id: id.to_string() }, &[SNAPSHOT_NOT_FOUND])
            .await?;
        if !outcome.is_success() {
            debug!("snapshot already gone");
        }
        self.snapshot_groups.invalidate(&id.to_string());
        Ok(())
    }

    /// Returns one page of client groups.
    pub async fn query_client_groups(&self, query: QueryParams) -> CallResult<Vec<ClientGroup>> {
        let page = self
            .executor
            .query_strict(&QueryClientGroups { query })
            .await?;
        Ok(page.clients)
    }

    /// Returns the ids of the snapshots mapped into `group_id`.
    pub async fn client_group_snapshots(&self, group_id: &str) -> CallResult<HashSet<String>> {
        let mapped = self
            .executor
            .query_strict(&ListGroupSnapshots::new(group_id))
            .await?;
        Ok(mapped.luns.into_iter().map(|lun| lun.id).collect())
    }

    /// Maps a snapshot into a client group through `gateway`.
    ///
    /// Succeeds if the snapshot is already mapped into this group; fails if
    /// it is mapped into a different one.
    #[instrument(skip(self))]
    pub async fn add_snapshot_to_client_group(
        &self,
        snapshot_id: &str,
        group_id: &str,
        gateway: &str,
    ) -> CallResult<()> {
        let request = ChangeGroupSnapshots {
            id: group_id.to_string(),
            action: LunAction::Add,
            luns: vec![LunResource::snapshot(snapshot_id)],
            gateways: vec![gateway.to_string()],
        };

        let outcome = self
            .executor
            .call_ignoring(&request, &[LUN_ALREADY_MAPPED])
            .await?;

        if let Outcome::Rejected(rejection) = outcome {
            if !self.client_group_snapshots(group_id).await?.contains(snapshot_id) {
                return Err(ClientError::remote(ChangeGroupSnapshots::OPERATION, rejection));
            }
            debug!("snapshot already mapped into this group");
        }

        self.snapshot_groups
            .put(snapshot_id.to_string(), group_id.to_string());
        Ok(())
    }

    /// Unmaps a snapshot from a client group; unmapping twice succeeds.
    #[instrument(skip(self))]
    pub async fn remove_snapshot_from_client_group(
        &self,
        snapshot_id: &str,
        group_id: &str,
    ) -> CallResult<()> {
        let request = ChangeGroupSnapshots {
            id: group_id.to_string(),
            action: LunAction::Remove,
            luns: vec![LunResource::snapshot(snapshot_id)],
            gateways: Vec::new(),
        };

        self.executor
            .call_ignoring(&request, &[LUN_ALREADY_UNMAPPED])
            .await?;
        self.snapshot_groups.invalidate(&snapshot_id.to_string());
        Ok(())
    }

    /// Removes `path` from the blacklist; a missing blacklist counts as done.
    #[instrument(skip(self))]
    pub async fn remove_path_from_blacklist(&self, path: &str) -> CallResult<()> {
        let missing_list = |e: &BusinessError| {
            e.is(BLACKLIST_OPERATION_FAILED) && e.message.contains("list not exist")
        };

        self.executor
            .call_tolerating(&RemoveBlacklistPath { path: path.to_string() }, missing_list)
            .await?;
        Ok(())
    }

    /// Returns the client groups `snapshot_id` is mapped into.
    ///
    /// A snapshot maps into at most one group. The cached owner is checked
    /// against the array before being returned; without a usable cache entry
    /// every group that holds snapshots is searched.
    #[instrument(skip(self))]
    pub async fn snapshot_client_groups(&self, snapshot_id: &str) -> CallResult<Vec<String>> {
        let owner = self
            .snapshot_groups
            .resolve(
                &snapshot_id.to_string(),
                |group| async move {
                    self.client_group_snapshots(&group)
                        .await
                        .map(|mapped| mapped.contains(snapshot_id))
                },
                || self.find_snapshot_group(snapshot_id),
            )
            .await?;

        Ok(owner.into_iter().collect())
    }

    async fn find_snapshot_group(&self, snapshot_id: &str) -> CallResult<Option<String>> {
        let mut query = QueryParams::new();
        loop {
            let groups = self.query_client_groups(query.clone()).await?;
            let last_page = groups.len() < query.limit as usize;

            for group in groups.into_iter().filter(|g| g.snap_num > 0) {
                if self.client_group_snapshots(&group.id).await?.contains(snapshot_id) {
                    return Ok(Some(group.id));
                }
            }

            if last_page {
                return Ok(None);
            }
            query = query.next_page();
        }
    }
}

/// Assembles an [`ArrayClient`].
pub struct ClientBuilder {
    transport: Arc<dyn Transport>,
    credentials: Credentials,
    config: Option<ArraylinkConfig>,
    channel: Option<Arc<dyn ClusterChannel>>,
    flights: Option<Arc<RefreshFlights>>,
}

impl ClientBuilder {
    #[must_use]
    pub fn config(mut self, config: ArraylinkConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Coordinates session refreshes with other nodes through `channel`.
    #[must_use]
    pub fn cluster(mut self, channel: Arc<dyn ClusterChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Shares refresh flights with other clients of the same array in this
    /// process. Cannot be combined with [`ClientBuilder::cluster`]; the
    /// flights already carry their channel.
    #[must_use]
    pub fn flights(mut self, flights: Arc<RefreshFlights>) -> Self {
        self.flights = Some(flights);
        self
    }

    pub fn build(self) -> crate::Result<ArrayClient> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let flights = match (self.flights, self.channel) {
            (Some(_), Some(_)) => return Err(Error::ConflictingCoordination),
            (Some(flights), None) => flights,
            (None, channel) => {
                let channel = match channel {
                    Some(channel) => {
                        if channel.node_id() != config.node_id() {
                            return Err(Error::NodeMismatch {
                                configured: config.node_id(),
                                channel: channel.node_id(),
                            });
                        }
                        channel
                    }
                    None => Arc::new(StandaloneChannel::new(config.node_id())),
                };
                Arc::new(RefreshFlights::new(channel, config.flight_wait_timeout()))
            }
        };

        let client = config.client_id();
        info!(%client, endpoint = %config.array.endpoint, node = %flights.node_id(), "array client ready");

        let session = SessionManager::new(client, self.credentials, self.transport, flights)
            .with_refresh_wait(config.refresh_wait());

        let capacity = NonZeroUsize::new(config.cache.snapshot_owner_capacity)
            .unwrap_or(NonZeroUsize::MIN);

        Ok(ArrayClient {
            executor: ResilientExecutor::new(Arc::new(session)),
            snapshot_groups: ResultCache::new(capacity),
        })
    }
}

/// Opens the lease table for the topology named in `config`, if any.
///
/// The configured lease TTL overrides the one stored in the topology file.
pub fn lease_table(config: &ArraylinkConfig) -> crate::Result<Option<Arc<LeaseTable>>> {
    let Some(path) = &config.cluster.topology_file else {
        return Ok(None);
    };

    let topology = arraylink_cluster::ClusterConfig::load(path)?.with_lease_ttl(config.lease_ttl());
    Ok(Some(LeaseTable::new(&topology)?))
}
