//! End-to-end session refresh behavior: one login per expiry episode, on one
//! node and across nodes sharing a lease table.

use std::sync::Arc;
use std::time::Duration;

use arraylink::{
    ArrayClient, ArraylinkConfig, ClientError, ClusterConfig, Credentials, FlightError,
    LeaseTable, NodeId, RefreshFlights, SessionState, Transport,
};
use arraylink_session::testing::FakeArray;
use arraylink_types::BusinessError;
use serde_json::json;

const ENDPOINT: &str = "10.0.0.5:443";

fn config(node: u64) -> ArraylinkConfig {
    let mut config = ArraylinkConfig::for_endpoint(ENDPOINT);
    config.cluster.node_id = node;
    config
}

fn credentials() -> Credentials {
    Credentials::new("admin", "secret")
}

fn standalone(array: &Arc<FakeArray>) -> ArrayClient {
    ArrayClient::builder(Arc::clone(array) as Arc<dyn Transport>, credentials())
        .config(config(0))
        .build()
        .unwrap()
}

fn cluster(nodes: usize) -> Arc<LeaseTable> {
    let topology = ClusterConfig::new(nodes, 7400)
        .unwrap()
        .with_lease_ttl(Duration::from_secs(60));
    LeaseTable::new(&topology).unwrap()
}

fn clustered(array: &Arc<FakeArray>, table: &Arc<LeaseTable>, node: u64) -> ArrayClient {
    let channel = table.channel(NodeId::new(node)).unwrap();
    ArrayClient::builder(Arc::clone(array) as Arc<dyn Transport>, credentials())
        .config(config(node))
        .cluster(Arc::new(channel))
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn concurrent_expiry_detections_cost_one_login() {
    let array = Arc::new(FakeArray::new().with_login_delay(Duration::from_millis(200)));
    array.respond("get-volume", json!({ "volume_detail": { "id": "v1", "volume_name": "data" } }));
    let client = Arc::new(standalone(&array));

    client.session().ensure_valid_session().await.unwrap();
    array.expire_sessions();

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.get_volume("v1").await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().name, "data");
    }
    assert_eq!(array.logins(), 2);
    assert!(matches!(client.session().state(), SessionState::Valid(t) if t.expose() == "token-2"));
}

#[tokio::test]
async fn expired_then_success_matches_a_fresh_call() {
    let array = Arc::new(FakeArray::new());
    array.respond("get-volume", json!({ "volume_detail": { "id": "v1", "volume_name": "data" } }));
    let client = standalone(&array);

    let fresh = client.get_volume("v1").await.unwrap();
    array.expire_sessions();
    let retried = client.get_volume("v1").await.unwrap();

    assert_eq!(fresh, retried);
}

#[tokio::test]
async fn double_expiry_refreshes_once_then_fails() {
    let array = Arc::new(FakeArray::new());
    let client = standalone(&array);
    client.session().ensure_valid_session().await.unwrap();

    array.reject_next("get-volume", BusinessError::session_expired());
    array.reject_next("get-volume", BusinessError::session_expired());

    let err = client.get_volume("v1").await.unwrap_err();

    assert!(err.is_session_expired());
    assert_eq!(array.logins(), 2);
    assert_eq!(array.calls_to("get-volume"), 2);
}

#[tokio::test(start_paused = true)]
async fn sibling_clients_refreshing_an_unset_session_share_one_login() {
    let array = Arc::new(FakeArray::new().with_login_delay(Duration::from_millis(100)));
    let flights = Arc::new(RefreshFlights::standalone(Duration::from_secs(30)));

    let build = || {
        ArrayClient::builder(Arc::clone(&array) as Arc<dyn Transport>, credentials())
            .config(config(0))
            .flights(Arc::clone(&flights))
            .build()
            .unwrap()
    };
    let a = build();
    let b = build();

    let (ta, tb) = tokio::join!(
        a.session().ensure_valid_session(),
        b.session().ensure_valid_session()
    );

    assert_eq!(ta.unwrap(), tb.unwrap());
    assert_eq!(array.logins(), 1);
}

#[tokio::test(start_paused = true)]
async fn nodes_sharing_a_lease_table_log_in_once() {
    let array = Arc::new(FakeArray::new().with_login_delay(Duration::from_millis(100)));
    let table = cluster(3);
    let nodes: Vec<_> = (0..3).map(|n| clustered(&array, &table, n)).collect();

    let (t0, t1, t2) = tokio::join!(
        nodes[0].session().ensure_valid_session(),
        nodes[1].session().ensure_valid_session(),
        nodes[2].session().ensure_valid_session(),
    );

    let token = t0.unwrap();
    assert_eq!(t1.unwrap(), token);
    assert_eq!(t2.unwrap(), token);
    assert_eq!(array.logins(), 1);
    assert_eq!(table.active_leases(), 0);
    for node in &nodes {
        assert_eq!(node.session().state(), SessionState::Valid(token.clone()));
    }
}

#[tokio::test(start_paused = true)]
async fn login_failure_reaches_other_nodes() {
    let array = Arc::new(FakeArray::new().with_login_delay(Duration::from_millis(100)));
    array.reject_logins(BusinessError::new(arraylink::ErrorCode::new(100_002), "locked"));
    let table = cluster(2);
    let a = clustered(&array, &table, 0);
    let b = clustered(&array, &table, 1);

    let (ra, rb) = tokio::join!(
        a.session().ensure_valid_session(),
        b.session().ensure_valid_session()
    );

    assert!(ra.unwrap_err().is_authentication());
    assert!(rb.unwrap_err().is_authentication());
    assert_eq!(array.logins(), 1);
    assert_eq!(b.session().state(), SessionState::Unset);
}

#[tokio::test(start_paused = true)]
async fn dropped_executor_node_releases_its_lease() {
    let array = Arc::new(FakeArray::new().with_login_delay(Duration::from_secs(3600)));
    let table = cluster(2);
    let a = Arc::new(clustered(&array, &table, 0));
    let b = Arc::new(clustered(&array, &table, 1));

    let executor = {
        let a = Arc::clone(&a);
        tokio::spawn(async move { a.session().ensure_valid_session().await })
    };
    tokio::task::yield_now().await;
    assert_eq!(table.holder(&a.session().key()), Some(NodeId::new(0)));

    let waiter = {
        let b = Arc::clone(&b);
        tokio::spawn(async move { b.session().ensure_valid_session().await })
    };
    tokio::task::yield_now().await;

    executor.abort();

    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(err, ClientError::Flight(FlightError::Abandoned(_))));
    assert_eq!(table.active_leases(), 0);
}

#[tokio::test(start_paused = true)]
async fn login_slower_than_the_lease_ttl_still_runs_once() {
    let array = Arc::new(FakeArray::new().with_login_delay(Duration::from_secs(2)));
    let topology = ClusterConfig::new(2, 7400)
        .unwrap()
        .with_lease_ttl(Duration::from_secs(1));
    let table = LeaseTable::new(&topology).unwrap();
    let a = clustered(&array, &table, 0);
    let b = clustered(&array, &table, 1);

    let (ta, tb) = tokio::join!(a.session().ensure_valid_session(), async {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        b.session().ensure_valid_session().await
    });

    assert_eq!(ta.unwrap(), tb.unwrap());
    assert_eq!(array.logins(), 1);
    assert_eq!(table.active_leases(), 0);
}

#[test]
fn channel_for_another_node_is_rejected() {
    let array = Arc::new(FakeArray::new());
    let table = cluster(2);
    let channel = table.channel(NodeId::new(1)).unwrap();

    let result = ArrayClient::builder(array as Arc<dyn Transport>, credentials())
        .config(config(0))
        .cluster(Arc::new(channel))
        .build();

    assert!(matches!(result, Err(arraylink::Error::NodeMismatch { .. })));
}

#[test]
fn shared_flights_and_a_cluster_channel_are_exclusive() {
    let array = Arc::new(FakeArray::new());
    let table = cluster(2);

    let result = ArrayClient::builder(array as Arc<dyn Transport>, credentials())
        .config(config(0))
        .flights(Arc::new(RefreshFlights::standalone(Duration::from_secs(30))))
        .cluster(Arc::new(table.channel(NodeId::new(0)).unwrap()))
        .build();

    assert!(matches!(result, Err(arraylink::Error::ConflictingCoordination)));
}

#[test]
fn lease_table_follows_the_configured_topology() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("cluster.toml");
    ClusterConfig::new(3, 7400).unwrap().save(&path).unwrap();

    let mut standalone = config(0);
    assert!(arraylink::lease_table(&standalone).unwrap().is_none());

    standalone.cluster.topology_file = Some(path);
    standalone.cluster.lease_ttl_secs = 5;
    let table = arraylink::lease_table(&standalone).unwrap().unwrap();

    assert_eq!(table.ttl(), Duration::from_secs(5));
    assert!(table.channel(NodeId::new(2)).is_ok());
    assert!(table.channel(NodeId::new(3)).is_err());
}
