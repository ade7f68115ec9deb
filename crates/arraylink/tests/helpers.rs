//! Idempotent helpers and the cached snapshot-to-client-group lookup.

use std::sync::{Arc, Mutex};

use arraylink::api::codes::{
    BLACKLIST_OPERATION_FAILED, LUN_ALREADY_MAPPED, LUN_ALREADY_UNMAPPED, SNAPSHOT_NOT_FOUND,
    VOLUME_NOT_FOUND,
};
use arraylink::{ArrayClient, ArraylinkConfig, BusinessError, Credentials, Reply, Transport};
use arraylink_session::testing::FakeArray;
use serde_json::{Value, json};
use test_case::test_case;

const QUERY_GROUPS: &str = "query-iscsi-client-groups";
const GROUP_SNAPSHOTS: &str = "get-iscsi-client-group-snapshots";
const CHANGE_GROUP: &str = "change-snapshot-in-iscsi-client-group";

fn client(array: &Arc<FakeArray>) -> ArrayClient {
    ArrayClient::builder(
        Arc::clone(array) as Arc<dyn Transport>,
        Credentials::new("admin", "secret"),
    )
    .config(ArraylinkConfig::for_endpoint("10.0.0.5:443"))
    .build()
    .unwrap()
}

/// Routes group-snapshot listings to whichever group `owner` names.
fn serve_snapshot_owner(array: &FakeArray, owner: Arc<Mutex<String>>) {
    array.respond(
        QUERY_GROUPS,
        json!({ "clients": [
            { "id": "g1", "name": "empty", "snap_num": 0 },
            { "id": "g2", "name": "backup", "snap_num": 3 },
            { "id": "g3", "name": "restore", "snap_num": 1 },
        ] }),
    );
    array.route(GROUP_SNAPSHOTS, move |params: &Value| {
        let luns = if params["id"] == *owner.lock().unwrap() {
            json!([{ "id": "snap-1" }])
        } else {
            json!([{ "id": "snap-other" }])
        };
        Reply::Success(json!({ "luns": luns }))
    });
}

#[tokio::test]
async fn missing_volume_is_none() {
    let array = Arc::new(FakeArray::new());
    array.reject_next("get-volume", BusinessError::new(VOLUME_NOT_FOUND, "volume not found"));
    array.respond("get-volume", json!({ "volume_detail": { "id": "v1", "volume_name": "data" } }));
    let client = client(&array);

    assert_eq!(client.get_volume_or_none("v1").await.unwrap(), None);
    assert_eq!(
        client.get_volume_or_none("v1").await.unwrap().map(|v| v.name),
        Some("data".to_string())
    );
}

#[tokio::test]
async fn strict_get_volume_raises_not_found() {
    let array = Arc::new(FakeArray::new());
    array.reject_next("get-volume", BusinessError::new(VOLUME_NOT_FOUND, "volume not found"));

    let err = client(&array).get_volume("v1").await.unwrap_err();

    assert_eq!(err.code(), Some(VOLUME_NOT_FOUND));
}

#[tokio::test]
async fn deleting_a_missing_snapshot_succeeds() {
    let array = Arc::new(FakeArray::new());
    array.reject_next(
        "delete-volume-snapshot",
        BusinessError::new(SNAPSHOT_NOT_FOUND, "snapshot not found"),
    );

    assert!(client(&array).delete_snapshot("snap-1").await.is_ok());
}

#[tokio::test]
async fn unmapping_twice_succeeds() {
    let array = Arc::new(FakeArray::new());
    array.reject_next(CHANGE_GROUP, BusinessError::new(LUN_ALREADY_UNMAPPED, "already unmapped"));
    let client = client(&array);

    client.remove_snapshot_from_client_group("snap-1", "g3").await.unwrap();
    client.remove_snapshot_from_client_group("snap-1", "g3").await.unwrap();

    let calls = array.calls();
    let sent = &calls.iter().rfind(|c| c.operation == CHANGE_GROUP).unwrap().params;
    assert_eq!(sent["action"], "remove");
    assert_eq!(sent["luns"][0], json!({ "id": "snap-1", "type": "snapshot", "readonly": true }));
    assert!(sent.get("gateways").is_none());
}

#[test_case("g3", true; "already mapped into the same group")]
#[test_case("g2", false; "mapped into a different group")]
#[tokio::test]
async fn mapping_an_already_mapped_snapshot(group: &str, succeeds: bool) {
    let array = Arc::new(FakeArray::new());
    serve_snapshot_owner(&array, Arc::new(Mutex::new("g3".to_string())));
    array.reject_next(CHANGE_GROUP, BusinessError::new(LUN_ALREADY_MAPPED, "lun already mapped"));

    let result = client(&array)
        .add_snapshot_to_client_group("snap-1", group, "gw-1")
        .await;

    if succeeds {
        result.unwrap();
    } else {
        assert_eq!(result.unwrap_err().code(), Some(LUN_ALREADY_MAPPED));
    }
}

#[test_case("Black list not exist", true; "missing list is tolerated")]
#[test_case("path is busy", false; "other blacklist failures are raised")]
#[tokio::test]
async fn blacklist_removal(message: &str, succeeds: bool) {
    let array = Arc::new(FakeArray::new());
    array.reject_next(
        "remove-volume-path-from-blacklist",
        BusinessError::new(BLACKLIST_OPERATION_FAILED, message),
    );

    let result = client(&array).remove_path_from_blacklist("/dev/vol-1").await;

    assert_eq!(result.is_ok(), succeeds);
}

#[tokio::test]
async fn snapshot_owner_lookup_is_cached_and_verified() {
    let array = Arc::new(FakeArray::new());
    let owner = Arc::new(Mutex::new("g3".to_string()));
    serve_snapshot_owner(&array, Arc::clone(&owner));
    let client = client(&array);

    // Miss: scans the groups that hold snapshots, skipping g1.
    assert_eq!(client.snapshot_client_groups("snap-1").await.unwrap(), vec!["g3"]);
    assert_eq!(array.calls_to(QUERY_GROUPS), 1);
    assert_eq!(array.calls_to(GROUP_SNAPSHOTS), 2);

    // Hit: one verification, no scan.
    assert_eq!(client.snapshot_client_groups("snap-1").await.unwrap(), vec!["g3"]);
    assert_eq!(array.calls_to(QUERY_GROUPS), 1);
    assert_eq!(array.calls_to(GROUP_SNAPSHOTS), 3);

    // Stale hit: the snapshot moved, so the entry is replaced after a scan.
    *owner.lock().unwrap() = "g2".to_string();
    assert_eq!(client.snapshot_client_groups("snap-1").await.unwrap(), vec!["g2"]);
    assert_eq!(array.calls_to(QUERY_GROUPS), 2);

    assert_eq!(client.snapshot_client_groups("snap-1").await.unwrap(), vec!["g2"]);
    assert_eq!(array.calls_to(QUERY_GROUPS), 2);
}

#[tokio::test]
async fn unmapped_snapshot_has_no_groups() {
    let array = Arc::new(FakeArray::new());
    serve_snapshot_owner(&array, Arc::new(Mutex::new("nobody".to_string())));

    let groups = client(&array).snapshot_client_groups("snap-1").await.unwrap();

    assert!(groups.is_empty());
}

#[tokio::test]
async fn mapping_seeds_the_owner_cache() {
    let array = Arc::new(FakeArray::new());
    serve_snapshot_owner(&array, Arc::new(Mutex::new("g3".to_string())));
    let client = client(&array);

    client.add_snapshot_to_client_group("snap-1", "g3", "gw-1").await.unwrap();
    assert_eq!(client.snapshot_client_groups("snap-1").await.unwrap(), vec!["g3"]);

    assert_eq!(array.calls_to(QUERY_GROUPS), 0);
}
