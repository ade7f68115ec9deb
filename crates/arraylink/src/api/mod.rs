//! Typed requests for the array operations the client helpers use.

pub mod codes;
mod client_group;

pub use client_group::{
    ChangeGroupSnapshots, ClientGroup, ClientGroupPage, ListGroupSnapshots, LunAction,
    LunResource, MappedLun, MappedLuns, QueryClientGroups,
};

use arraylink_session::{Ack, Request};
use serde::{Deserialize, Serialize};

/// Volume as the array describes it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Volume {
    pub id: String,
    #[serde(rename = "volume_name")]
    pub name: String,
    #[serde(default)]
    pub pool_id: Option<String>,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetVolume {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct GetVolumeReply {
    pub volume_detail: Volume,
}

impl Request for GetVolume {
    const OPERATION: &'static str = "get-volume";
    type Response = GetVolumeReply;
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteSnapshot {
    pub id: String,
}

impl Request for DeleteSnapshot {
    const OPERATION: &'static str = "delete-volume-snapshot";
    type Response = Ack;
}

/// Lifts a volume path out of the failure-domain blacklist.
#[derive(Debug, Clone, Serialize)]
pub struct RemoveBlacklistPath {
    pub path: String,
}

impl Request for RemoveBlacklistPath {
    const OPERATION: &'static str = "remove-volume-path-from-blacklist";
    type Response = Ack;
}
