use arraylink_session::{Ack, QueryParams, QueryRequest, Request};
use serde::{Deserialize, Serialize};

/// An iSCSI client group.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientGroup {
    pub id: String,
    pub name: String,
    /// Number of snapshots mapped into the group.
    #[serde(default)]
    pub snap_num: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryClientGroups {
    #[serde(flatten)]
    pub query: QueryParams,
}

#[derive(Debug, Deserialize)]
pub struct ClientGroupPage {
    pub clients: Vec<ClientGroup>,
}

impl Request for QueryClientGroups {
    const OPERATION: &'static str = "query-iscsi-client-groups";
    type Response = ClientGroupPage;
}

impl QueryRequest for QueryClientGroups {
    fn query_params(&self) -> &QueryParams {
        &self.query
    }
}

/// Snapshots mapped into one client group.
#[derive(Debug, Clone, Serialize)]
pub struct ListGroupSnapshots {
    pub id: String,
    #[serde(flatten)]
    pub query: QueryParams,
}

impl ListGroupSnapshots {
    /// The array caps a client group at 64 LUNs, so one page of 100 holds
    /// them all.
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            id: group_id.into(),
            query: QueryParams::new().limit(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MappedLun {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct MappedLuns {
    pub luns: Vec<MappedLun>,
}

impl Request for ListGroupSnapshots {
    const OPERATION: &'static str = "get-iscsi-client-group-snapshots";
    type Response = MappedLuns;
}

impl QueryRequest for ListGroupSnapshots {
    fn query_params(&self) -> &QueryParams {
        &self.query
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LunAction {
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LunResource {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub readonly: bool,
}

impl LunResource {
    pub fn snapshot(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: "snapshot",
            readonly: true,
        }
    }
}

/// Maps or unmaps snapshots in a client group.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeGroupSnapshots {
    pub id: String,
    pub action: LunAction,
    pub luns: Vec<LunResource>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gateways: Vec<String>,
}

impl Request for ChangeGroupSnapshots {
    const OPERATION: &'static str = "change-snapshot-in-iscsi-client-group";
    type Response = Ack;
}
