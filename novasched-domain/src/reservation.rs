use crate::meta::ObjectMeta;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceQuantities {
    pub cpu: u64,
    pub memory_mb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ReservationKind {
    /// Pins capacity on a host to one project+flavor pair.
    CommittedResource { project_id: String, flavor: String },
    /// A VM-specific backup host holding resources for a named set of
    /// original hosts it would fail over from.
    Failover {
        vm_uuid: String,
        original_hosts: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationSpec {
    pub target_host: String,
    #[serde(default)]
    pub observed_host: Option<String>,
    pub resources: ResourceQuantities,
    #[serde(flatten)]
    pub kind: ReservationKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationResource {
    #[serde(default = "reservation_api_version")]
    pub api_version: String,
    #[serde(default = "reservation_kind_str")]
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: ReservationSpec,
}

fn reservation_api_version() -> String {
    "novasched.io/v1".to_string()
}

fn reservation_kind_str() -> String {
    "Reservation".to_string()
}
