use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The wire format nests several fields under a `data` key; this wrapper
/// captures that shape generically so `SchedulingRequest` can mirror the
/// JSON in spec.md §6 field for field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wrapped<T> {
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlavorData {
    pub name: String,
    pub vcpus: u32,
    pub memory_mb: u64,
    #[serde(default)]
    pub extra_specs: HashMap<String, String>,
}

pub type Flavor = Wrapped<FlavorData>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSpecData {
    pub project_id: String,
    pub instance_uuid: String,
    #[serde(default = "default_num_instances")]
    pub num_instances: u32,
    pub flavor: Flavor,
}

fn default_num_instances() -> u32 {
    1
}

pub type ResourceSpec = Wrapped<ResourceSpecData>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRef {
    pub compute_host: String,
    #[serde(default)]
    pub hypervisor_hostname: Option<String>,
}

/// Body of `POST /scheduler/nova/external`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingRequest {
    pub spec: ResourceSpec,
    pub hosts: Vec<HostRef>,
    pub weights: HashMap<String, f64>,
    #[serde(default)]
    pub pipeline: Option<String>,
    #[serde(default)]
    pub reservation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingResponse {
    pub hosts: Vec<String>,
}

impl SchedulingResponse {
    pub fn new(hosts: Vec<String>) -> Self {
        Self { hosts }
    }
}

/// The two hypervisor families this system distinguishes. Anything a
/// flavor's `capabilities:hypervisor_type` extra-spec maps to outside these
/// two is rejected rather than guessed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HypervisorFamily {
    Kvm,
    Vmware,
}

impl std::fmt::Display for HypervisorFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HypervisorFamily::Kvm => write!(f, "kvm"),
            HypervisorFamily::Vmware => write!(f, "vmware"),
        }
    }
}

/// `qemu`/`ch` map to `kvm`; anything `vmware`-prefixed maps to `vmware`;
/// anything else is an unsupported configuration. Case-insensitive, since
/// the extra-spec is operator-authored free text.
pub fn hypervisor_family_of(flavor: &FlavorData) -> Result<HypervisorFamily, Error> {
    let raw = flavor
        .extra_specs
        .get("capabilities:hypervisor_type")
        .ok_or_else(|| Error::MalformedInput("flavor missing capabilities:hypervisor_type extra-spec".to_string()))?;
    let lower = raw.to_ascii_lowercase();
    match lower.as_str() {
        "qemu" | "ch" => Ok(HypervisorFamily::Kvm),
        other if other.starts_with("vmware") => Ok(HypervisorFamily::Vmware),
        other => Err(Error::UnsupportedConfiguration(format!("unknown hypervisor_type {other:?}"))),
    }
}
