use crate::meta::ObjectMeta;
use crate::reservation::ResourceQuantities;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HypervisorSpec {
    pub capacity: ResourceQuantities,
    #[serde(default)]
    pub allocated: ResourceQuantities,
    #[serde(default)]
    pub availability_zone: Option<String>,
}

impl Default for ResourceQuantities {
    fn default() -> Self {
        Self {
            cpu: 0,
            memory_mb: 0,
        }
    }
}

impl HypervisorSpec {
    pub fn free_cpu(&self) -> u64 {
        self.capacity.cpu.saturating_sub(self.allocated.cpu)
    }

    pub fn free_memory_mb(&self) -> u64 {
        self.capacity.memory_mb.saturating_sub(self.allocated.memory_mb)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HypervisorResource {
    #[serde(default = "hypervisor_api_version")]
    pub api_version: String,
    #[serde(default = "hypervisor_kind_str")]
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: HypervisorSpec,
}

fn hypervisor_api_version() -> String {
    "novasched.io/v1".to_string()
}

fn hypervisor_kind_str() -> String {
    "Hypervisor".to_string()
}
