use std::collections::HashMap;
use std::sync::Arc;

use novasched_core::{InitContext, InitError, Weigher};
use novasched_domain::{HypervisorSpec, PluginSpec};

use crate::context::ComputeCtx;

const KNOWLEDGE_TABLE: &str = "hypervisors";

/// Scores candidates toward an even CPU/memory utilization split, the same
/// shape as `BalancedAllocation::balanced_resource_scorer`: per-resource
/// utilization fraction after hypothetically placing the request, then
/// `(1 - |cpu_fraction - memory_fraction| / 2) * 100`. Lower variance
/// between the two fractions scores higher.
pub struct LoadBalancing {
    hosts: HashMap<String, HypervisorSpec>,
}

impl Weigher<ComputeCtx> for LoadBalancing {
    fn name(&self) -> &str {
        "LoadBalancing"
    }

    fn weigh(&self, ctx: &ComputeCtx, candidates: &[String]) -> anyhow::Result<HashMap<String, f64>> {
        let need_cpu = ctx.flavor.vcpus as u64;
        let need_memory_mb = ctx.flavor.memory_mb;

        let mut deltas = HashMap::new();
        for host in candidates {
            let Some(hv) = self.hosts.get(host) else {
                deltas.insert(host.clone(), 0.0);
                continue;
            };
            let cpu_fraction = fraction(hv.allocated.cpu + need_cpu, hv.capacity.cpu);
            let memory_fraction = fraction(hv.allocated.memory_mb + need_memory_mb, hv.capacity.memory_mb);
            let score = (1.0 - (cpu_fraction - memory_fraction).abs() / 2.0) * 100.0;
            deltas.insert(host.clone(), score);
        }
        Ok(deltas)
    }
}

fn fraction(requested: u64, capacity: u64) -> f64 {
    if capacity == 0 {
        return 0.0;
    }
    (requested as f64 / capacity as f64).min(1.0)
}

pub fn validate(_spec: &PluginSpec) -> Result<(), String> {
    Ok(())
}

pub fn construct(_spec: &PluginSpec, init: &InitContext<'_>) -> Result<Arc<dyn Weigher<ComputeCtx>>, InitError> {
    let knowledge = init
        .knowledge
        .get(KNOWLEDGE_TABLE)
        .ok_or_else(|| InitError::NonCritical(format!("{KNOWLEDGE_TABLE} knowledge not present")))?;
    if !knowledge.is_ready() {
        return Err(InitError::NonCritical(format!("{KNOWLEDGE_TABLE} knowledge not ready")));
    }
    let hosts: HashMap<String, HypervisorSpec> = serde_json::from_value(knowledge.spec.payload)
        .map_err(|err| InitError::Critical(format!("malformed {KNOWLEDGE_TABLE} payload: {err}")))?;
    Ok(Arc::new(LoadBalancing { hosts }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use novasched_domain::{FlavorData, ResourceQuantities};

    fn hypervisor(cpu_cap: u64, cpu_alloc: u64, mem_cap: u64, mem_alloc: u64) -> HypervisorSpec {
        HypervisorSpec {
            capacity: ResourceQuantities { cpu: cpu_cap, memory_mb: mem_cap },
            allocated: ResourceQuantities { cpu: cpu_alloc, memory_mb: mem_alloc },
            availability_zone: None,
        }
    }

    fn ctx() -> ComputeCtx {
        let mut extra_specs = HashMap::new();
        extra_specs.insert("capabilities:hypervisor_type".to_string(), "qemu".to_string());
        ComputeCtx {
            project_id: "project-a".to_string(),
            instance_uuid: "vm-1".to_string(),
            flavor: FlavorData { name: "m1.large".to_string(), vcpus: 2, memory_mb: 4096, extra_specs },
            reservation: false,
        }
    }

    #[test]
    fn balanced_host_scores_higher_than_skewed_host() {
        let mut hosts = HashMap::new();
        // h1: placing this request yields 50% cpu, 50% mem -> perfectly balanced.
        hosts.insert("h1".to_string(), hypervisor(4, 0, 8192, 0));
        // h2: placing this request yields 20% cpu, 90% mem -> skewed.
        hosts.insert("h2".to_string(), hypervisor(10, 0, 4551, 0));
        let plugin = LoadBalancing { hosts };
        let deltas = plugin.weigh(&ctx(), &["h1".to_string(), "h2".to_string()]).unwrap();
        assert!(deltas["h1"] > deltas["h2"]);
    }

    #[test]
    fn unknown_host_gets_zero_delta() {
        let plugin = LoadBalancing { hosts: HashMap::new() };
        let deltas = plugin.weigh(&ctx(), &["h1".to_string()]).unwrap();
        assert_eq!(deltas["h1"], 0.0);
    }
}
