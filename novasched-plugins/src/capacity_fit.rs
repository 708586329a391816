use std::collections::HashMap;
use std::sync::Arc;

use novasched_core::{Filter, InitContext, InitError};
use novasched_domain::{HypervisorSpec, PluginSpec};

use crate::context::ComputeCtx;

const KNOWLEDGE_TABLE: &str = "hypervisors";
const ERR_REASON: &str = "host(s) didn't have enough free capacity";

/// Drops any candidate whose free CPU or memory can't cover the request's
/// flavor. Mirrors `NodeResourcesFit::filter`'s allocatable-minus-requested
/// comparison, generalized from a single node/pod pair to a host keyed by
/// name against a fleet-wide `Hypervisor` snapshot read once at `Init`.
pub struct CapacityFit {
    hosts: HashMap<String, HypervisorSpec>,
}

impl Filter<ComputeCtx> for CapacityFit {
    fn name(&self) -> &str {
        "CapacityFit"
    }

    fn filter(&self, ctx: &ComputeCtx, candidates: &[String], reasons: &mut HashMap<String, String>) -> anyhow::Result<Vec<String>> {
        let need_cpu = ctx.flavor.vcpus as u64;
        let need_memory_mb = ctx.flavor.memory_mb;

        let surviving = candidates
            .iter()
            .filter(|host| match self.hosts.get(host.as_str()) {
                Some(hv) => {
                    let fits = hv.free_cpu() >= need_cpu && hv.free_memory_mb() >= need_memory_mb;
                    if !fits {
                        reasons.insert((*host).clone(), ERR_REASON.to_string());
                    }
                    fits
                }
                None => {
                    reasons.insert((*host).clone(), "host not present in hypervisor knowledge".to_string());
                    false
                }
            })
            .cloned()
            .collect();
        Ok(surviving)
    }
}

pub fn validate(_spec: &PluginSpec) -> Result<(), String> {
    Ok(())
}

pub fn construct(_spec: &PluginSpec, init: &InitContext<'_>) -> Result<Arc<dyn Filter<ComputeCtx>>, InitError> {
    let knowledge = init
        .knowledge
        .get(KNOWLEDGE_TABLE)
        .ok_or_else(|| InitError::NonCritical(format!("{KNOWLEDGE_TABLE} knowledge not present")))?;
    if !knowledge.is_ready() {
        return Err(InitError::NonCritical(format!("{KNOWLEDGE_TABLE} knowledge not ready")));
    }
    let hosts: HashMap<String, HypervisorSpec> = serde_json::from_value(knowledge.spec.payload)
        .map_err(|err| InitError::Critical(format!("malformed {KNOWLEDGE_TABLE} payload: {err}")))?;
    Ok(Arc::new(CapacityFit { hosts }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use novasched_domain::ResourceQuantities;

    fn hypervisor(free_cpu: u64, free_memory_mb: u64) -> HypervisorSpec {
        HypervisorSpec {
            capacity: ResourceQuantities { cpu: free_cpu, memory_mb: free_memory_mb },
            allocated: ResourceQuantities { cpu: 0, memory_mb: 0 },
            availability_zone: None,
        }
    }

    fn ctx(vcpus: u32, memory_mb: u64) -> ComputeCtx {
        let mut extra_specs = std::collections::HashMap::new();
        extra_specs.insert("capabilities:hypervisor_type".to_string(), "qemu".to_string());
        ComputeCtx {
            project_id: "project-a".to_string(),
            instance_uuid: "vm-1".to_string(),
            flavor: novasched_domain::FlavorData { name: "m1.large".to_string(), vcpus, memory_mb, extra_specs },
            reservation: false,
        }
    }

    #[test]
    fn drops_host_with_insufficient_cpu() {
        let mut hosts = HashMap::new();
        hosts.insert("h1".to_string(), hypervisor(2, 16384));
        hosts.insert("h2".to_string(), hypervisor(8, 16384));
        let plugin = CapacityFit { hosts };
        let mut reasons = HashMap::new();
        let out = plugin.filter(&ctx(4, 8192), &["h1".to_string(), "h2".to_string()], &mut reasons).unwrap();
        assert_eq!(out, vec!["h2".to_string()]);
        assert!(reasons.contains_key("h1"));
    }

    #[test]
    fn unknown_host_is_dropped_not_errored() {
        let plugin = CapacityFit { hosts: HashMap::new() };
        let mut reasons = HashMap::new();
        let out = plugin.filter(&ctx(4, 8192), &["h1".to_string()], &mut reasons).unwrap();
        assert!(out.is_empty());
        assert!(reasons.contains_key("h1"));
    }
}
