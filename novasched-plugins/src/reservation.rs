use std::collections::HashMap;
use std::sync::Arc;

use novasched_core::{Filter, InitContext, InitError, Weigher};
use novasched_domain::{PluginSpec, ReservationKind, ReservationResource};

use crate::context::ComputeCtx;

const KNOWLEDGE_TABLE: &str = "reservations";

fn load_reservations(init: &InitContext<'_>) -> Result<Vec<ReservationResource>, InitError> {
    let knowledge = init
        .knowledge
        .get(KNOWLEDGE_TABLE)
        .ok_or_else(|| InitError::NonCritical(format!("{KNOWLEDGE_TABLE} knowledge not present")))?;
    if !knowledge.is_ready() {
        return Err(InitError::NonCritical(format!("{KNOWLEDGE_TABLE} knowledge not ready")));
    }
    serde_json::from_value(knowledge.spec.payload).map_err(|err| InitError::Critical(format!("malformed {KNOWLEDGE_TABLE} payload: {err}")))
}

/// Excludes any host pinned by a `CommittedResource` reservation to a
/// project+flavor pair other than the request's — S2 in the testable
/// properties. A host with no reservation, or one matching the request's
/// own project+flavor, is untouched.
pub struct CommittedResourceGate {
    by_host: HashMap<String, (String, String)>,
}

impl Filter<ComputeCtx> for CommittedResourceGate {
    fn name(&self) -> &str {
        "CommittedResourceGate"
    }

    fn filter(&self, ctx: &ComputeCtx, candidates: &[String], reasons: &mut HashMap<String, String>) -> anyhow::Result<Vec<String>> {
        let surviving = candidates
            .iter()
            .filter(|host| match self.by_host.get(host.as_str()) {
                Some((project_id, flavor)) => {
                    let matches = project_id == &ctx.project_id && flavor == &ctx.flavor.name;
                    if !matches {
                        reasons.insert((*host).clone(), "host reserved for a different project/flavor".to_string());
                    }
                    matches
                }
                None => true,
            })
            .cloned()
            .collect();
        Ok(surviving)
    }
}

pub fn validate_committed_resource_gate(_spec: &PluginSpec) -> Result<(), String> {
    Ok(())
}

pub fn construct_committed_resource_gate(_spec: &PluginSpec, init: &InitContext<'_>) -> Result<Arc<dyn Filter<ComputeCtx>>, InitError> {
    let reservations = load_reservations(init)?;
    let by_host = reservations
        .into_iter()
        .filter_map(|r| match r.spec.kind {
            ReservationKind::CommittedResource { project_id, flavor } => Some((r.spec.target_host, (project_id, flavor))),
            ReservationKind::Failover { .. } => None,
        })
        .collect();
    Ok(Arc::new(CommittedResourceGate { by_host }))
}

/// Adds a large positive delta to a host holding a `Failover` reservation
/// for this exact VM, so an evacuation prefers its dedicated backup host
/// over any other candidate — S3 in the testable properties. Hosts with no
/// matching Failover reservation are untouched (delta 0).
pub struct FailoverPreference {
    by_vm: HashMap<String, String>,
    boost: f64,
}

const DEFAULT_BOOST: f64 = 1000.0;

impl Weigher<ComputeCtx> for FailoverPreference {
    fn name(&self) -> &str {
        "FailoverPreference"
    }

    fn weigh(&self, ctx: &ComputeCtx, candidates: &[String]) -> anyhow::Result<HashMap<String, f64>> {
        let mut deltas: HashMap<String, f64> = candidates.iter().map(|h| (h.clone(), 0.0)).collect();
        if let Some(preferred_host) = self.by_vm.get(&ctx.instance_uuid) {
            if let Some(delta) = deltas.get_mut(preferred_host) {
                *delta = self.boost;
            }
        }
        Ok(deltas)
    }
}

pub fn validate_failover_preference(_spec: &PluginSpec) -> Result<(), String> {
    Ok(())
}

pub fn construct_failover_preference(spec: &PluginSpec, init: &InitContext<'_>) -> Result<Arc<dyn Weigher<ComputeCtx>>, InitError> {
    let reservations = load_reservations(init)?;
    let by_vm = reservations
        .into_iter()
        .filter_map(|r| match r.spec.kind {
            ReservationKind::Failover { vm_uuid, .. } => Some((vm_uuid, r.spec.target_host)),
            ReservationKind::CommittedResource { .. } => None,
        })
        .collect();
    let boost = spec
        .options
        .get("boost")
        .and_then(|v| v.as_f64())
        .unwrap_or(DEFAULT_BOOST);
    Ok(Arc::new(FailoverPreference { by_vm, boost }))
}
