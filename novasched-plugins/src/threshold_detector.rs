use std::collections::HashMap;
use std::sync::Arc;

use novasched_core::{Detection, Detector, InitContext, InitError};
use novasched_domain::PluginSpec;
use serde::Deserialize;

const KNOWLEDGE_TABLE: &str = "vm-metrics";

#[derive(Debug, Deserialize)]
struct VmMetricEntry {
    host: String,
    metrics: HashMap<String, f64>,
}

/// Flags any VM whose configured metric (e.g. `steal_time`,
/// `memory_pressure`) is at or above a configured threshold. The metric
/// snapshot is read once at `Init` from the `vm-metrics` Knowledge table, so
/// `run` itself does no I/O — it's a pure scan over the bound snapshot,
/// matching the plugin contract's "stateless except for Init-bound
/// knowledge" invariant.
pub struct ThresholdDetector {
    metric: String,
    threshold: f64,
    reason: String,
    snapshot: Vec<(String, String, f64)>,
}

impl Detector for ThresholdDetector {
    fn name(&self) -> &str {
        "ThresholdDetector"
    }

    fn run(&self) -> anyhow::Result<Vec<Detection>> {
        Ok(self
            .snapshot
            .iter()
            .filter(|(_, _, value)| *value >= self.threshold)
            .map(|(vm_uuid, host, value)| Detection {
                vm_uuid: vm_uuid.clone(),
                current_host: host.clone(),
                reason: format!("{} ({}={value:.2}, threshold={})", self.reason, self.metric, self.threshold),
            })
            .collect())
    }
}

pub fn validate(spec: &PluginSpec) -> Result<(), String> {
    if spec.options.get("metric").and_then(|v| v.as_str()).is_none() {
        return Err("ThresholdDetector requires options.metric".to_string());
    }
    if spec.options.get("threshold").and_then(|v| v.as_f64()).is_none() {
        return Err("ThresholdDetector requires options.threshold".to_string());
    }
    Ok(())
}

pub fn construct(spec: &PluginSpec, init: &InitContext<'_>) -> Result<Arc<dyn Detector>, InitError> {
    let metric = spec
        .options
        .get("metric")
        .and_then(|v| v.as_str())
        .ok_or_else(|| InitError::Critical("ThresholdDetector requires options.metric".to_string()))?
        .to_string();
    let threshold = spec
        .options
        .get("threshold")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| InitError::Critical("ThresholdDetector requires options.threshold".to_string()))?;
    let reason = spec
        .options
        .get("reason")
        .and_then(|v| v.as_str())
        .unwrap_or(&metric)
        .to_string();

    let knowledge = init
        .knowledge
        .get(KNOWLEDGE_TABLE)
        .ok_or_else(|| InitError::NonCritical(format!("{KNOWLEDGE_TABLE} knowledge not present")))?;
    if !knowledge.is_ready() {
        return Err(InitError::NonCritical(format!("{KNOWLEDGE_TABLE} knowledge not ready")));
    }
    let entries: HashMap<String, VmMetricEntry> = serde_json::from_value(knowledge.spec.payload)
        .map_err(|err| InitError::Critical(format!("malformed {KNOWLEDGE_TABLE} payload: {err}")))?;

    let snapshot = entries
        .into_iter()
        .filter_map(|(vm_uuid, entry)| entry.metrics.get(&metric).map(|v| (vm_uuid, entry.host.clone(), *v)))
        .collect();

    Ok(Arc::new(ThresholdDetector { metric, threshold, reason, snapshot }))
}
