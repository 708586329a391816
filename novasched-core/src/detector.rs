use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use novasched_domain::MigrationRecord;

use crate::compute::ComputeApi;
use crate::metrics;
use crate::plugin::{Detection, Detector};

pub struct DetectorStep {
    pub name: String,
    pub plugin: Arc<dyn Detector>,
}

pub struct DetectorRunOutcome {
    pub detections: Vec<Detection>,
}

/// Runs every configured detector concurrently, combines their output by VM
/// UUID, and drops anything a migration-history cycle or an origin-host
/// disagreement disqualifies. Built once by the controller from a
/// `PipelineSpec` of kind `Detector`, immutable afterward — the same
/// atomic-swap lifecycle as [`crate::filter_weigher::FilterWeigherPipeline`].
pub struct DetectorPipeline {
    pub name: String,
    pub steps: Vec<DetectorStep>,
}

impl DetectorPipeline {
    pub async fn run(&self, compute: &dyn ComputeApi) -> DetectorRunOutcome {
        let _timer = metrics::DETECTOR_RUN_DURATION.with_label_values(&[&self.name]).start_timer();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        for step in &self.steps {
            let plugin = Arc::clone(&step.plugin);
            let name = step.name.clone();
            let tx = tx.clone();
            tokio::task::spawn_blocking(move || {
                let result = plugin.run();
                let _ = tx.send((name, result));
            });
        }
        drop(tx);

        let mut per_detector = Vec::new();
        while let Some((name, result)) = rx.recv().await {
            match result {
                Ok(detections) => per_detector.push((name, detections)),
                Err(err) => log::error!("pipeline {} detector {name} failed: {err:#}", self.name),
            }
        }

        let combined = combine(&self.name, per_detector);
        let mut surviving = Vec::new();
        for detection in combined {
            match compute.list_migrations(&detection.vm_uuid).await {
                Ok(history) => {
                    if forms_cycle(&history) {
                        log::info!("pipeline {} dropping detection for {}: migration history forms a cycle", self.name, detection.vm_uuid);
                        metrics::DETECTIONS_DROPPED_CYCLE.with_label_values(&[&self.name]).inc();
                    } else {
                        surviving.push(detection);
                    }
                }
                Err(err) => {
                    log::error!("pipeline {} could not fetch migration history for {}, dropping conservatively: {err:#}", self.name, detection.vm_uuid);
                }
            }
        }
        surviving.sort_by(|a, b| a.vm_uuid.cmp(&b.vm_uuid));

        DetectorRunOutcome { detections: surviving }
    }
}

/// Merges per-detector detections keyed by VM UUID. A VM flagged by more
/// than one detector survives only if every detector agrees on the VM's
/// current host; detectors disagreeing on origin host is treated as
/// untrustworthy and the VM is dropped from this pass entirely, logged for
/// operators to investigate.
pub fn combine(pipeline_name: &str, per_detector: Vec<(String, Vec<Detection>)>) -> Vec<Detection> {
    let mut by_vm: HashMap<String, Vec<(String, String)>> = HashMap::new();
    for (_detector_name, detections) in per_detector {
        for d in detections {
            by_vm.entry(d.vm_uuid).or_default().push((d.current_host, d.reason));
        }
    }

    let mut out = Vec::new();
    for (vm_uuid, entries) in by_vm {
        let first_host = &entries[0].0;
        if entries.iter().all(|(host, _)| host == first_host) {
            let reason = entries.iter().map(|(_, reason)| reason.as_str()).collect::<Vec<_>>().join("; ");
            out.push(Detection { vm_uuid, current_host: first_host.clone(), reason });
        } else {
            log::warn!("origin-host conflict for vm {vm_uuid}, dropping from this pass");
            metrics::DETECTIONS_DROPPED_CONFLICT.with_label_values(&[pipeline_name]).inc();
        }
    }
    out
}

/// True if the migration history visits the same host twice, i.e. would
/// send the VM back somewhere it already was. An empty or single-hop
/// history never forms a cycle.
pub fn forms_cycle(history: &[MigrationRecord]) -> bool {
    if history.is_empty() {
        return false;
    }
    let mut seen = HashSet::new();
    seen.insert(history[0].source_host.clone());
    for hop in history {
        if !seen.insert(hop.dest_host.clone()) {
            return true;
        }
    }
    false
}
