use std::sync::Arc;
use std::time::Duration;

use novasched_core::{ComputeApi, DetectorPipeline, ResourceStore, TypedStore};
use novasched_domain::DeschedulingResource;
use tokio_util::sync::CancellationToken;

use crate::jitter::jittered;
use crate::metrics;

const DESCHEDULING_KIND: &str = "descheduling";
const PERIOD: Duration = Duration::from_secs(60);

/// Every jittered minute: run the one configured descheduler pipeline and
/// create a Descheduling for each surviving detection that doesn't already
/// exist. Grounded on `SchedulingQueue::run`'s pair of interval-driven
/// background tasks in the teacher, collapsed to a single loop here since
/// there is only one periodic pass, not two queues to drain.
pub async fn run(
    pipeline: Arc<DetectorPipeline>,
    compute: Arc<dyn ComputeApi>,
    store: Arc<dyn ResourceStore>,
    namespace: String,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                log::info!("descheduling periodic worker for pipeline {} shutting down", pipeline.name);
                return;
            }
            _ = tokio::time::sleep(jittered(PERIOD)) => {}
        }

        run_once(&pipeline, compute.as_ref(), store.as_ref(), &namespace).await;
    }
}

/// One pass: run the detector pipeline and create a Descheduling for each
/// surviving detection that doesn't already exist. Split out from [`run`]'s
/// loop so a test can drive two passes back to back without waiting on
/// real time.
pub async fn run_once(pipeline: &DetectorPipeline, compute: &dyn ComputeApi, store: &dyn ResourceStore, namespace: &str) {
    let typed = TypedStore::new(store);
    let outcome = pipeline.run(compute).await;
    for detection in outcome.detections {
        match typed.get::<DeschedulingResource>(DESCHEDULING_KIND, namespace, &detection.vm_uuid).await {
            Ok(Some(_)) => continue,
            Ok(None) => {
                let resource = DeschedulingResource::new(detection.vm_uuid.clone(), Some(detection.current_host), detection.reason);
                if let Err(err) = typed.put(DESCHEDULING_KIND, namespace, &detection.vm_uuid, &resource).await {
                    log::error!("failed to create descheduling for vm {}: {err:#}", detection.vm_uuid);
                } else {
                    metrics::PERIODIC_CREATED.with_label_values(&[&pipeline.name]).inc();
                }
            }
            Err(err) => log::error!("failed to check existing descheduling for vm {}: {err:#}", detection.vm_uuid),
        }
    }
}
