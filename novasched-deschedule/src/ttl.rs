use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use novasched_core::{ResourceStore, TypedStore};
use novasched_domain::DeschedulingResource;
use tokio_util::sync::CancellationToken;

use crate::metrics;

const DESCHEDULING_KIND: &str = "descheduling";

/// Cleans up terminal and stale Descheduling resources: on startup, and
/// then once per sweep interval, every resource older than `horizon` is
/// deleted; everything else is left for the next sweep. §4.8 frames this as
/// a per-resource requeue-for-the-remaining-interval reconcile; a fixed
/// periodic sweep over the whole list achieves the same end state without
/// needing a per-object timer, and is idempotent against a resource another
/// sweep (or the executor) already deleted.
pub async fn run(store: Arc<dyn ResourceStore>, namespace: String, horizon: chrono::Duration, sweep_interval: Duration, cancel: CancellationToken) {
    loop {
        sweep(store.as_ref(), &namespace, horizon).await;

        tokio::select! {
            _ = cancel.cancelled() => {
                log::info!("descheduling TTL cleanup for namespace {namespace} shutting down");
                return;
            }
            _ = tokio::time::sleep(sweep_interval) => {}
        }
    }
}

async fn sweep(store: &dyn ResourceStore, namespace: &str, horizon: chrono::Duration) {
    let typed = TypedStore::new(store);
    let resources: Vec<DeschedulingResource> = match typed.list(DESCHEDULING_KIND, namespace).await {
        Ok(resources) => resources,
        Err(err) => {
            log::error!("TTL sweep failed to list descheduling resources: {err:#}");
            return;
        }
    };

    let now = Utc::now();
    for resource in resources {
        let age = now.signed_duration_since(resource.metadata.creation_timestamp);
        if age >= horizon {
            if let Err(err) = typed.delete(DESCHEDULING_KIND, namespace, &resource.metadata.name).await {
                log::error!("failed to delete expired descheduling {}: {err:#}", resource.metadata.name);
            } else {
                metrics::TTL_DELETED.with_label_values(&[namespace]).inc();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use novasched_domain::{DeschedulingStatus, ObjectMeta, Phase};
    use novasched_store::InMemoryResourceStore;

    fn aged_resource(name: &str, age: chrono::Duration) -> DeschedulingResource {
        let mut resource = DeschedulingResource::new(name, None, "test".to_string());
        resource.metadata = ObjectMeta { creation_timestamp: Utc::now() - age, ..resource.metadata };
        resource.status = Some(DeschedulingStatus { phase: Phase::Ready { success: true, reason: None }, new_host: None });
        resource
    }

    #[tokio::test]
    async fn deletes_resources_past_the_horizon_and_keeps_fresh_ones() {
        let store: Arc<dyn ResourceStore> = Arc::new(InMemoryResourceStore::new());
        let typed = TypedStore::new(store.as_ref());
        typed.put("descheduling", "default", "old", &aged_resource("old", chrono::Duration::hours(25))).await.unwrap();
        typed.put("descheduling", "default", "fresh", &aged_resource("fresh", chrono::Duration::hours(1))).await.unwrap();

        sweep(store.as_ref(), "default", chrono::Duration::hours(24)).await;

        let remaining: Vec<DeschedulingResource> = typed.list("descheduling", "default").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].metadata.name, "fresh");
    }

    #[tokio::test]
    async fn sweep_is_idempotent_against_an_empty_store() {
        let store: Arc<dyn ResourceStore> = Arc::new(InMemoryResourceStore::new());
        sweep(store.as_ref(), "default", chrono::Duration::hours(24)).await;
        sweep(store.as_ref(), "default", chrono::Duration::hours(24)).await;
    }
}
