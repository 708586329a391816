use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use novasched_core::{ComputeApi, ResourceStore, TypedStore, WatchEvent};
use novasched_domain::{DeschedulingResource, Phase};

use crate::executor::{self, Outcome};

const DESCHEDULING: &str = "descheduling";

/// Watches `Descheduling` resources and runs one [`executor::reconcile`] per
/// resource that isn't already being worked, mirroring
/// `PipelineController::run`'s bootstrap-then-watch shape but dispatching a
/// concurrent task per key instead of reconciling inline, since each
/// reconcile here can block for the whole live-migration poll loop.
pub struct Dispatcher {
    store: Arc<dyn ResourceStore>,
    compute: Arc<dyn ComputeApi>,
    namespace: String,
    dry_run: bool,
    in_flight: Mutex<HashSet<String>>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn ResourceStore>, compute: Arc<dyn ComputeApi>, namespace: impl Into<String>, dry_run: bool) -> Self {
        Self { store, compute, namespace: namespace.into(), dry_run, in_flight: Mutex::new(HashSet::new()) }
    }

    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let typed = TypedStore::new(self.store.as_ref());
        for resource in typed.list::<DeschedulingResource>(DESCHEDULING, &self.namespace).await? {
            self.clone().maybe_dispatch(resource);
        }

        let mut watch = self.store.watch_raw(DESCHEDULING, &self.namespace).await?;
        while let Some(event) = watch.recv().await {
            match event {
                WatchEvent::Put { value, .. } => match serde_json::from_value::<DeschedulingResource>(value) {
                    Ok(resource) => self.clone().maybe_dispatch(resource),
                    Err(err) => log::error!("malformed descheduling resource on watch: {err}"),
                },
                WatchEvent::Delete { .. } => {}
            }
        }
        Ok(())
    }

    /// Skips a resource that's already terminal or already has a reconcile
    /// in flight — the latter is how "an InProgress Descheduling is not
    /// re-reconciled until the poll loop concludes" is enforced.
    fn maybe_dispatch(self: Arc<Self>, resource: DeschedulingResource) {
        let is_terminal = matches!(&resource.status, Some(status) if status.phase.is_terminal());
        if is_terminal {
            return;
        }

        let name = resource.metadata.name.clone();
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            if !in_flight.insert(name.clone()) {
                return;
            }
        }

        tokio::spawn(async move {
            self.reconcile_one(resource).await;
            self.in_flight.lock().unwrap().remove(&name);
        });
    }

    async fn reconcile_one(&self, mut resource: DeschedulingResource) {
        let name = resource.metadata.name.clone();
        let outcome = executor::reconcile(&resource.spec, self.compute.as_ref(), self.dry_run).await;
        let typed = TypedStore::new(self.store.as_ref());
        match outcome {
            Outcome::Deleted => {
                if let Err(err) = typed.delete(DESCHEDULING, &self.namespace, &name).await {
                    log::error!("failed to delete descheduling {name} for a vanished vm: {err:#}");
                }
            }
            Outcome::Terminal(status) => {
                let success = matches!(status.phase, Phase::Ready { success: true, .. });
                resource.status = Some(status);
                if let Err(err) = typed.put(DESCHEDULING, &self.namespace, &name, &resource).await {
                    log::error!("failed to persist terminal descheduling status for {name}: {err:#}");
                } else {
                    log::info!("descheduling {name} reached terminal state, success={success}");
                }
            }
            Outcome::Unchanged => {}
        }
    }
}
