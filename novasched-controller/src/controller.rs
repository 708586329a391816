use std::collections::HashMap;
use std::sync::Arc;

use novasched_core::{DetectorPipeline, FilterWeigherPipeline, HypervisorFamilyOf, Registry, ResourceStore, SnapshotKnowledgeStore, TypedStore, WatchEvent};
use novasched_domain::{KnowledgeResource, PipelineKind, PipelineResource};
use tokio::select;
use tokio::sync::RwLock;

use crate::install::{install_detector, install_filter_weigher};

const KNOWLEDGE: &str = "knowledge";
const PIPELINE: &str = "pipeline";

/// Reconciles declarative `Pipeline` and `Knowledge` resources into the
/// runtime pipelines the API and descheduling workers drive, mirroring
/// `libscheduler::with_xline::run_scheduler_with_xline`'s watch-driven cache
/// update loop but for plugin pipelines instead of pod/node caches.
///
/// One controller instance owns one domain's plugin [`Registry`] (`Ctx` is
/// that domain's per-request context type, e.g. `novasched_plugins::ComputeCtx`
/// for compute). `novasched-api` and `novasched-deschedule` read installed
/// pipelines through [`Self::filter_weigher`] / [`Self::detector`].
pub struct PipelineController<Ctx> {
    registry: Registry<Ctx>,
    knowledge: Arc<SnapshotKnowledgeStore>,
    store: Arc<dyn ResourceStore>,
    namespace: String,
    configs: RwLock<HashMap<String, PipelineResource>>,
    filter_weigher_pipelines: RwLock<HashMap<String, Arc<FilterWeigherPipeline<Ctx>>>>,
    detector_pipelines: RwLock<HashMap<String, Arc<DetectorPipeline>>>,
}

impl<Ctx> PipelineController<Ctx>
where
    Ctx: HypervisorFamilyOf + Send + Sync + 'static,
{
    pub fn new(registry: Registry<Ctx>, store: Arc<dyn ResourceStore>, namespace: impl Into<String>) -> Self {
        Self {
            registry,
            knowledge: Arc::new(SnapshotKnowledgeStore::new()),
            store,
            namespace: namespace.into(),
            configs: RwLock::new(HashMap::new()),
            filter_weigher_pipelines: RwLock::new(HashMap::new()),
            detector_pipelines: RwLock::new(HashMap::new()),
        }
    }

    pub fn knowledge(&self) -> &Arc<SnapshotKnowledgeStore> {
        &self.knowledge
    }

    pub async fn filter_weigher(&self, name: &str) -> Option<Arc<FilterWeigherPipeline<Ctx>>> {
        self.filter_weigher_pipelines.read().await.get(name).cloned()
    }

    pub async fn detector(&self, name: &str) -> Option<Arc<DetectorPipeline>> {
        self.detector_pipelines.read().await.get(name).cloned()
    }

    /// Loads every existing `Knowledge` and `Pipeline` resource before the
    /// watch loop starts, so a process restart re-derives the same runtime
    /// state a live reconcile would have produced incrementally.
    pub async fn bootstrap(&self) -> anyhow::Result<()> {
        let typed = TypedStore::new(self.store.as_ref());
        for resource in typed.list::<KnowledgeResource>(KNOWLEDGE, &self.namespace).await? {
            self.knowledge.put(resource);
        }
        for resource in typed.list::<PipelineResource>(PIPELINE, &self.namespace).await? {
            self.apply_pipeline(resource).await?;
        }
        Ok(())
    }

    /// Installs (or re-installs) one pipeline and writes its resulting
    /// status back to the store, exactly as a Kubernetes controller patches
    /// `.status` after reconciling `.spec`.
    pub async fn apply_pipeline(&self, mut resource: PipelineResource) -> anyhow::Result<()> {
        let name = resource.metadata.name.clone();
        self.configs.write().await.insert(name.clone(), resource.clone());

        let status = match resource.spec.kind {
            PipelineKind::FilterWeigher => {
                let (pipeline, status) = install_filter_weigher(&name, &resource.spec, &self.registry, self.knowledge.as_ref());
                match pipeline {
                    Some(pipeline) => {
                        self.filter_weigher_pipelines.write().await.insert(name.clone(), Arc::new(pipeline));
                    }
                    None => {
                        self.filter_weigher_pipelines.write().await.remove(&name);
                    }
                }
                status
            }
            PipelineKind::Detector => {
                let (pipeline, status) = install_detector(&name, &resource.spec, &self.registry, self.knowledge.as_ref());
                match pipeline {
                    Some(pipeline) => {
                        self.detector_pipelines.write().await.insert(name.clone(), Arc::new(pipeline));
                    }
                    None => {
                        self.detector_pipelines.write().await.remove(&name);
                    }
                }
                status
            }
        };

        log::info!("pipeline {name} reconciled: ready={} degraded={:?}", status.ready, status.degraded_steps);
        resource.status = Some(status);
        TypedStore::new(self.store.as_ref()).put(PIPELINE, &self.namespace, &name, &resource).await
    }

    pub async fn remove_pipeline(&self, name: &str) {
        self.configs.write().await.remove(name);
        self.filter_weigher_pipelines.write().await.remove(name);
        self.detector_pipelines.write().await.remove(name);
    }

    /// Knowledge snapshots are bound at plugin `Init` time only, so a
    /// Knowledge change has to re-run every currently configured pipeline's
    /// install rather than patch plugins in place.
    pub async fn reinstall_all(&self) -> anyhow::Result<()> {
        let configs: Vec<PipelineResource> = self.configs.read().await.values().cloned().collect();
        for resource in configs {
            self.apply_pipeline(resource).await?;
        }
        Ok(())
    }

    fn name_from_key(key: &str) -> Option<&str> {
        key.split('/').filter(|s| !s.is_empty()).next_back()
    }

    /// Runs the reconciliation loop until the underlying watches end. Bootstraps
    /// existing resources first, then dispatches subsequent Pipeline/Knowledge
    /// changes as they arrive — the two-watch `select!` fan-in is the same
    /// shape `run_scheduler_with_xline` uses for its pod/node watches.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        self.bootstrap().await?;

        let mut pipeline_watch = self.store.watch_raw(PIPELINE, &self.namespace).await?;
        let mut knowledge_watch = self.store.watch_raw(KNOWLEDGE, &self.namespace).await?;

        loop {
            select! {
                event = pipeline_watch.recv() => {
                    match event {
                        Some(WatchEvent::Put { value, .. }) => {
                            match serde_json::from_value::<PipelineResource>(value) {
                                Ok(resource) => {
                                    if let Err(err) = self.apply_pipeline(resource).await {
                                        log::error!("failed to apply pipeline update: {err:#}");
                                    }
                                }
                                Err(err) => log::error!("malformed pipeline resource on watch: {err}"),
                            }
                        }
                        Some(WatchEvent::Delete { key }) => {
                            if let Some(name) = Self::name_from_key(&key) {
                                self.remove_pipeline(name).await;
                            }
                        }
                        None => return Ok(()),
                    }
                }
                event = knowledge_watch.recv() => {
                    match event {
                        Some(WatchEvent::Put { value, .. }) => {
                            match serde_json::from_value::<KnowledgeResource>(value) {
                                Ok(resource) => {
                                    self.knowledge.put(resource);
                                    if let Err(err) = self.reinstall_all().await {
                                        log::error!("failed to reinstall pipelines after knowledge update: {err:#}");
                                    }
                                }
                                Err(err) => log::error!("malformed knowledge resource on watch: {err}"),
                            }
                        }
                        Some(WatchEvent::Delete { key }) => {
                            if let Some(name) = Self::name_from_key(&key) {
                                self.knowledge.remove(name);
                                if let Err(err) = self.reinstall_all().await {
                                    log::error!("failed to reinstall pipelines after knowledge removal: {err:#}");
                                }
                            }
                        }
                        None => return Ok(()),
                    }
                }
            }
        }
    }
}
