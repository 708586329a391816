//! Exercises the controller's install/reconcile path against a real
//! `ResourceStore` (the in-memory fake), without any concrete domain plugins.

use std::collections::HashMap;
use std::sync::Arc;

use novasched_core::{Filter, FilterEntry, HypervisorFamilyOf, InitContext, InitError, Registry, ResourceStore, TypedStore, Weigher, WeigherEntry};
use novasched_controller::PipelineController;
use novasched_domain::{PipelineKind, PipelineResource, PipelineSpec, PluginSpec, SchedulingDomain};
use novasched_store::InMemoryResourceStore;

struct TestCtx;
impl HypervisorFamilyOf for TestCtx {
    fn hypervisor_family(&self) -> Option<&str> {
        None
    }
}

struct AlwaysKeep;
impl Filter<TestCtx> for AlwaysKeep {
    fn name(&self) -> &str {
        "AlwaysKeep"
    }
    fn filter(&self, _ctx: &TestCtx, candidates: &[String], _reasons: &mut HashMap<String, String>) -> anyhow::Result<Vec<String>> {
        Ok(candidates.to_vec())
    }
}

fn validate_ok(_spec: &PluginSpec) -> Result<(), String> {
    Ok(())
}

fn construct_always_keep(_spec: &PluginSpec, _init: &InitContext<'_>) -> Result<Arc<dyn Filter<TestCtx>>, InitError> {
    Ok(Arc::new(AlwaysKeep))
}

fn construct_needs_missing_table(_spec: &PluginSpec, init: &InitContext<'_>) -> Result<Arc<dyn Filter<TestCtx>>, InitError> {
    match init.knowledge.get("does-not-exist") {
        Some(_) => Ok(Arc::new(AlwaysKeep)),
        None => Err(InitError::NonCritical("knowledge table does-not-exist missing".to_string())),
    }
}

fn construct_always_critical(_spec: &PluginSpec, _init: &InitContext<'_>) -> Result<Arc<dyn Weigher<TestCtx>>, InitError> {
    Err(InitError::Critical("boom".to_string()))
}

fn registry() -> Registry<TestCtx> {
    let mut registry = Registry::new();
    registry.register_filter("AlwaysKeep", FilterEntry { validate: validate_ok, construct: construct_always_keep });
    registry.register_filter("NeedsMissingTable", FilterEntry { validate: validate_ok, construct: construct_needs_missing_table });
    registry.register_weigher("AlwaysCritical", WeigherEntry { validate: validate_ok, construct: construct_always_critical });
    registry
}

fn filter_weigher_resource(name: &str, filters: Vec<&str>) -> PipelineResource {
    PipelineResource::new(
        name,
        PipelineSpec {
            kind: PipelineKind::FilterWeigher,
            domain: SchedulingDomain::Compute,
            filters: filters.into_iter().map(|n| PluginSpec { name: n.to_string(), options: serde_json::Value::Null, scope: None }).collect(),
            weighers: vec![],
            detectors: vec![],
            create_decisions: false,
            ignore_preselection: false,
        },
    )
}

#[tokio::test]
async fn apply_pipeline_installs_and_persists_ready_status() {
    let store: Arc<dyn ResourceStore> = Arc::new(InMemoryResourceStore::new());
    let controller = PipelineController::new(registry(), store.clone(), "default");

    controller.apply_pipeline(filter_weigher_resource("p1", vec!["AlwaysKeep"])).await.unwrap();

    assert!(controller.filter_weigher("p1").await.is_some());

    let persisted: PipelineResource = TypedStore::new(store.as_ref()).get("pipeline", "default", "p1").await.unwrap().unwrap();
    let status = persisted.status.unwrap();
    assert!(status.ready);
    assert!(status.degraded_steps.is_empty());
}

#[tokio::test]
async fn non_critical_init_failure_degrades_step_but_installs() {
    let store: Arc<dyn ResourceStore> = Arc::new(InMemoryResourceStore::new());
    let controller = PipelineController::new(registry(), store, "default");

    controller.apply_pipeline(filter_weigher_resource("p2", vec!["AlwaysKeep", "NeedsMissingTable"])).await.unwrap();

    let pipeline = controller.filter_weigher("p2").await.unwrap();
    assert_eq!(pipeline.filters.len(), 1);
}

#[tokio::test]
async fn critical_init_failure_rejects_whole_pipeline() {
    let store: Arc<dyn ResourceStore> = Arc::new(InMemoryResourceStore::new());
    let controller = PipelineController::new(registry(), store.clone(), "default");

    let mut resource = filter_weigher_resource("p3", vec!["AlwaysKeep"]);
    resource.spec.weighers = vec![novasched_domain::WeigherSpec {
        plugin: PluginSpec { name: "AlwaysCritical".to_string(), options: serde_json::Value::Null, scope: None },
        multiplier: 1.0,
    }];
    controller.apply_pipeline(resource).await.unwrap();

    assert!(controller.filter_weigher("p3").await.is_none());

    let persisted: PipelineResource = TypedStore::new(store.as_ref()).get("pipeline", "default", "p3").await.unwrap().unwrap();
    assert!(!persisted.status.unwrap().ready);
}

#[tokio::test]
async fn knowledge_change_reinstalls_degraded_pipeline_into_ready() {
    let store: Arc<dyn ResourceStore> = Arc::new(InMemoryResourceStore::new());
    let controller = PipelineController::new(registry(), store, "default");

    controller.apply_pipeline(filter_weigher_resource("p4", vec!["NeedsMissingTable"])).await.unwrap();
    assert_eq!(controller.filter_weigher("p4").await.unwrap().filters.len(), 0);

    controller.knowledge().put(novasched_domain::KnowledgeResource {
        api_version: "novasched.io/v1".to_string(),
        kind: "Knowledge".to_string(),
        metadata: novasched_domain::ObjectMeta::named("does-not-exist"),
        spec: novasched_domain::KnowledgeSpec { domain: "compute".to_string(), payload: serde_json::Value::Null },
        status: Some(novasched_domain::KnowledgeStatus { ready: true, reason: None }),
    });
    controller.reinstall_all().await.unwrap();

    assert_eq!(controller.filter_weigher("p4").await.unwrap().filters.len(), 1);
}
