//! Drives the router end to end: a real `PipelineController` installs one
//! filter-weigher pipeline, then an HTTP request exercises inference,
//! validation, pipeline execution, and Decision persistence together.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use novasched_api::state::ApiState;
use novasched_core::{ResourceStore, TypedStore};
use novasched_domain::{DecisionResource, HypervisorSpec, KnowledgeResource, KnowledgeSpec, KnowledgeStatus, ObjectMeta, PipelineKind, PipelineResource, PipelineSpec, PluginSpec, ResourceQuantities, SchedulingDomain, SchedulingResponse};
use novasched_controller::PipelineController;
use novasched_plugins::ComputeCtx;
use novasched_store::InMemoryResourceStore;
use tower::ServiceExt;

async fn install_kvm_general_purpose(controller: &PipelineController<ComputeCtx>) {
    let mut by_host = HashMap::new();
    by_host.insert("h1".to_string(), HypervisorSpec { capacity: ResourceQuantities { cpu: 8, memory_mb: 16384 }, allocated: ResourceQuantities { cpu: 0, memory_mb: 0 }, availability_zone: None });
    by_host.insert("h2".to_string(), HypervisorSpec { capacity: ResourceQuantities { cpu: 2, memory_mb: 16384 }, allocated: ResourceQuantities { cpu: 0, memory_mb: 0 }, availability_zone: None });

    controller.knowledge().put(KnowledgeResource {
        api_version: "novasched.io/v1".to_string(),
        kind: "Knowledge".to_string(),
        metadata: ObjectMeta::named("hypervisors"),
        spec: KnowledgeSpec { domain: "compute".to_string(), payload: serde_json::to_value(&by_host).unwrap() },
        status: Some(KnowledgeStatus { ready: true, reason: None }),
    });

    let resource = PipelineResource::new(
        "kvm-general-purpose-load-balancing",
        PipelineSpec {
            kind: PipelineKind::FilterWeigher,
            domain: SchedulingDomain::Compute,
            filters: vec![PluginSpec { name: "CapacityFit".to_string(), options: serde_json::Value::Null, scope: None }],
            weighers: vec![],
            detectors: vec![],
            create_decisions: true,
            ignore_preselection: false,
        },
    );
    controller.apply_pipeline(resource).await.unwrap();
}

fn request_body(hypervisor_type: &str) -> serde_json::Value {
    serde_json::json!({
        "spec": { "data": { "project_id": "project-a", "instance_uuid": "vm-1", "num_instances": 1,
            "flavor": { "data": { "name": "m1.large", "vcpus": 4, "memory_mb": 8192,
                "extra_specs": { "capabilities:hypervisor_type": hypervisor_type } } } } },
        "hosts": [ { "compute_host": "h1" }, { "compute_host": "h2" } ],
        "weights": { "h1": 0.0, "h2": 0.0 },
        "reservation": false
    })
}

#[tokio::test]
async fn schedule_request_infers_pipeline_and_persists_decision() {
    let store: Arc<dyn ResourceStore> = Arc::new(InMemoryResourceStore::new());
    let mut registry = novasched_core::Registry::new();
    novasched_plugins::register_compute_plugins(&mut registry);
    let controller = Arc::new(PipelineController::new(registry, store.clone(), "default"));
    install_kvm_general_purpose(&controller).await;

    let state = Arc::new(ApiState::new(controller, store.clone(), "default"));
    let app = novasched_api::router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/scheduler/nova/external")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&request_body("qemu")).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: SchedulingResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body.hosts, vec!["h1".to_string()]);

    let typed = TypedStore::new(store.as_ref());
    let decisions: Vec<DecisionResource> = typed.list("decision", "default").await.unwrap();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].status.as_ref().unwrap().result, vec!["h1".to_string()]);
}

#[tokio::test]
async fn wrong_method_returns_405() {
    let store: Arc<dyn ResourceStore> = Arc::new(InMemoryResourceStore::new());
    let registry = novasched_core::Registry::new();
    let controller = Arc::new(PipelineController::new(registry, store.clone(), "default"));
    let state = Arc::new(ApiState::new(controller, store, "default"));
    let app = novasched_api::router(state);

    let response = app
        .oneshot(Request::builder().method("GET").uri("/scheduler/nova/external").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn vmware_with_reservation_returns_400() {
    let store: Arc<dyn ResourceStore> = Arc::new(InMemoryResourceStore::new());
    let registry = novasched_core::Registry::new();
    let controller = Arc::new(PipelineController::new(registry, store.clone(), "default"));
    let state = Arc::new(ApiState::new(controller, store, "default"));
    let app = novasched_api::router(state);

    let mut body = request_body("vmware-esxi-7");
    body["reservation"] = serde_json::json!(true);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/scheduler/nova/external")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn body_missing_required_field_returns_400() {
    let store: Arc<dyn ResourceStore> = Arc::new(InMemoryResourceStore::new());
    let registry = novasched_core::Registry::new();
    let controller = Arc::new(PipelineController::new(registry, store.clone(), "default"));
    let state = Arc::new(ApiState::new(controller, store, "default"));
    let app = novasched_api::router(state);

    // Valid JSON, but no "spec" field at all.
    let body = serde_json::json!({
        "hosts": [ { "compute_host": "h1" } ],
        "weights": { "h1": 0.0 },
        "reservation": false
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/scheduler/nova/external")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
