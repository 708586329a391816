use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use novasched_core::TypedStore;
use novasched_domain::{Condition, DecisionResource, DecisionSpec, DecisionStatus, Error, SchedulingDomain, SchedulingRequest, SchedulingResponse};
use novasched_plugins::ComputeCtx;

use crate::extract::ValidatedJson;
use crate::metrics;
use crate::pipeline_name::infer_pipeline_name;
use crate::state::ApiState;
use crate::validate::validate_request;

const ENDPOINT: &str = "/scheduler/nova/external";
const DECISION_KIND: &str = "decision";

pub async fn schedule(State(state): State<Arc<ApiState>>, ValidatedJson(request): ValidatedJson<SchedulingRequest>) -> impl IntoResponse {
    let start = Instant::now();
    let (status, body) = handle(&state, request).await;
    metrics::REQUEST_DURATION.with_label_values(&[ENDPOINT]).observe(start.elapsed().as_secs_f64());
    metrics::REQUESTS_TOTAL.with_label_values(&[ENDPOINT, &status.as_u16().to_string()]).inc();
    (status, body)
}

async fn handle(state: &ApiState, request: SchedulingRequest) -> (StatusCode, Json<serde_json::Value>) {
    if let Err(err) = validate_request(&request) {
        return error_response(&err);
    }

    let pipeline_name = match &request.pipeline {
        Some(name) => name.clone(),
        None => match infer_pipeline_name(&request, &state.experimental_projects) {
            Ok(name) => name,
            Err(err) => return error_response(&err),
        },
    };

    let pipeline = match state.controller.filter_weigher(&pipeline_name).await {
        Some(pipeline) => pipeline,
        None => {
            log::error!("pipeline {pipeline_name} not found or not ready");
            return error_response(&Error::TransientNotReady);
        }
    };

    let decision_name = DecisionResource::generate_name(&uuid::Uuid::new_v4().to_string());
    let raw_request = serde_json::to_value(&request).unwrap_or(serde_json::Value::Null);
    let mut decision = DecisionResource::new(
        decision_name.clone(),
        DecisionSpec {
            domain: SchedulingDomain::Compute,
            pipeline_ref: pipeline_name,
            resource_id: request.spec.data.instance_uuid.clone(),
            raw_request,
        },
    );

    let typed = TypedStore::new(state.store.as_ref());
    if pipeline.create_decisions {
        if let Err(err) = typed.put(DECISION_KIND, &state.namespace, &decision_name, &decision).await {
            log::error!("failed to persist decision {decision_name} before execution: {err:#}");
            return error_response(&Error::ExternalApi(err));
        }
    }

    let ctx = ComputeCtx {
        project_id: request.spec.data.project_id.clone(),
        instance_uuid: request.spec.data.instance_uuid.clone(),
        flavor: request.spec.data.flavor.data.clone(),
        reservation: request.reservation,
    };
    let candidates: Vec<String> = request.hosts.iter().map(|h| h.compute_host.clone()).collect();
    let host_traits = host_traits_from_knowledge(state);

    let outcome = pipeline.run(&ctx, candidates.clone(), request.weights.clone(), &host_traits, None).await;

    let original_hosts: std::collections::HashSet<&str> = candidates.iter().map(String::as_str).collect();
    let hosts: Vec<String> = outcome.hosts.into_iter().filter(|h| original_hosts.contains(h.as_str())).collect();

    let condition = if hosts.is_empty() { Condition::ready(false, "no candidates") } else { Condition::ready(true, "scheduled") };
    decision.status = Some(DecisionStatus {
        result: hosts.clone(),
        conditions: vec![condition],
        step_errors: outcome.step_errors,
    });
    if let Err(err) = typed.put(DECISION_KIND, &state.namespace, &decision_name, &decision).await {
        log::error!("failed to persist decision {decision_name} after execution: {err:#}");
    }

    (StatusCode::OK, Json(serde_json::to_value(SchedulingResponse::new(hosts)).unwrap()))
}

fn host_traits_from_knowledge(state: &ApiState) -> HashMap<String, Vec<String>> {
    match state.controller.knowledge().get("host-traits") {
        Some(resource) => serde_json::from_value(resource.spec.payload).unwrap_or_else(|err| {
            log::warn!("malformed host-traits knowledge payload, ignoring: {err}");
            HashMap::new()
        }),
        None => HashMap::new(),
    }
}

fn error_response(err: &Error) -> (StatusCode, Json<serde_json::Value>) {
    let status = match err {
        Error::MalformedInput(_) | Error::UnsupportedConfiguration(_) => StatusCode::BAD_REQUEST,
        Error::TransientNotReady => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": err.to_string() })))
}
