//! Scheduling HTTP API: `POST /scheduler/nova/external`. Validates the
//! incoming request, infers a pipeline name when none is given, delegates to
//! the pipeline controller, and serializes the ordered host list.

pub mod extract;
pub mod handler;
pub mod metrics;
pub mod pipeline_name;
pub mod state;
pub mod validate;

use std::sync::Arc;

use axum::routing::post;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use state::ApiState;

/// Builds the router; the caller owns binding and serving, the way
/// `aerolithdb_api::RESTAPIv1::start` hands a `TcpListener` to `axum::serve`
/// rather than this crate owning the listen loop itself.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/scheduler/nova/external", post(handler::schedule))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
