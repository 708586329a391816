use std::collections::HashSet;
use std::sync::Arc;

use novasched_controller::PipelineController;
use novasched_core::ResourceStore;
use novasched_plugins::ComputeCtx;

/// Shared state handed to every request handler. `Arc<ApiState>` is cheap to
/// clone per request, matching axum's `State<S: Clone>` extractor contract.
pub struct ApiState {
    pub controller: Arc<PipelineController<ComputeCtx>>,
    pub store: Arc<dyn ResourceStore>,
    pub namespace: String,
    /// Project IDs that opt into the all-filters-enabled pipeline variant
    /// even without a reservation, per the pipeline-name inference rules.
    pub experimental_projects: HashSet<String>,
}

impl ApiState {
    pub fn new(controller: Arc<PipelineController<ComputeCtx>>, store: Arc<dyn ResourceStore>, namespace: impl Into<String>) -> Self {
        Self { controller, store, namespace: namespace.into(), experimental_projects: HashSet::new() }
    }

    pub fn with_experimental_projects(mut self, projects: HashSet<String>) -> Self {
        self.experimental_projects = projects;
        self
    }
}
