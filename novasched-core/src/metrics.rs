use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, HistogramVec};

lazy_static! {
    /// Wall time of one full filter-weigher pipeline run, labeled by
    /// pipeline name. Global rather than per-instance so repeated pipeline
    /// re-installs (the controller re-initializes on every Knowledge or
    /// Pipeline spec change) don't re-register the same metric and panic.
    pub static ref PIPELINE_DURATION: HistogramVec = register_histogram_vec!(
        "novasched_pipeline_duration_seconds",
        "Duration of one filter-weigher pipeline run",
        &["pipeline"]
    )
    .expect("novasched_pipeline_duration_seconds registers exactly once");

    pub static ref STEP_DURATION: HistogramVec = register_histogram_vec!(
        "novasched_pipeline_step_duration_seconds",
        "Duration of one filter or weigher step",
        &["pipeline", "step"]
    )
    .expect("novasched_pipeline_step_duration_seconds registers exactly once");

    pub static ref CANDIDATES_REMOVED: CounterVec = register_counter_vec!(
        "novasched_pipeline_candidates_removed_total",
        "Candidates a filter step removed from the running set",
        &["pipeline", "step"]
    )
    .expect("novasched_pipeline_candidates_removed_total registers exactly once");

    pub static ref STEP_SKIPPED: CounterVec = register_counter_vec!(
        "novasched_pipeline_step_skipped_total",
        "Steps skipped because their scope didn't match the request",
        &["pipeline", "step"]
    )
    .expect("novasched_pipeline_step_skipped_total registers exactly once");

    pub static ref STEP_ERRORS: CounterVec = register_counter_vec!(
        "novasched_pipeline_step_errors_total",
        "Filter or weigher steps that returned an error at runtime",
        &["pipeline", "step"]
    )
    .expect("novasched_pipeline_step_errors_total registers exactly once");

    pub static ref DETECTOR_RUN_DURATION: HistogramVec = register_histogram_vec!(
        "novasched_detector_pipeline_duration_seconds",
        "Duration of one detector pipeline pass",
        &["pipeline"]
    )
    .expect("novasched_detector_pipeline_duration_seconds registers exactly once");

    pub static ref DETECTIONS_DROPPED_CYCLE: CounterVec = register_counter_vec!(
        "novasched_detections_dropped_cycle_total",
        "Detections dropped because their migration history forms a cycle",
        &["pipeline"]
    )
    .expect("novasched_detections_dropped_cycle_total registers exactly once");

    pub static ref DETECTIONS_DROPPED_CONFLICT: CounterVec = register_counter_vec!(
        "novasched_detections_dropped_origin_conflict_total",
        "Detections dropped because detectors disagreed on the VM's origin host",
        &["pipeline"]
    )
    .expect("novasched_detections_dropped_origin_conflict_total registers exactly once");
}
