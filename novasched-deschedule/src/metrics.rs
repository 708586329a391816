use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, HistogramVec};

lazy_static! {
    pub static ref EXECUTOR_RUN_DURATION: HistogramVec = register_histogram_vec!(
        "novasched_descheduling_executor_duration_seconds",
        "Duration of one Descheduling reconcile, including any poll loop",
        &["outcome"]
    )
    .expect("novasched_descheduling_executor_duration_seconds registers exactly once");

    pub static ref EXECUTOR_OUTCOMES: CounterVec = register_counter_vec!(
        "novasched_descheduling_executor_outcomes_total",
        "Terminal outcomes of the descheduling executor state machine",
        &["outcome"]
    )
    .expect("novasched_descheduling_executor_outcomes_total registers exactly once");

    pub static ref PERIODIC_CREATED: CounterVec = register_counter_vec!(
        "novasched_descheduling_created_total",
        "Descheduling resources created by the periodic worker",
        &["pipeline"]
    )
    .expect("novasched_descheduling_created_total registers exactly once");

    pub static ref TTL_DELETED: CounterVec = register_counter_vec!(
        "novasched_descheduling_ttl_deleted_total",
        "Descheduling resources deleted by the TTL cleanup reconciler",
        &["namespace"]
    )
    .expect("novasched_descheduling_ttl_deleted_total registers exactly once");
}
