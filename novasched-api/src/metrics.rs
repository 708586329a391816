use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, HistogramVec};

lazy_static! {
    pub static ref REQUEST_DURATION: HistogramVec =
        register_histogram_vec!("novasched_api_request_duration_seconds", "HTTP request duration", &["endpoint"]).unwrap();
    pub static ref REQUESTS_TOTAL: CounterVec =
        register_counter_vec!("novasched_api_requests_total", "HTTP requests by endpoint and status code", &["endpoint", "status"]).unwrap();
}
