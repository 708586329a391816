//! Descheduling subsystem: the periodic detector worker that creates
//! `Descheduling` resources (§4.7), the per-resource executor state machine
//! that drives one through to a terminal phase (§4.4), the watch-driven
//! dispatcher that serializes reconciles per resource, and the TTL cleanup
//! sweep (§4.8).

pub mod dispatch;
pub mod executor;
pub mod jitter;
pub mod metrics;
pub mod periodic;
pub mod ttl;

pub use dispatch::Dispatcher;
pub use executor::{reconcile, Outcome};
pub use periodic::run_once;
