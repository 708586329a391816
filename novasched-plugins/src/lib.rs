//! Concrete filter, weigher, and detector plugins for the compute
//! scheduling domain, and the registry wiring that makes them
//! constructible by name from a `PluginSpec`.

pub mod balanced_allocation;
pub mod capacity_fit;
pub mod context;
pub mod registry;
pub mod reservation;
pub mod threshold_detector;

pub use capacity_fit::CapacityFit;
pub use context::ComputeCtx;
pub use registry::register_compute_plugins;
pub use reservation::{CommittedResourceGate, FailoverPreference};
pub use threshold_detector::ThresholdDetector;
