use novasched_core::{DetectorEntry, FilterEntry, Registry, WeigherEntry};

use crate::context::ComputeCtx;
use crate::{balanced_allocation, capacity_fit, reservation, threshold_detector};

/// Wires every plugin this crate ships into one closed registry for the
/// compute scheduling domain, mirroring
/// `libscheduler::plugins::Registry::default()`'s hand-written
/// name-to-constructor wiring.
pub fn register_compute_plugins(registry: &mut Registry<ComputeCtx>) {
    registry.register_filter(
        "CapacityFit",
        FilterEntry { validate: capacity_fit::validate, construct: capacity_fit::construct },
    );
    registry.register_filter(
        "CommittedResourceGate",
        FilterEntry {
            validate: reservation::validate_committed_resource_gate,
            construct: reservation::construct_committed_resource_gate,
        },
    );
    registry.register_weigher(
        "FailoverPreference",
        WeigherEntry {
            validate: reservation::validate_failover_preference,
            construct: reservation::construct_failover_preference,
        },
    );
    registry.register_weigher(
        "LoadBalancing",
        WeigherEntry { validate: balanced_allocation::validate, construct: balanced_allocation::construct },
    );
    registry.register_detector(
        "ThresholdDetector",
        DetectorEntry { validate: threshold_detector::validate, construct: threshold_detector::construct },
    );
}
