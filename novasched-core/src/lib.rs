//! Plugin contract, registry, and the two pipeline engines (filter-weigher
//! placement, detector descheduling) that `novasched-controller` installs
//! and `novasched-api`/`novasched-deschedule` drive.
//!
//! Everything here is generic over the per-request context type a domain's
//! plugins read (`Ctx`); `novasched-plugins` supplies the concrete compute
//! context and the plugins built against it.

pub mod compute;
pub mod detector;
pub mod filter_weigher;
pub mod knowledge_store;
pub mod metrics;
pub mod plugin;
pub mod registry;
pub mod scope;
pub mod store;

pub use compute::ComputeApi;
pub use detector::{DetectorPipeline, DetectorRunOutcome, DetectorStep};
pub use filter_weigher::{CandidateGatherer, FilterStep, FilterWeigherPipeline, RunOutcome, WeigherStep};
pub use knowledge_store::{KnowledgeStore, SnapshotKnowledgeStore};
pub use plugin::{Detection, Detector, Filter, InitContext, InitError, Weigher};
pub use registry::{DetectorEntry, FilterEntry, Registry, WeigherEntry};
pub use scope::{evaluate_scope, HypervisorFamilyOf, ScopeInput};
pub use store::{ResourceStore, TypedStore, WatchEvent};
