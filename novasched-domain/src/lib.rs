//! Shared declarative resources, wire types, and error kinds for the
//! novasched placement and descheduling engine.
//!
//! Every resource (`Pipeline`, `Knowledge`, `Decision`, `Descheduling`,
//! `Reservation`, `Hypervisor`) is plain data here — no behavior, no
//! storage. `novasched-store` reads and writes these; `novasched-core` and
//! `novasched-controller` interpret them.

pub mod decision;
pub mod descheduling;
pub mod error;
pub mod hypervisor;
pub mod knowledge;
pub mod meta;
pub mod pipeline;
pub mod request;
pub mod reservation;
pub mod vm;

pub use decision::{DecisionResource, DecisionSpec, DecisionStatus};
pub use descheduling::{DeschedulingResource, DeschedulingSpec, DeschedulingStatus, HostKind, Phase, RefKind};
pub use error::{Error, Result};
pub use hypervisor::{HypervisorResource, HypervisorSpec};
pub use knowledge::{KnowledgeResource, KnowledgeSpec, KnowledgeStatus};
pub use meta::{Condition, ObjectMeta, SchedulingDomain};
pub use pipeline::{PipelineKind, PipelineResource, PipelineSpec, PipelineStatus, PluginSpec, Scope, WeigherSpec};
pub use request::{
    hypervisor_family_of, Flavor, FlavorData, HostRef, HypervisorFamily, ResourceSpec, ResourceSpecData, SchedulingRequest,
    SchedulingResponse, Wrapped,
};
pub use reservation::{ReservationKind, ReservationResource, ReservationSpec, ResourceQuantities};
pub use vm::{MigrationRecord, Vm, VmStatus};
