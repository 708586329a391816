use novasched_core::HypervisorFamilyOf;
use novasched_domain::{hypervisor_family_of, FlavorData};

/// Per-request data the compute-domain plugins read. Built once by
/// `novasched-api` from the incoming `SchedulingRequest` and passed by
/// reference through the whole filter-weigher run — plugins never see the
/// wire request shape directly.
pub struct ComputeCtx {
    pub project_id: String,
    pub instance_uuid: String,
    pub flavor: FlavorData,
    pub reservation: bool,
}

impl HypervisorFamilyOf for ComputeCtx {
    fn hypervisor_family(&self) -> Option<&str> {
        match hypervisor_family_of(&self.flavor) {
            Ok(novasched_domain::HypervisorFamily::Kvm) => Some("kvm"),
            Ok(novasched_domain::HypervisorFamily::Vmware) => Some("vmware"),
            Err(_) => None,
        }
    }
}
