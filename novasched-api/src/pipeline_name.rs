use std::collections::HashSet;

use novasched_domain::{hypervisor_family_of, Error, HypervisorFamily, SchedulingRequest};

/// The extra-spec that distinguishes a HANA-exclusive workload from a
/// general-purpose one. Anything other than `"required"`/`"forbidden"`/absent
/// is rejected rather than guessed at, mirroring the hypervisor-family
/// inference's closed-set treatment.
const HANA_TRAIT: &str = "trait:CUSTOM_HANA_EXCLUSIVE_HOST";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkloadType {
    Hana,
    GeneralPurpose,
}

fn workload_type_of(extra_specs: &std::collections::HashMap<String, String>) -> Result<WorkloadType, Error> {
    match extra_specs.get(HANA_TRAIT).map(|v| v.as_str()) {
        Some("required") => Ok(WorkloadType::Hana),
        None | Some("forbidden") => Ok(WorkloadType::GeneralPurpose),
        Some(other) => Err(Error::UnsupportedConfiguration(format!("unsupported {HANA_TRAIT} value {other:?}"))),
    }
}

/// Deterministic pipeline-name inference: `{kvm|vmware}-{hana|general-purpose}-{load-balancing|bin-packing}[-all-filters-enabled]`.
/// Called only when the request omits an explicit `pipeline` name.
pub fn infer_pipeline_name(request: &SchedulingRequest, experimental_projects: &HashSet<String>) -> Result<String, Error> {
    let flavor = &request.spec.data.flavor.data;
    let family = hypervisor_family_of(flavor)?;
    let workload = workload_type_of(&flavor.extra_specs)?;

    if family == HypervisorFamily::Vmware && request.reservation {
        return Err(Error::UnsupportedConfiguration("reservations not supported on vmware".to_string()));
    }

    let all_filters = request.reservation || experimental_projects.contains(&request.spec.data.project_id);
    let strategy = match workload {
        WorkloadType::Hana => "bin-packing",
        WorkloadType::GeneralPurpose => "load-balancing",
    };
    let workload_str = match workload {
        WorkloadType::Hana => "hana",
        WorkloadType::GeneralPurpose => "general-purpose",
    };

    let mut name = format!("{family}-{workload_str}-{strategy}");
    if all_filters {
        name.push_str("-all-filters-enabled");
    }
    Ok(name)
}
