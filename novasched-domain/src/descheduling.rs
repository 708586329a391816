use crate::meta::ObjectMeta;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    VmUuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKind {
    ComputeHostName,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeschedulingSpec {
    pub reference_kind: RefKind,
    pub reference: String,
    #[serde(default)]
    pub previous_host: Option<String>,
    #[serde(default)]
    pub previous_host_kind: Option<HostKind>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase")]
pub enum Phase {
    Queued,
    InProgress,
    Ready { success: bool, reason: Option<String> },
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Ready { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeschedulingStatus {
    pub phase: Phase,
    #[serde(default)]
    pub new_host: Option<String>,
}

impl Default for DeschedulingStatus {
    fn default() -> Self {
        Self {
            phase: Phase::Queued,
            new_host: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeschedulingResource {
    #[serde(default = "descheduling_api_version")]
    pub api_version: String,
    #[serde(default = "descheduling_kind_str")]
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: DeschedulingSpec,
    #[serde(default)]
    pub status: Option<DeschedulingStatus>,
}

fn descheduling_api_version() -> String {
    "novasched.io/v1".to_string()
}

fn descheduling_kind_str() -> String {
    "Descheduling".to_string()
}

impl DeschedulingResource {
    /// Name equals the VM UUID, enforcing "at most one active Descheduling
    /// per VM UUID" by construction: a second creation attempt collides on
    /// the same resource-store key.
    pub fn new(vm_uuid: impl Into<String>, previous_host: Option<String>, reason: String) -> Self {
        let vm_uuid = vm_uuid.into();
        Self {
            api_version: descheduling_api_version(),
            kind: descheduling_kind_str(),
            metadata: ObjectMeta::named(vm_uuid.clone()),
            spec: DeschedulingSpec {
                reference_kind: RefKind::VmUuid,
                reference: vm_uuid,
                previous_host_kind: previous_host.as_ref().map(|_| HostKind::ComputeHostName),
                previous_host,
                reason,
            },
            status: Some(DeschedulingStatus::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_equals_vm_uuid() {
        let d = DeschedulingResource::new("vm-123", Some("h1".to_string()), "high steal".into());
        assert_eq!(d.metadata.name, "vm-123");
        assert_eq!(d.spec.reference, "vm-123");
        assert_eq!(d.spec.previous_host.as_deref(), Some("h1"));
        assert_eq!(d.spec.previous_host_kind, Some(HostKind::ComputeHostName));
        assert!(!d.status.unwrap().phase.is_terminal());
    }

    #[test]
    fn queued_is_not_terminal_but_ready_is() {
        assert!(!Phase::Queued.is_terminal());
        assert!(!Phase::InProgress.is_terminal());
        assert!(Phase::Ready { success: true, reason: None }.is_terminal());
    }
}
