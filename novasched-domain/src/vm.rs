use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmStatus {
    Active,
    Error,
    /// Any of the in-flight states a migration passes through
    /// (`Migrating`, `Resize`, `Verify resize`, …) — the executor keeps
    /// polling while the VM is in this state.
    Transitional,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vm {
    pub id: String,
    pub status: VmStatus,
    pub compute_host: String,
}

/// One hop in a VM's migration history, ordered oldest-first by the
/// compute API collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub source_host: String,
    pub dest_host: String,
}
