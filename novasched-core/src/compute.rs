use novasched_domain::{MigrationRecord, Vm};

/// Seam to the out-of-scope compute service (OpenStack Nova in production).
/// `novasched-deschedule`'s executor and `novasched-core`'s detector pipeline
/// both depend only on this trait; `novasched-store` or a dedicated adapter
/// crate supplies the live implementation, tests supply an in-memory fake.
#[async_trait::async_trait]
pub trait ComputeApi: Send + Sync {
    async fn get(&self, vm_uuid: &str) -> anyhow::Result<Option<Vm>>;

    /// Kicks off a live migration; returns once the compute service has
    /// accepted the request, not once the migration completes — the
    /// descheduling executor polls `get` afterward to observe completion.
    async fn live_migrate(&self, vm_uuid: &str) -> anyhow::Result<()>;

    /// Oldest-first migration history for a VM, used by the detector
    /// pipeline's cycle breaker.
    async fn list_migrations(&self, vm_uuid: &str) -> anyhow::Result<Vec<MigrationRecord>>;
}
