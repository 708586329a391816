use novasched_core::ComputeApi;
use novasched_domain::{MigrationRecord, Vm};

/// Minimal JSON-over-HTTP `ComputeApi` adapter for the out-of-scope compute
/// service. The wire shape (three plain endpoints under one base URL) is
/// this crate's own invention, not a real Nova contract — the compute
/// service itself is explicitly out of scope; this exists so the binary has
/// a concrete collaborator to run against instead of only a trait.
pub struct HttpComputeApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpComputeApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }
}

#[async_trait::async_trait]
impl ComputeApi for HttpComputeApi {
    async fn get(&self, vm_uuid: &str) -> anyhow::Result<Option<Vm>> {
        let url = format!("{}/vms/{vm_uuid}", self.base_url);
        let response = self.client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let vm = response.error_for_status()?.json::<Vm>().await?;
        Ok(Some(vm))
    }

    async fn live_migrate(&self, vm_uuid: &str) -> anyhow::Result<()> {
        let url = format!("{}/vms/{vm_uuid}/live-migrate", self.base_url);
        self.client.post(&url).send().await?.error_for_status()?;
        Ok(())
    }

    async fn list_migrations(&self, vm_uuid: &str) -> anyhow::Result<Vec<MigrationRecord>> {
        let url = format!("{}/vms/{vm_uuid}/migrations", self.base_url);
        let migrations = self.client.get(&url).send().await?.error_for_status()?.json::<Vec<MigrationRecord>>().await?;
        Ok(migrations)
    }
}
