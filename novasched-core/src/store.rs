use serde::de::DeserializeOwned;
use serde::Serialize;

/// One change observed on a resource-store prefix watch, mirroring the
/// Put/Delete dispatch `libscheduler::with_xline::run_scheduler_with_xline`
/// and `rks::server::watch_pods` both perform on their xline watch streams.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Put { key: String, value: serde_json::Value },
    Delete { key: String },
}

/// Object-safe core of the resource store: every declarative resource kind
/// (Pipeline, Knowledge, Decision, Descheduling, Reservation, Hypervisor)
/// goes through the same four operations keyed by `(kind, namespace, name)`,
/// mirroring `XlineStore`'s uniform `/registry/<kind>/<name>` key prefixing.
/// Kept generic-free so it can be held as `Arc<dyn ResourceStore>` and swapped
/// for an in-memory fake in tests.
#[async_trait::async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get_raw(&self, kind: &str, namespace: &str, name: &str) -> anyhow::Result<Option<serde_json::Value>>;

    async fn list_raw(&self, kind: &str, namespace: &str) -> anyhow::Result<Vec<serde_json::Value>>;

    async fn put_raw(&self, kind: &str, namespace: &str, name: &str, value: serde_json::Value) -> anyhow::Result<()>;

    async fn delete_raw(&self, kind: &str, namespace: &str, name: &str) -> anyhow::Result<()>;

    /// Streams subsequent changes under `(kind, namespace)` as they happen.
    /// The returned receiver starts empty; the store is responsible for
    /// establishing its watch before returning so no event between the
    /// initial `list_raw` and this call is lost.
    async fn watch_raw(&self, kind: &str, namespace: &str) -> anyhow::Result<tokio::sync::mpsc::UnboundedReceiver<WatchEvent>>;
}

/// Typed sugar over [`ResourceStore`] so call sites work with
/// `PipelineResource`/`KnowledgeResource`/etc. directly instead of raw JSON.
/// A free-function wrapper rather than a second trait, since generic trait
/// methods aren't object-safe and `ResourceStore` itself needs to stay a
/// `dyn`-compatible seam.
pub struct TypedStore<'a> {
    store: &'a dyn ResourceStore,
}

impl<'a> TypedStore<'a> {
    pub fn new(store: &'a dyn ResourceStore) -> Self {
        Self { store }
    }

    pub async fn get<R: DeserializeOwned>(&self, kind: &str, namespace: &str, name: &str) -> anyhow::Result<Option<R>> {
        match self.store.get_raw(kind, namespace, name).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn list<R: DeserializeOwned>(&self, kind: &str, namespace: &str) -> anyhow::Result<Vec<R>> {
        self.store
            .list_raw(kind, namespace)
            .await?
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(anyhow::Error::from))
            .collect()
    }

    pub async fn put<R: Serialize + Sync>(&self, kind: &str, namespace: &str, name: &str, resource: &R) -> anyhow::Result<()> {
        self.store.put_raw(kind, namespace, name, serde_json::to_value(resource)?).await
    }

    pub async fn delete(&self, kind: &str, namespace: &str, name: &str) -> anyhow::Result<()> {
        self.store.delete_raw(kind, namespace, name).await
    }
}
