use std::collections::HashMap;
use std::sync::Mutex;

use novasched_core::store::{ResourceStore, WatchEvent};
use tokio::sync::mpsc;

/// Plain in-process `ResourceStore`, used the way the teacher's own test
/// suite constructs a `Cache`/`Scheduler` directly rather than standing up a
/// live xline server for most cases (reserving a real backend for a handful
/// of `#[ignore]`d integration tests). Watchers are fed directly from
/// `put_raw`/`delete_raw` rather than a real watch stream, so tests don't pay
/// for any network round trip.
#[derive(Default)]
pub struct InMemoryResourceStore {
    items: Mutex<HashMap<String, serde_json::Value>>,
    watchers: Mutex<Vec<(String, mpsc::UnboundedSender<WatchEvent>)>>,
}

impl InMemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(kind: &str, namespace: &str, name: &str) -> String {
        format!("/registry/{kind}/{namespace}/{name}")
    }

    fn prefix(kind: &str, namespace: &str) -> String {
        format!("/registry/{kind}/{namespace}/")
    }

    fn notify(&self, prefix: &str, event: WatchEvent) {
        let mut watchers = self.watchers.lock().expect("watcher list lock poisoned");
        watchers.retain(|(watched_prefix, tx)| {
            if watched_prefix != prefix {
                return true;
            }
            tx.send(event.clone()).is_ok()
        });
    }
}

#[async_trait::async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn get_raw(&self, kind: &str, namespace: &str, name: &str) -> anyhow::Result<Option<serde_json::Value>> {
        let key = Self::key(kind, namespace, name);
        Ok(self.items.lock().expect("store lock poisoned").get(&key).cloned())
    }

    async fn list_raw(&self, kind: &str, namespace: &str) -> anyhow::Result<Vec<serde_json::Value>> {
        let prefix = Self::prefix(kind, namespace);
        Ok(self
            .items
            .lock()
            .expect("store lock poisoned")
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn put_raw(&self, kind: &str, namespace: &str, name: &str, value: serde_json::Value) -> anyhow::Result<()> {
        let key = Self::key(kind, namespace, name);
        self.items.lock().expect("store lock poisoned").insert(key.clone(), value.clone());
        self.notify(&Self::prefix(kind, namespace), WatchEvent::Put { key, value });
        Ok(())
    }

    async fn delete_raw(&self, kind: &str, namespace: &str, name: &str) -> anyhow::Result<()> {
        let key = Self::key(kind, namespace, name);
        self.items.lock().expect("store lock poisoned").remove(&key);
        self.notify(&Self::prefix(kind, namespace), WatchEvent::Delete { key });
        Ok(())
    }

    async fn watch_raw(&self, kind: &str, namespace: &str) -> anyhow::Result<mpsc::UnboundedReceiver<WatchEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.watchers.lock().expect("watcher list lock poisoned").push((Self::prefix(kind, namespace), tx));
        Ok(rx)
    }
}
