use std::sync::Arc;

use etcd_client::{Client, EventType, GetOptions, PutOptions, WatchOptions};
use novasched_core::store::{ResourceStore, WatchEvent};
use tokio::sync::{mpsc, RwLock};

/// `ResourceStore` backed by xline/etcd-client, keying every declarative
/// resource under `/registry/<kind>/<namespace>/<name>` the same way
/// `XlineStore` keys pods under `/registry/pods/<name>` and nodes under
/// `/registry/nodes/<name>`.
#[derive(Clone)]
pub struct XlineResourceStore {
    client: Arc<RwLock<Client>>,
}

impl XlineResourceStore {
    pub async fn connect(endpoints: &[String]) -> anyhow::Result<Self> {
        let endpoints: Vec<&str> = endpoints.iter().map(String::as_str).collect();
        let client = Client::connect(endpoints, None).await?;
        Ok(Self { client: Arc::new(RwLock::new(client)) })
    }

    fn key(kind: &str, namespace: &str, name: &str) -> String {
        format!("/registry/{kind}/{namespace}/{name}")
    }

    fn prefix(kind: &str, namespace: &str) -> String {
        format!("/registry/{kind}/{namespace}/")
    }
}

#[async_trait::async_trait]
impl ResourceStore for XlineResourceStore {
    async fn get_raw(&self, kind: &str, namespace: &str, name: &str) -> anyhow::Result<Option<serde_json::Value>> {
        let key = Self::key(kind, namespace, name);
        let mut client = self.client.write().await;
        let resp = client.get(key, None).await?;
        match resp.kvs().first() {
            Some(kv) => Ok(Some(serde_json::from_slice(kv.value())?)),
            None => Ok(None),
        }
    }

    async fn list_raw(&self, kind: &str, namespace: &str) -> anyhow::Result<Vec<serde_json::Value>> {
        let prefix = Self::prefix(kind, namespace);
        let mut client = self.client.write().await;
        let resp = client.get(prefix, Some(GetOptions::new().with_prefix())).await?;
        resp.kvs()
            .iter()
            .map(|kv| serde_json::from_slice(kv.value()).map_err(anyhow::Error::from))
            .collect()
    }

    async fn put_raw(&self, kind: &str, namespace: &str, name: &str, value: serde_json::Value) -> anyhow::Result<()> {
        let key = Self::key(kind, namespace, name);
        let bytes = serde_json::to_vec(&value)?;
        let mut client = self.client.write().await;
        client.put(key, bytes, Some(PutOptions::new())).await?;
        Ok(())
    }

    async fn delete_raw(&self, kind: &str, namespace: &str, name: &str) -> anyhow::Result<()> {
        let key = Self::key(kind, namespace, name);
        let mut client = self.client.write().await;
        client.delete(key, None).await?;
        Ok(())
    }

    async fn watch_raw(&self, kind: &str, namespace: &str) -> anyhow::Result<mpsc::UnboundedReceiver<WatchEvent>> {
        let prefix = Self::prefix(kind, namespace);
        let opts = WatchOptions::new().with_prefix().with_prev_key();
        let (_watcher, mut stream) = {
            let mut client = self.client.write().await;
            client.watch(prefix, Some(opts)).await?
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let watch_label = format!("{kind}/{namespace}");
        tokio::spawn(async move {
            loop {
                match stream.message().await {
                    Ok(Some(resp)) => {
                        for event in resp.events() {
                            let Some(kv) = event.kv() else { continue };
                            let key = String::from_utf8_lossy(kv.key()).to_string();
                            let sent = match event.event_type() {
                                EventType::Put => match serde_json::from_slice(kv.value()) {
                                    Ok(value) => tx.send(WatchEvent::Put { key, value }),
                                    Err(err) => {
                                        log::error!("xline watch: could not parse value at {key}: {err:#}");
                                        continue;
                                    }
                                },
                                EventType::Delete => tx.send(WatchEvent::Delete { key }),
                            };
                            if sent.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(None) => return,
                    Err(err) => {
                        log::error!("xline watch on {watch_label} ended with error: {err:#}");
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}
