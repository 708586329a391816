use std::collections::HashMap;
use std::sync::RwLock;

use novasched_domain::KnowledgeResource;

/// Read-only access to the current Knowledge snapshot, handed to plugins at
/// `Init`. Knowledge is immutable per revision: a plugin that reads it at
/// construction time and keeps the clone never sees a later update without
/// going through `Init` again (the controller re-initializes the whole
/// pipeline on a Knowledge change, per the reconciliation model).
pub trait KnowledgeStore: Send + Sync {
    fn get(&self, name: &str) -> Option<KnowledgeResource>;
}

/// The concrete, in-process snapshot cache the controller populates from
/// `ResourceStore` watch events and hands to plugins via [`InitContext`]. No
/// xline/etcd dependency here — `novasched-store`'s watch loop is what keeps
/// this filled.
///
/// [`InitContext`]: crate::plugin::InitContext
#[derive(Default)]
pub struct SnapshotKnowledgeStore {
    snapshot: RwLock<HashMap<String, KnowledgeResource>>,
}

impl SnapshotKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, resource: KnowledgeResource) {
        self.snapshot.write().expect("knowledge snapshot lock poisoned").insert(resource.metadata.name.clone(), resource);
    }

    pub fn remove(&self, name: &str) {
        self.snapshot.write().expect("knowledge snapshot lock poisoned").remove(name);
    }
}

impl KnowledgeStore for SnapshotKnowledgeStore {
    fn get(&self, name: &str) -> Option<KnowledgeResource> {
        self.snapshot.read().expect("knowledge snapshot lock poisoned").get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use novasched_domain::{KnowledgeSpec, ObjectMeta};

    fn sample(name: &str) -> KnowledgeResource {
        KnowledgeResource {
            api_version: "novasched.io/v1".to_string(),
            kind: "Knowledge".to_string(),
            metadata: ObjectMeta::named(name),
            spec: KnowledgeSpec { domain: "compute".to_string(), payload: serde_json::Value::Null },
            status: None,
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let store = SnapshotKnowledgeStore::new();
        store.put(sample("host-traits"));
        assert!(store.get("host-traits").is_some());
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn remove_clears_entry() {
        let store = SnapshotKnowledgeStore::new();
        store.put(sample("host-traits"));
        store.remove("host-traits");
        assert!(store.get("host-traits").is_none());
    }
}
