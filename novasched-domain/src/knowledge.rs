use crate::meta::ObjectMeta;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeStatus {
    pub ready: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSpec {
    pub domain: String,
    /// Raw feature-table payload, produced upstream by the (out of scope)
    /// feature extraction subsystem. Plugins interpret this per table name.
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeResource {
    #[serde(default = "knowledge_api_version")]
    pub api_version: String,
    #[serde(default = "knowledge_kind_str")]
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: KnowledgeSpec,
    #[serde(default)]
    pub status: Option<KnowledgeStatus>,
}

fn knowledge_api_version() -> String {
    "novasched.io/v1".to_string()
}

fn knowledge_kind_str() -> String {
    "Knowledge".to_string()
}

impl KnowledgeResource {
    pub fn is_ready(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.ready)
    }
}
