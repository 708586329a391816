use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kubernetes-style object metadata shared by every declarative resource.
///
/// Mirrors the `ObjectMeta` envelope the corpus uses for its own declarative
/// resources (pods, nodes): name is unique within a kind+namespace, and
/// labels/annotations are free-form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(default = "Utc::now")]
    pub creation_timestamp: DateTime<Utc>,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl ObjectMeta {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: default_namespace(),
            labels: HashMap::new(),
            annotations: HashMap::new(),
            creation_timestamp: Utc::now(),
        }
    }
}

/// A status condition, following the `type/status/reason/message` shape used
/// throughout the declarative resource set (Decision's `Ready`, Descheduling's
/// terminal phases).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: bool,
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default = "Utc::now")]
    pub last_transition: DateTime<Utc>,
}

impl Condition {
    pub fn ready(status: bool, reason: impl Into<String>) -> Self {
        Self {
            kind: "Ready".to_string(),
            status,
            reason: reason.into(),
            message: String::new(),
            last_transition: Utc::now(),
        }
    }
}

/// Identifies which service a pipeline or request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulingDomain {
    Compute,
    BlockStorage,
}

impl std::fmt::Display for SchedulingDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulingDomain::Compute => write!(f, "compute"),
            SchedulingDomain::BlockStorage => write!(f, "block-storage"),
        }
    }
}
