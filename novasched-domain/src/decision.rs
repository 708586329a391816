use crate::meta::{Condition, ObjectMeta, SchedulingDomain};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionSpec {
    pub domain: SchedulingDomain,
    pub pipeline_ref: String,
    /// The VM UUID the decision was computed for.
    pub resource_id: String,
    pub raw_request: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionStatus {
    #[serde(default)]
    pub result: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Per-step errors recorded as non-fatal while other steps continued.
    #[serde(default)]
    pub step_errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionResource {
    #[serde(default = "decision_api_version")]
    pub api_version: String,
    #[serde(default = "decision_kind_str")]
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: DecisionSpec,
    #[serde(default)]
    pub status: Option<DecisionStatus>,
}

fn decision_api_version() -> String {
    "novasched.io/v1".to_string()
}

fn decision_kind_str() -> String {
    "Decision".to_string()
}

impl DecisionResource {
    /// Server-generated name, as required: prefix `nova-` followed by a
    /// caller-supplied unique suffix (a UUID in production).
    pub fn generate_name(suffix: &str) -> String {
        format!("nova-{suffix}")
    }

    pub fn new(name: impl Into<String>, spec: DecisionSpec) -> Self {
        Self {
            api_version: decision_api_version(),
            kind: decision_kind_str(),
            metadata: ObjectMeta::named(name),
            spec,
            status: None,
        }
    }
}
