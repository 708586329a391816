use crate::meta::{ObjectMeta, SchedulingDomain};
use serde::{Deserialize, Serialize};

/// A named, typed-option reference to one configured plugin. `options` is
/// validated by the plugin's own `Init`/`Validate` hooks, not here — the
/// domain model only carries the raw YAML/JSON the operator wrote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSpec {
    pub name: String,
    #[serde(default)]
    pub options: serde_json::Value,
    /// Gates whether the plugin runs for a given request; `None` means
    /// always in scope.
    #[serde(default)]
    pub scope: Option<Scope>,
}

/// A weigher additionally carries a multiplier applied to its returned
/// deltas before they're summed into the running weight map. Defaults to
/// 1.0 (deltas pass through unchanged), matching the spec's "weigher
/// deltas are additive" semantics while still letting an operator tune one
/// weigher's influence relative to another — mirroring the corpus's
/// `PluginInfo::weight` on score plugins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeigherSpec {
    #[serde(flatten)]
    pub plugin: PluginSpec,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_multiplier() -> f64 {
    1.0
}

/// The closed set of scope predicates attested for this system: hypervisor
/// family membership and host-trait infix matching. Inventing additional
/// predicates beyond what's observed is explicitly out of scope (see
/// spec.md Open Questions).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    /// `hypervisor_type` of the request's flavor must be one of `values`.
    HypervisorTypeIn { values: Vec<String> },
    /// Candidate host must carry a trait whose name contains one of
    /// `infixes` (case-sensitive substring match), e.g. the corpus's
    /// `host_capabilities.any_of_trait_infixes`.
    AnyOfTraitInfixes { infixes: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineKind {
    FilterWeigher,
    Detector,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub kind: PipelineKind,
    pub domain: SchedulingDomain,
    #[serde(default)]
    pub filters: Vec<PluginSpec>,
    #[serde(default)]
    pub weighers: Vec<WeigherSpec>,
    #[serde(default)]
    pub detectors: Vec<PluginSpec>,
    #[serde(default)]
    pub create_decisions: bool,
    #[serde(default)]
    pub ignore_preselection: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub ready: bool,
    #[serde(default)]
    pub reason: Option<String>,
    /// Names of steps that installed in a non-critical-disabled state.
    #[serde(default)]
    pub degraded_steps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResource {
    #[serde(default = "pipeline_api_version")]
    pub api_version: String,
    #[serde(default = "pipeline_kind_str")]
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: PipelineSpec,
    #[serde(default)]
    pub status: Option<PipelineStatus>,
}

fn pipeline_api_version() -> String {
    "novasched.io/v1".to_string()
}

fn pipeline_kind_str() -> String {
    "Pipeline".to_string()
}

impl PipelineResource {
    pub fn new(name: impl Into<String>, spec: PipelineSpec) -> Self {
        Self {
            api_version: pipeline_api_version(),
            kind: pipeline_kind_str(),
            metadata: ObjectMeta::named(name),
            spec,
            status: None,
        }
    }
}
