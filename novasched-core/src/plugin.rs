use std::collections::HashMap;

use novasched_domain::PluginSpec;

use crate::knowledge_store::KnowledgeStore;

/// Everything a plugin's constructor gets to look at besides its own
/// `options`. Bound once at pipeline install time and handed to every
/// plugin's constructor; plugins keep only what they read out of it, never
/// the context itself (so a later snapshot swap can't reach back into an
/// already-built plugin).
pub struct InitContext<'a> {
    pub knowledge: &'a dyn KnowledgeStore,
}

/// Distinguishes a plugin construction failure that must reject the whole
/// pipeline from one that only disables that one step. The controller
/// (`novasched-controller`) branches on this variant, not on the error
/// message.
#[derive(Debug, Clone)]
pub enum InitError {
    Critical(String),
    NonCritical(String),
}

impl std::fmt::Display for InitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitError::Critical(reason) => write!(f, "critical: {reason}"),
            InitError::NonCritical(reason) => write!(f, "non-critical: {reason}"),
        }
    }
}

impl std::error::Error for InitError {}

/// One detected "this VM should move" candidate. `reason` is free text for
/// operators; `current_host` is the host the detector observed the VM on at
/// detection time, used by the combine step to spot origin-host conflicts.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub vm_uuid: String,
    pub current_host: String,
    pub reason: String,
}

/// Narrows a candidate set down. A filter never enlarges it and never
/// mutates a candidate's identity — only membership. `reasons` is an
/// out-parameter the filter may populate with a disqualification message
/// per host it drops, purely for operator-facing diagnostics.
pub trait Filter<Ctx>: Send + Sync {
    fn name(&self) -> &str;

    fn filter(
        &self,
        ctx: &Ctx,
        candidates: &[String],
        reasons: &mut HashMap<String, String>,
    ) -> anyhow::Result<Vec<String>>;
}

/// Produces an additive delta per surviving candidate. A well-behaved
/// weigher returns one entry per candidate; the pipeline treats a missing
/// entry as `0.0` and a non-finite delta as `0.0` rather than propagating
/// `NaN`/`inf` into the running total.
pub trait Weigher<Ctx>: Send + Sync {
    fn name(&self) -> &str;

    fn weigh(&self, ctx: &Ctx, candidates: &[String]) -> anyhow::Result<HashMap<String, f64>>;
}

/// Runs one fleet-wide descheduling pass. Detectors are stateless across
/// calls except for whatever knowledge snapshot they captured at `Init`, so
/// `run` takes no request context — it's invoked once per pipeline tick,
/// not once per placement request.
pub trait Detector: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self) -> anyhow::Result<Vec<Detection>>;
}

pub type FilterValidateFn = fn(&PluginSpec) -> Result<(), String>;
pub type WeigherValidateFn = FilterValidateFn;
pub type DetectorValidateFn = FilterValidateFn;
