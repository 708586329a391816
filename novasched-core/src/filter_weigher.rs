use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use novasched_domain::Scope;

use crate::metrics;
use crate::plugin::{Filter, Weigher};
use crate::scope::{evaluate_scope, HypervisorFamilyOf, ScopeInput};

/// External collaborator that replaces the caller-supplied candidate set
/// entirely when `ignore_preselection` is set, per step 1 of the
/// filter-weigher algorithm. Kept as a trait (not baked into the pipeline)
/// since what "all schedulable hosts" means is domain-specific.
#[async_trait::async_trait]
pub trait CandidateGatherer<Ctx>: Send + Sync {
    async fn gather(&self, ctx: &Ctx) -> anyhow::Result<Vec<String>>;
}

pub struct FilterStep<Ctx> {
    pub name: String,
    pub scope: Option<Scope>,
    pub plugin: Arc<dyn Filter<Ctx>>,
}

pub struct WeigherStep<Ctx> {
    pub name: String,
    pub scope: Option<Scope>,
    pub multiplier: f64,
    pub plugin: Arc<dyn Weigher<Ctx>>,
}

/// Result of one pipeline run: the surviving candidates in final order
/// (highest weight first, ties broken by the order they arrived in),
/// per-host disqualification reasons collected from filter steps, and any
/// step-level errors that were logged and skipped rather than aborting the
/// whole run.
pub struct RunOutcome {
    pub hosts: Vec<String>,
    pub reasons: HashMap<String, String>,
    pub step_errors: Vec<String>,
}

/// A compiled, ready-to-run filter-weigher pipeline: an ordered list of
/// filter steps, then an ordered list of weigher steps, each optionally
/// scope-gated. Built once by the controller at install time from a
/// `PipelineSpec` and the plugin registry; immutable afterward — a spec
/// change produces a new `FilterWeigherPipeline`, never a mutation of this
/// one, matching the pipeline controller's atomic-swap model.
///
/// Generic over `Ctx`, the per-request data plugins read (flavor, project,
/// reservation flag, …), so the same engine serves every scheduling domain
/// without change — only the concrete `Ctx` type and the plugins
/// instantiated against it differ between domains.
pub struct FilterWeigherPipeline<Ctx> {
    pub name: String,
    pub ignore_preselection: bool,
    /// Mirrors `PipelineSpec::create_decisions`: whether the caller should
    /// persist the Decision before executing (true) or only on success
    /// (false). The pipeline itself never touches the resource store —
    /// this just carries the declarative flag through to the HTTP layer.
    pub create_decisions: bool,
    pub filters: Vec<FilterStep<Ctx>>,
    pub weighers: Vec<WeigherStep<Ctx>>,
}

impl<Ctx: HypervisorFamilyOf> FilterWeigherPipeline<Ctx> {
    pub async fn run(
        &self,
        ctx: &Ctx,
        candidates: Vec<String>,
        weights: HashMap<String, f64>,
        host_traits: &HashMap<String, Vec<String>>,
        gatherer: Option<&(dyn CandidateGatherer<Ctx> + Sync)>,
    ) -> RunOutcome {
        let _total_timer = metrics::PIPELINE_DURATION.with_label_values(&[&self.name]).start_timer();

        let (mut candidates, mut weights) = (candidates, weights);
        if self.ignore_preselection {
            if let Some(gatherer) = gatherer {
                match gatherer.gather(ctx).await {
                    Ok(gathered) => {
                        weights = gathered.iter().map(|h| (h.clone(), 0.0)).collect();
                        candidates = gathered;
                    }
                    Err(err) => {
                        log::error!("pipeline {} candidate gatherer failed, keeping caller-supplied hosts: {err:#}", self.name);
                    }
                }
            }
        }

        let scope_input = ScopeInput { ctx, host_traits };
        let mut reasons = HashMap::new();
        let mut step_errors = Vec::new();

        for step in &self.filters {
            if candidates.is_empty() {
                break;
            }
            if let Some(scope) = &step.scope {
                if !evaluate_scope(scope, &scope_input) {
                    metrics::STEP_SKIPPED.with_label_values(&[&self.name, &step.name]).inc();
                    continue;
                }
            }
            let _step_timer = metrics::STEP_DURATION.with_label_values(&[&self.name, &step.name]).start_timer();
            match step.plugin.filter(ctx, &candidates, &mut reasons) {
                Ok(surviving) => {
                    let removed = candidates.len().saturating_sub(surviving.len());
                    if removed > 0 {
                        metrics::CANDIDATES_REMOVED.with_label_values(&[&self.name, &step.name]).inc_by(removed as f64);
                    }
                    candidates = surviving;
                }
                Err(err) => {
                    log::warn!("pipeline {} filter {} failed, skipping step: {err:#}", self.name, step.name);
                    metrics::STEP_ERRORS.with_label_values(&[&self.name, &step.name]).inc();
                    step_errors.push(format!("{}: {err:#}", step.name));
                }
            }
        }

        if candidates.is_empty() {
            return RunOutcome { hosts: Vec::new(), reasons, step_errors };
        }

        for step in &self.weighers {
            if let Some(scope) = &step.scope {
                if !evaluate_scope(scope, &scope_input) {
                    metrics::STEP_SKIPPED.with_label_values(&[&self.name, &step.name]).inc();
                    continue;
                }
            }
            let _step_timer = metrics::STEP_DURATION.with_label_values(&[&self.name, &step.name]).start_timer();
            match step.plugin.weigh(ctx, &candidates) {
                Ok(deltas) => {
                    for host in &candidates {
                        let raw = deltas.get(host).copied().unwrap_or(0.0);
                        let delta = if raw.is_finite() {
                            raw * step.multiplier
                        } else {
                            log::warn!("pipeline {} weigher {} returned non-finite delta for {host}, treating as 0", self.name, step.name);
                            0.0
                        };
                        *weights.entry(host.clone()).or_insert(0.0) += delta;
                    }
                }
                Err(err) => {
                    log::warn!("pipeline {} weigher {} failed, skipping step: {err:#}", self.name, step.name);
                    metrics::STEP_ERRORS.with_label_values(&[&self.name, &step.name]).inc();
                    step_errors.push(format!("{}: {err:#}", step.name));
                }
            }
        }

        let order: HashMap<&str, usize> = candidates.iter().enumerate().map(|(i, h)| (h.as_str(), i)).collect();
        candidates.sort_by(|a, b| {
            let wa = weights.get(a).copied().unwrap_or(0.0);
            let wb = weights.get(b).copied().unwrap_or(0.0);
            wb.partial_cmp(&wa).unwrap_or(Ordering::Equal).then_with(|| order[a.as_str()].cmp(&order[b.as_str()]))
        });

        RunOutcome { hosts: candidates, reasons, step_errors }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ctx;
    impl HypervisorFamilyOf for Ctx {
        fn hypervisor_family(&self) -> Option<&str> {
            None
        }
    }

    struct DropHost(String);
    impl Filter<Ctx> for DropHost {
        fn name(&self) -> &str {
            "drop-host"
        }
        fn filter(&self, _ctx: &Ctx, candidates: &[String], reasons: &mut HashMap<String, String>) -> anyhow::Result<Vec<String>> {
            reasons.insert(self.0.clone(), "dropped by test filter".to_string());
            Ok(candidates.iter().filter(|h| **h != self.0).cloned().collect())
        }
    }

    struct FixedWeigher(HashMap<String, f64>);
    impl Weigher<Ctx> for FixedWeigher {
        fn name(&self) -> &str {
            "fixed"
        }
        fn weigh(&self, _ctx: &Ctx, _candidates: &[String]) -> anyhow::Result<HashMap<String, f64>> {
            Ok(self.0.clone())
        }
    }

    struct NanWeigher;
    impl Weigher<Ctx> for NanWeigher {
        fn name(&self) -> &str {
            "nan"
        }
        fn weigh(&self, _ctx: &Ctx, candidates: &[String]) -> anyhow::Result<HashMap<String, f64>> {
            Ok(candidates.iter().map(|h| (h.clone(), f64::NAN)).collect())
        }
    }

    fn hosts(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn empty_pipeline_sorts_by_seeded_weight_stable_on_ties() {
        let pipeline: FilterWeigherPipeline<Ctx> = FilterWeigherPipeline {
            name: "empty".to_string(),
            ignore_preselection: false,
            create_decisions: false,
            filters: vec![],
            weighers: vec![],
        };
        let candidates = hosts(&["h1", "h2", "h3"]);
        let mut weights = HashMap::new();
        weights.insert("h1".to_string(), 1.0);
        weights.insert("h2".to_string(), 2.0);
        weights.insert("h3".to_string(), 1.0);
        let out = pipeline.run(&Ctx, candidates, weights, &HashMap::new(), None).await;
        assert_eq!(out.hosts, vec!["h2", "h1", "h3"]);
    }

    #[tokio::test]
    async fn filter_removes_candidate_and_records_reason() {
        let pipeline: FilterWeigherPipeline<Ctx> = FilterWeigherPipeline {
            name: "drop".to_string(),
            ignore_preselection: false,
            create_decisions: false,
            filters: vec![FilterStep {
                name: "drop-host".to_string(),
                scope: None,
                plugin: Arc::new(DropHost("h2".to_string())),
            }],
            weighers: vec![],
        };
        let out = pipeline.run(&Ctx, hosts(&["h1", "h2", "h3"]), HashMap::new(), &HashMap::new(), None).await;
        assert_eq!(out.hosts, vec!["h1", "h3"]);
        assert_eq!(out.reasons.get("h2").unwrap(), "dropped by test filter");
    }

    #[tokio::test]
    async fn all_candidates_filtered_short_circuits_before_weighers() {
        let pipeline: FilterWeigherPipeline<Ctx> = FilterWeigherPipeline {
            name: "drop-all".to_string(),
            ignore_preselection: false,
            create_decisions: false,
            filters: vec![
                FilterStep { name: "drop-h1".to_string(), scope: None, plugin: Arc::new(DropHost("h1".to_string())) },
                FilterStep { name: "drop-h2".to_string(), scope: None, plugin: Arc::new(DropHost("h2".to_string())) },
            ],
            weighers: vec![],
        };
        let out = pipeline.run(&Ctx, hosts(&["h1", "h2"]), HashMap::new(), &HashMap::new(), None).await;
        assert!(out.hosts.is_empty());
    }

    #[tokio::test]
    async fn non_finite_weigher_delta_treated_as_zero() {
        let pipeline: FilterWeigherPipeline<Ctx> = FilterWeigherPipeline {
            name: "nan".to_string(),
            ignore_preselection: false,
            create_decisions: false,
            filters: vec![],
            weighers: vec![WeigherStep { name: "nan".to_string(), scope: None, multiplier: 1.0, plugin: Arc::new(NanWeigher) }],
        };
        let mut weights = HashMap::new();
        weights.insert("h1".to_string(), 5.0);
        weights.insert("h2".to_string(), 3.0);
        let out = pipeline.run(&Ctx, hosts(&["h1", "h2"]), weights, &HashMap::new(), None).await;
        assert_eq!(out.hosts, vec!["h1", "h2"]);
    }

    #[tokio::test]
    async fn weigher_multiplier_scales_delta() {
        let mut deltas = HashMap::new();
        deltas.insert("h1".to_string(), 1.0);
        deltas.insert("h2".to_string(), 10.0);
        let pipeline: FilterWeigherPipeline<Ctx> = FilterWeigherPipeline {
            name: "scaled".to_string(),
            ignore_preselection: false,
            create_decisions: false,
            filters: vec![],
            weighers: vec![WeigherStep { name: "fixed".to_string(), scope: None, multiplier: 0.1, plugin: Arc::new(FixedWeigher(deltas)) }],
        };
        let out = pipeline.run(&Ctx, hosts(&["h1", "h2"]), HashMap::new(), &HashMap::new(), None).await;
        // h2's raw delta (10.0) scaled by 0.1 == h1's raw delta (1.0) scaled
        // by 0.1 plus its own base weight of 0 -> h2 still wins on 1.0 > 0.1.
        assert_eq!(out.hosts, vec!["h2", "h1"]);
    }
}
