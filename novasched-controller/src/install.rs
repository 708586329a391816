use novasched_core::{DetectorPipeline, DetectorStep, FilterStep, FilterWeigherPipeline, InitContext, InitError, KnowledgeStore, Registry};
use novasched_domain::{PipelineSpec, PipelineStatus};

/// Builds a runnable `FilterWeigherPipeline` from a declarative spec and the
/// plugin registry. A plugin that fails `Init` critically rejects the whole
/// pipeline (returns `None`); one that fails non-critically is omitted and
/// recorded in `degraded_steps` while the rest of the pipeline still
/// installs — the classification the pipeline controller's reconcile loop
/// depends on (spec.md §4.5).
pub fn install_filter_weigher<Ctx>(
    name: &str,
    spec: &PipelineSpec,
    registry: &Registry<Ctx>,
    knowledge: &dyn KnowledgeStore,
) -> (Option<FilterWeigherPipeline<Ctx>>, PipelineStatus) {
    let init = InitContext { knowledge };
    let mut degraded = Vec::new();
    let mut filters = Vec::new();

    for plugin_spec in &spec.filters {
        match registry.build_filter(plugin_spec, &init) {
            Ok(plugin) => filters.push(FilterStep { name: plugin_spec.name.clone(), scope: plugin_spec.scope.clone(), plugin }),
            Err(InitError::NonCritical(reason)) => {
                log::warn!("pipeline {name}: filter {} disabled non-critically: {reason}", plugin_spec.name);
                degraded.push(plugin_spec.name.clone());
            }
            Err(InitError::Critical(reason)) => {
                let reason = format!("filter {} failed critically: {reason}", plugin_spec.name);
                log::error!("pipeline {name}: {reason}");
                return (None, PipelineStatus { ready: false, reason: Some(reason), degraded_steps: degraded });
            }
        }
    }

    let mut weighers = Vec::new();
    for weigher_spec in &spec.weighers {
        match registry.build_weigher(&weigher_spec.plugin, &init) {
            Ok(plugin) => weighers.push(novasched_core::WeigherStep {
                name: weigher_spec.plugin.name.clone(),
                scope: weigher_spec.plugin.scope.clone(),
                multiplier: weigher_spec.multiplier,
                plugin,
            }),
            Err(InitError::NonCritical(reason)) => {
                log::warn!("pipeline {name}: weigher {} disabled non-critically: {reason}", weigher_spec.plugin.name);
                degraded.push(weigher_spec.plugin.name.clone());
            }
            Err(InitError::Critical(reason)) => {
                let reason = format!("weigher {} failed critically: {reason}", weigher_spec.plugin.name);
                log::error!("pipeline {name}: {reason}");
                return (None, PipelineStatus { ready: false, reason: Some(reason), degraded_steps: degraded });
            }
        }
    }

    let pipeline = FilterWeigherPipeline {
        name: name.to_string(),
        ignore_preselection: spec.ignore_preselection,
        create_decisions: spec.create_decisions,
        filters,
        weighers,
    };
    (Some(pipeline), PipelineStatus { ready: true, reason: None, degraded_steps: degraded })
}

/// Same classification rules as [`install_filter_weigher`], for the
/// detector/descheduling side of the plugin set.
pub fn install_detector<Ctx>(
    name: &str,
    spec: &PipelineSpec,
    registry: &Registry<Ctx>,
    knowledge: &dyn KnowledgeStore,
) -> (Option<DetectorPipeline>, PipelineStatus) {
    let init = InitContext { knowledge };
    let mut degraded = Vec::new();
    let mut steps = Vec::new();

    for plugin_spec in &spec.detectors {
        match registry.build_detector(plugin_spec, &init) {
            Ok(plugin) => steps.push(DetectorStep { name: plugin_spec.name.clone(), plugin }),
            Err(InitError::NonCritical(reason)) => {
                log::warn!("pipeline {name}: detector {} disabled non-critically: {reason}", plugin_spec.name);
                degraded.push(plugin_spec.name.clone());
            }
            Err(InitError::Critical(reason)) => {
                let reason = format!("detector {} failed critically: {reason}", plugin_spec.name);
                log::error!("pipeline {name}: {reason}");
                return (None, PipelineStatus { ready: false, reason: Some(reason), degraded_steps: degraded });
            }
        }
    }

    let pipeline = DetectorPipeline { name: name.to_string(), steps };
    (Some(pipeline), PipelineStatus { ready: true, reason: None, degraded_steps: degraded })
}
