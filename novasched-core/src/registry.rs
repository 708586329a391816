use std::collections::HashMap;
use std::sync::Arc;

use novasched_domain::PluginSpec;

use crate::plugin::{Detector, Filter, InitContext, InitError, Weigher};

type FilterCtor<Ctx> = fn(&PluginSpec, &InitContext<'_>) -> Result<Arc<dyn Filter<Ctx>>, InitError>;
type WeigherCtor<Ctx> = fn(&PluginSpec, &InitContext<'_>) -> Result<Arc<dyn Weigher<Ctx>>, InitError>;
type DetectorCtor = fn(&PluginSpec, &InitContext<'_>) -> Result<Arc<dyn Detector>, InitError>;
type ValidateFn = fn(&PluginSpec) -> Result<(), String>;

pub struct FilterEntry<Ctx> {
    pub validate: ValidateFn,
    pub construct: FilterCtor<Ctx>,
}

pub struct WeigherEntry<Ctx> {
    pub validate: ValidateFn,
    pub construct: WeigherCtor<Ctx>,
}

pub struct DetectorEntry {
    pub validate: ValidateFn,
    pub construct: DetectorCtor,
}

/// The closed, per-domain name → constructor map described by the plugin
/// contract: a plugin name not registered here is a `Critical` init error,
/// never a runtime lookup failure. One `Registry` is built once per process
/// (by `novasched-plugins::register_compute_plugins`, for the compute
/// domain) and shared read-only across every pipeline instance — mirroring
/// `libscheduler::plugins::Registry::default()`, which wires every known
/// plugin by name at construction rather than discovering them dynamically.
#[derive(Default)]
pub struct Registry<Ctx> {
    filters: HashMap<String, FilterEntry<Ctx>>,
    weighers: HashMap<String, WeigherEntry<Ctx>>,
    detectors: HashMap<String, DetectorEntry>,
}

impl<Ctx> Registry<Ctx> {
    pub fn new() -> Self {
        Self {
            filters: HashMap::new(),
            weighers: HashMap::new(),
            detectors: HashMap::new(),
        }
    }

    pub fn register_filter(&mut self, name: impl Into<String>, entry: FilterEntry<Ctx>) {
        let name = name.into();
        if self.filters.insert(name.clone(), entry).is_some() {
            log::warn!("filter plugin {name} registered twice, last registration wins");
        }
    }

    pub fn register_weigher(&mut self, name: impl Into<String>, entry: WeigherEntry<Ctx>) {
        let name = name.into();
        if self.weighers.insert(name.clone(), entry).is_some() {
            log::warn!("weigher plugin {name} registered twice, last registration wins");
        }
    }

    pub fn register_detector(&mut self, name: impl Into<String>, entry: DetectorEntry) {
        let name = name.into();
        if self.detectors.insert(name.clone(), entry).is_some() {
            log::warn!("detector plugin {name} registered twice, last registration wins");
        }
    }

    pub fn validate_filter(&self, spec: &PluginSpec) -> Result<(), String> {
        match self.filters.get(&spec.name) {
            Some(entry) => (entry.validate)(spec),
            None => Err(format!("unknown filter plugin {:?}", spec.name)),
        }
    }

    pub fn validate_weigher(&self, spec: &PluginSpec) -> Result<(), String> {
        match self.weighers.get(&spec.name) {
            Some(entry) => (entry.validate)(spec),
            None => Err(format!("unknown weigher plugin {:?}", spec.name)),
        }
    }

    pub fn validate_detector(&self, spec: &PluginSpec) -> Result<(), String> {
        match self.detectors.get(&spec.name) {
            Some(entry) => (entry.validate)(spec),
            None => Err(format!("unknown detector plugin {:?}", spec.name)),
        }
    }

    pub fn build_filter(&self, spec: &PluginSpec, init: &InitContext<'_>) -> Result<Arc<dyn Filter<Ctx>>, InitError> {
        match self.filters.get(&spec.name) {
            Some(entry) => (entry.construct)(spec, init),
            None => Err(InitError::Critical(format!("unknown filter plugin {:?}", spec.name))),
        }
    }

    pub fn build_weigher(&self, spec: &PluginSpec, init: &InitContext<'_>) -> Result<Arc<dyn Weigher<Ctx>>, InitError> {
        match self.weighers.get(&spec.name) {
            Some(entry) => (entry.construct)(spec, init),
            None => Err(InitError::Critical(format!("unknown weigher plugin {:?}", spec.name))),
        }
    }

    pub fn build_detector(&self, spec: &PluginSpec, init: &InitContext<'_>) -> Result<Arc<dyn Detector>, InitError> {
        match self.detectors.get(&spec.name) {
            Some(entry) => (entry.construct)(spec, init),
            None => Err(InitError::Critical(format!("unknown detector plugin {:?}", spec.name))),
        }
    }
}
