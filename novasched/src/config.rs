use anyhow::Context;
use serde::Deserialize;
use std::fs;

/// Top-level config shape, mirroring `rks::protocol::config::Config`:
/// HTTP bind address, resource-store connection, and descheduler tuning.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub addr: String,
    pub resource_store: ResourceStoreConfig,
    pub descheduler: DeschedulerConfig,
    pub pipelines: PipelinesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceStoreConfig {
    pub endpoints: Vec<String>,
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_namespace() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeschedulerConfig {
    /// Base URL of the compute service the `HttpComputeApi` adapter talks to.
    pub compute_api_url: String,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: i64,
    #[serde(default = "default_sweep_minutes")]
    pub sweep_interval_minutes: u64,
}

fn default_ttl_hours() -> i64 {
    24
}

fn default_sweep_minutes() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelinesConfig {
    /// Name of the one configured detector pipeline the periodic worker
    /// drives; absent means the worker logs and idles, per §4.7.
    #[serde(default)]
    pub detector: Option<String>,
}

pub fn load_config(path: &str) -> anyhow::Result<Config> {
    let content = fs::read_to_string(path).with_context(|| format!("failed to read config from {path}"))?;
    let cfg: Config = serde_yaml::from_str(&content).context("failed to parse YAML config")?;
    Ok(cfg)
}
