mod cli;
mod config;

use std::fs;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands};
use config::load_config;
use log::{error, info};
use novasched_api::ApiState;
use novasched_core::{ComputeApi, Registry, ResourceStore};
use novasched_domain::PipelineResource;
use novasched_plugins::{register_compute_plugins, ComputeCtx};
use novasched_store::{HttpComputeApi, XlineResourceStore};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Start { config } => start(config.to_str().unwrap()).await,
        Commands::Validate { pipeline } => validate(pipeline.to_str().unwrap()),
    }
}

async fn start(config_path: &str) -> anyhow::Result<()> {
    info!("novasched starting");
    let cfg = load_config(config_path)?;

    let store: Arc<dyn ResourceStore> = Arc::new(XlineResourceStore::connect(&cfg.resource_store.endpoints).await?);
    let namespace = cfg.resource_store.namespace.clone();

    let mut registry: Registry<ComputeCtx> = Registry::new();
    register_compute_plugins(&mut registry);
    let controller = Arc::new(novasched_controller::PipelineController::new(registry, store.clone(), namespace.clone()));

    let cancel = CancellationToken::new();

    let controller_for_run = controller.clone();
    tokio::spawn(async move {
        if let Err(err) = controller_for_run.run().await {
            error!("pipeline controller stopped: {err:#}");
        }
    });

    let compute: Arc<dyn ComputeApi> = Arc::new(HttpComputeApi::new(cfg.descheduler.compute_api_url.clone()));

    let dispatcher = Arc::new(novasched_deschedule::Dispatcher::new(store.clone(), compute.clone(), namespace.clone(), cfg.descheduler.dry_run));
    tokio::spawn(async move {
        if let Err(err) = dispatcher.run().await {
            error!("descheduling dispatcher stopped: {err:#}");
        }
    });

    let ttl_store = store.clone();
    let ttl_namespace = namespace.clone();
    let ttl_cancel = cancel.clone();
    let sweep_interval = std::time::Duration::from_secs(cfg.descheduler.sweep_interval_minutes * 60);
    let ttl_horizon = chrono::Duration::hours(cfg.descheduler.ttl_hours);
    tokio::spawn(async move {
        novasched_deschedule::ttl::run(ttl_store, ttl_namespace, ttl_horizon, sweep_interval, ttl_cancel).await;
    });

    if let Some(detector_name) = cfg.pipelines.detector.clone() {
        // Give the controller a moment to bootstrap existing Pipeline resources
        // before looking up the configured detector pipeline by name.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        match controller.detector(&detector_name).await {
            Some(pipeline) => {
                let periodic_store = store.clone();
                let periodic_namespace = namespace.clone();
                let periodic_compute = compute.clone();
                let periodic_cancel = cancel.clone();
                tokio::spawn(async move {
                    novasched_deschedule::periodic::run(pipeline, periodic_compute, periodic_store, periodic_namespace, periodic_cancel).await;
                });
            }
            None => error!("configured detector pipeline {detector_name} is not installed or not ready"),
        }
    } else {
        info!("no detector pipeline configured, descheduling periodic worker idle");
    }

    let state = Arc::new(ApiState::new(controller.clone(), store.clone(), namespace.clone()));
    let app = novasched_api::router(state);

    info!("listening on {}", cfg.addr);
    let listener = tokio::net::TcpListener::bind(&cfg.addr).await.with_context(|| format!("failed to bind {}", cfg.addr))?;
    let shutdown_cancel = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            shutdown_cancel.cancel();
        })
        .await?;

    cancel.cancel();
    Ok(())
}

fn validate(pipeline_path: &str) -> anyhow::Result<()> {
    let content = fs::read_to_string(pipeline_path).with_context(|| format!("failed to read {pipeline_path}"))?;
    let resource: PipelineResource = serde_yaml::from_str(&content).context("failed to parse pipeline YAML")?;

    let mut registry: Registry<ComputeCtx> = Registry::new();
    register_compute_plugins(&mut registry);

    let mut ok = true;
    for filter in &resource.spec.filters {
        match registry.validate_filter(filter) {
            Ok(()) => println!("ACCEPT filter {}", filter.name),
            Err(reason) => {
                println!("REJECT filter {}: {reason}", filter.name);
                ok = false;
            }
        }
    }
    for weigher in &resource.spec.weighers {
        match registry.validate_weigher(&weigher.plugin) {
            Ok(()) => println!("ACCEPT weigher {}", weigher.plugin.name),
            Err(reason) => {
                println!("REJECT weigher {}: {reason}", weigher.plugin.name);
                ok = false;
            }
        }
    }
    for detector in &resource.spec.detectors {
        match registry.validate_detector(detector) {
            Ok(()) => println!("ACCEPT detector {}", detector.name),
            Err(reason) => {
                println!("REJECT detector {}: {reason}", detector.name);
                ok = false;
            }
        }
    }

    if !ok {
        anyhow::bail!("pipeline {} failed validation", resource.metadata.name);
    }
    println!("pipeline {} accepted", resource.metadata.name);
    Ok(())
}
