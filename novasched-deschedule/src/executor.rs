use std::time::Duration;

use novasched_core::ComputeApi;
use novasched_domain::{DeschedulingSpec, DeschedulingStatus, HostKind, Phase, RefKind, VmStatus};

use crate::jitter::Backoff;
use crate::metrics;

/// What the caller (the watch-driven dispatcher in [`crate::dispatch`]) should
/// do with the Descheduling resource after one reconcile.
pub enum Outcome {
    /// The VM no longer exists; delete the Descheduling.
    Deleted,
    /// Reached a terminal phase; persist this status.
    Terminal(DeschedulingStatus),
    /// Dry-run short-circuit, or a transient external-API error (not a
    /// terminal validation failure) the caller should simply leave Queued
    /// for a future tick.
    Unchanged,
}

const DEFAULT_BASE: Duration = Duration::from_secs(1);
const DEFAULT_CAP: Duration = Duration::from_secs(30);
/// After this many polls without a terminal VM state, give up rather than
/// poll forever against a compute API that stopped reporting progress.
const MAX_POLLS: u32 = 60;

/// Runs the full Queued->InProgress->Terminal state machine for one
/// Descheduling, per §4.4: validate, fetch the VM, kick off live-migration,
/// then poll until the VM leaves its transitional state. The whole poll
/// loop runs inside this one call — the resource is not re-reconciled until
/// it returns, matching "an InProgress Descheduling is not re-reconciled
/// until the poll loop concludes".
pub async fn reconcile(spec: &DeschedulingSpec, compute: &dyn ComputeApi, dry_run: bool) -> Outcome {
    reconcile_with_backoff(spec, compute, dry_run, Backoff::new(DEFAULT_BASE, DEFAULT_CAP)).await
}

pub async fn reconcile_with_backoff(spec: &DeschedulingSpec, compute: &dyn ComputeApi, dry_run: bool, backoff: Backoff) -> Outcome {
    let _timer_guard = TimerGuard::start();

    if spec.reference_kind != RefKind::VmUuid {
        return terminal(false, "UnsupportedRefType");
    }
    if spec.previous_host.is_some() && spec.previous_host_kind != Some(HostKind::ComputeHostName) {
        return terminal(false, "UnsupportedPrevHostType");
    }
    if spec.reference.is_empty() {
        return terminal(false, "UnsupportedRefType");
    }

    let vm = match compute.get(&spec.reference).await {
        Ok(Some(vm)) => vm,
        Ok(None) => {
            metrics::EXECUTOR_OUTCOMES.with_label_values(&["deleted_vm_missing"]).inc();
            return Outcome::Deleted;
        }
        Err(err) => {
            log::warn!("descheduling {}: transient error fetching VM, requeuing: {err:#}", spec.reference);
            metrics::EXECUTOR_OUTCOMES.with_label_values(&["requeued_initial_fetch_error"]).inc();
            return Outcome::Unchanged;
        }
    };

    if let Some(previous_host) = &spec.previous_host {
        if previous_host != &vm.compute_host {
            return terminal(false, "VMNotOnExpectedHost");
        }
    }

    if vm.status != VmStatus::Active {
        return terminal(false, "VMNotActive");
    }

    if dry_run {
        log::info!("descheduling {}: dry-run, skipping live-migration", spec.reference);
        return Outcome::Unchanged;
    }

    if let Err(err) = compute.live_migrate(&spec.reference).await {
        log::error!("descheduling {}: live-migrate request failed: {err:#}", spec.reference);
        return terminal(false, "LiveMigrationFailed");
    }

    for attempt in 0..MAX_POLLS {
        tokio::time::sleep(backoff.delay(attempt)).await;

        match compute.get(&spec.reference).await {
            Ok(Some(vm)) => match vm.status {
                VmStatus::Active => {
                    return terminal_with_host(true, "LiveMigrationSucceeded", Some(vm.compute_host));
                }
                VmStatus::Error => return terminal(false, "LiveMigrationFailed"),
                VmStatus::Transitional => continue,
            },
            Ok(None) => {
                metrics::EXECUTOR_OUTCOMES.with_label_values(&["deleted_vm_missing"]).inc();
                return Outcome::Deleted;
            }
            Err(err) => {
                log::error!("descheduling {}: poll failed: {err:#}", spec.reference);
                return terminal(false, "GetVMStatusFailed");
            }
        }
    }

    log::warn!("descheduling {}: gave up after {MAX_POLLS} polls, VM still transitional", spec.reference);
    terminal(false, "LiveMigrationFailed")
}

fn terminal(success: bool, reason: &str) -> Outcome {
    terminal_with_host(success, reason, None)
}

fn terminal_with_host(success: bool, reason: &str, new_host: Option<String>) -> Outcome {
    let label = if success { "ready_success" } else { "ready_failure" };
    metrics::EXECUTOR_OUTCOMES.with_label_values(&[label]).inc();
    Outcome::Terminal(DeschedulingStatus {
        phase: Phase::Ready { success, reason: Some(reason.to_string()) },
        new_host,
    })
}

struct TimerGuard {
    start: std::time::Instant,
}

impl TimerGuard {
    fn start() -> Self {
        Self { start: std::time::Instant::now() }
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        metrics::EXECUTOR_RUN_DURATION.with_label_values(&["reconcile"]).observe(self.start.elapsed().as_secs_f64());
    }
}
