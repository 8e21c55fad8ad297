//! Reconciliation entry points for DbCluster resources
//!
//! Glue between `kube::runtime::Controller` and [`ClusterControl`]: validates
//! the cluster spec, runs one pipeline pass on a working copy of the cluster, writes
//! the resulting status and decides when the cluster is looked at again.
//!
//! [`ClusterControl`]: crate::controller::cluster_control::ClusterControl

use std::sync::Arc;
use std::time::Instant;

use kube::ResourceExt;
use kube::runtime::controller::Action;
use tracing::{debug, error, info, instrument, warn};

use crate::controller::context::{Context, FailureTracker};
use crate::controller::error::{BackoffConfig, Error, Result};
use crate::controller::status::{StatusManager, pass_status};
use crate::controller::validation::validate_spec;
use crate::crd::{DbCluster, DbClusterStatus, Tier, ready_replicas};
use crate::manager::TierWorkload;
use crate::resources::backup;

/// Default backoff configuration for error handling
fn default_backoff() -> BackoffConfig {
    BackoffConfig::default()
}

/// Work-queue key of a cluster, `namespace/name`
pub fn cluster_key(cluster: &DbCluster) -> String {
    format!(
        "{}/{}",
        cluster.namespace().unwrap_or_default(),
        cluster.name_any()
    )
}

/// Main reconciliation function
#[instrument(skip(cluster, ctx), fields(name = %cluster.name_any(), namespace = cluster.namespace().unwrap_or_default()))]
pub async fn reconcile(cluster: Arc<DbCluster>, ctx: Arc<Context>) -> Result<Action> {
    let start = Instant::now();
    let ns = cluster.namespace().unwrap_or_default();
    let name = cluster.name_any();

    if let Some(action) = release_deleted(&ctx.failures, &cluster) {
        return Ok(action);
    }

    info!("Reconciling DbCluster");

    let (result, observed) = match validate_spec(&cluster) {
        Ok(()) => {
            // The pipeline writes tier status into its own copy of the cluster
            let mut working = (*cluster).clone();
            let result = ctx.control.update_cluster(&mut working).await;
            let observed = working.status.take().unwrap_or_default();
            (result, observed)
        }
        Err(e) => {
            error!("Invalid DbCluster spec: {}", e);
            let observed = cluster.status.clone().unwrap_or_default();
            (Err(e), observed)
        }
    };

    let status = pass_status(&cluster, observed, &result);
    record_tier_metrics(&ctx, &cluster, &status);

    let status_update = StatusManager::new(&cluster, &ctx.client)
        .update_if_changed(&status)
        .await;
    match &status_update {
        Ok(true) => debug!(phase = %status.phase, "status updated"),
        Ok(false) => debug!("status unchanged"),
        Err(e) => warn!("Failed to update status: {}", e),
    }

    let elapsed = start.elapsed().as_secs_f64();
    if let Some(health) = &ctx.health_state {
        health.metrics.record_reconcile(&ns, &name, elapsed);
        match &result {
            Err(e) if e.is_requeue() => health.metrics.record_requeue(&ns, &name),
            Err(_) => health.metrics.record_error(&ns, &name),
            Ok(()) => {}
        }
    }

    result?;
    status_update?;

    if let Some(pvc) = backup::generate_backup_pvc(&cluster) {
        TierWorkload::new(ctx.client.clone()).apply(&ns, &pvc).await?;
        debug!(claim = %pvc.name_any(), "applied backup volume claim");
    }

    ctx.failures.reset(&cluster_key(&cluster));
    info!("Reconciliation completed successfully");
    Ok(Action::requeue(ctx.config.resync_interval))
}

/// Stop tracking a cluster that is being deleted
///
/// Owned resources are garbage collected through their owner references, so
/// a deleted cluster only needs its failure history dropped. Returns `None`
/// for live clusters.
pub fn release_deleted(failures: &FailureTracker, cluster: &DbCluster) -> Option<Action> {
    cluster.metadata.deletion_timestamp.as_ref()?;
    debug!("DbCluster is being deleted, nothing to do");
    failures.reset(&cluster_key(cluster));
    Some(Action::await_change())
}

/// Error policy for the controller
///
/// A pass stopped by a readiness gate is retried on a short fixed interval.
/// Hard errors back off exponentially.
pub fn error_policy(cluster: Arc<DbCluster>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = cluster.name_any();

    if error.is_requeue() {
        debug!(
            "{} for {}, requeuing in {:?}",
            error, name, ctx.config.requeue_interval
        );
        return Action::requeue(ctx.config.requeue_interval);
    }

    let attempt = ctx.failures.next_attempt(&cluster_key(&cluster));
    let delay = default_backoff().delay_for_error(error, attempt);

    if error.is_retryable() {
        warn!(
            "Retryable error for {} (attempt {}): {}, requeuing in {:?}",
            name,
            attempt + 1,
            error,
            delay
        );
    } else {
        error!(
            "Non-retryable error for {}: {}, requeuing in {:?} for manual intervention",
            name, error, delay
        );
    }

    Action::requeue(delay)
}

fn record_tier_metrics(ctx: &Context, cluster: &DbCluster, status: &DbClusterStatus) {
    let Some(health) = &ctx.health_state else {
        return;
    };
    let ns = cluster.namespace().unwrap_or_default();
    let name = cluster.name_any();

    for tier in Tier::ALL {
        let workload = match tier {
            Tier::Metadata => status.metadata_tier.workload.as_ref(),
            Tier::Storage => status.storage_tier.workload.as_ref(),
            Tier::Query => status.query_tier.workload.as_ref(),
        };
        health.metrics.set_tier_replicas(
            &ns,
            &name,
            tier.as_str(),
            i64::from(cluster.spec.replicas(tier)),
            i64::from(ready_replicas(workload)),
        );
    }
}
