pub mod config;
pub mod controller;
pub mod crd;
pub mod health;
pub mod manager;
pub mod metadata_client;
pub mod resources;

pub use config::OperatorConfig;
pub use controller::{BackoffConfig, ClusterControl, Context, Error, Result, error_policy, reconcile};
pub use crd::DbCluster;
pub use health::{HealthState, Metrics};

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Service;
use kube::runtime::Controller;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;

/// Helper to create a namespaced or cluster-wide API based on scope.
fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Run the DbCluster controller.
///
/// Watches DbCluster resources (scoped to `config.watch_namespace` when set)
/// together with the StatefulSets and Services they own, and reconciles each
/// cluster whenever any of them changes. The controller's work queue runs at
/// most one pass per cluster at a time.
///
/// If health_state is provided, metrics will be recorded for reconciliations.
pub async fn run_controller(
    client: Client,
    health_state: Option<Arc<HealthState>>,
    config: OperatorConfig,
) -> Result<()> {
    let namespace = config.watch_namespace.clone();
    let namespace = namespace.as_deref();
    tracing::info!(
        "Starting controller for DbCluster resources (scope: {})",
        namespace.unwrap_or("cluster-wide")
    );

    let ctx = Arc::new(Context::new(client.clone(), health_state.clone(), config)?);

    // Mark as ready once we start the controller
    if let Some(ref state) = health_state {
        state.set_ready(true).await;
    }

    let clusters: Api<DbCluster> = scoped_api(client.clone(), namespace);
    let statefulsets: Api<StatefulSet> = scoped_api(client.clone(), namespace);
    let services: Api<Service> = scoped_api(client.clone(), namespace);

    let watcher_config = WatcherConfig::default().any_semantic();

    Controller::new(clusters, watcher_config.clone())
        .owns(statefulsets, watcher_config.clone())
        .owns(services, watcher_config)
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    tracing::debug!("Reconciled: {}", obj.name);
                }
                Err(kube::runtime::controller::Error::ReconcilerFailed(err, obj)) => {
                    // Waiting on a tier is the normal course of provisioning;
                    // deleted objects can still be in flight from watch events.
                    if err.is_requeue() {
                        tracing::debug!("Requeued {}: {}", obj.name, err);
                    } else if err.is_not_found() {
                        tracing::debug!("Object no longer exists (likely deleted): {}", obj.name);
                    } else {
                        tracing::error!("Reconciliation error for {}: {}", obj.name, err);
                    }
                }
                Err(e) => {
                    tracing::error!("Controller error: {:?}", e);
                }
            }
        })
        .await;

    // This should never complete in normal operation
    tracing::error!("Controller stream ended unexpectedly");
    Ok(())
}
