//! Status and conditions management for DbCluster resources
//!
//! This module provides utilities for managing Kubernetes-style conditions
//! and updating the status subresource.

use chrono::Utc;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};

use crate::controller::error::{Error, Result};
use crate::crd::{ClusterPhase, Condition, DbCluster, DbClusterStatus};
use crate::resources::common::{API_VERSION, FIELD_MANAGER, KIND};

/// Standard condition types following Kubernetes conventions
pub mod condition_types {
    /// Every tier is provisioned and ready
    pub const READY: &str = "Ready";
    /// The cluster is converging towards its desired state
    pub const PROGRESSING: &str = "Progressing";
    /// The last pass stopped on a hard error
    pub const DEGRADED: &str = "Degraded";
}

/// Condition status values
pub mod condition_status {
    pub const TRUE: &str = "True";
    pub const FALSE: &str = "False";
}

/// Builder for creating and updating status conditions
pub struct ConditionBuilder {
    conditions: Vec<Condition>,
    generation: Option<i64>,
}

impl ConditionBuilder {
    /// Create from existing conditions
    pub fn from_existing(existing: Vec<Condition>, generation: Option<i64>) -> Self {
        Self {
            conditions: existing,
            generation,
        }
    }

    /// Set a condition, updating if it exists or adding if it doesn't.
    ///
    /// The transition time only moves when the condition's status changes.
    pub fn set_condition(mut self, type_: &str, status: &str, reason: &str, message: &str) -> Self {
        if let Some(existing) = self.conditions.iter_mut().find(|c| c.type_ == type_) {
            if existing.status != status {
                existing.status = status.to_string();
                existing.last_transition_time = Utc::now().to_rfc3339();
            }
            existing.reason = reason.to_string();
            existing.message = message.to_string();
            existing.observed_generation = self.generation;
        } else {
            self.conditions.push(Condition {
                type_: type_.to_string(),
                status: status.to_string(),
                reason: reason.to_string(),
                message: message.to_string(),
                last_transition_time: Utc::now().to_rfc3339(),
                observed_generation: self.generation,
            });
        }
        self
    }

    pub fn ready(self, is_ready: bool, reason: &str, message: &str) -> Self {
        self.set_condition(condition_types::READY, bool_status(is_ready), reason, message)
    }

    pub fn progressing(self, is_progressing: bool, reason: &str, message: &str) -> Self {
        self.set_condition(
            condition_types::PROGRESSING,
            bool_status(is_progressing),
            reason,
            message,
        )
    }

    pub fn degraded(self, is_degraded: bool, reason: &str, message: &str) -> Self {
        self.set_condition(
            condition_types::DEGRADED,
            bool_status(is_degraded),
            reason,
            message,
        )
    }

    /// Build the conditions list
    pub fn build(self) -> Vec<Condition> {
        self.conditions
    }
}

fn bool_status(value: bool) -> &'static str {
    if value {
        condition_status::TRUE
    } else {
        condition_status::FALSE
    }
}

/// Final status of a pass: the observed tier sections plus phase and
/// conditions describing how far the pipeline got.
pub fn pass_status(
    cluster: &DbCluster,
    observed: DbClusterStatus,
    result: &Result<()>,
) -> DbClusterStatus {
    let generation = cluster.metadata.generation;
    let existing = cluster
        .status
        .as_ref()
        .map(|s| s.conditions.clone())
        .unwrap_or_default();
    let builder = ConditionBuilder::from_existing(existing, generation);

    let (phase, conditions) = match result {
        Ok(()) => (
            ClusterPhase::Running,
            builder
                .ready(true, "ClusterReady", "All tiers are provisioned and ready")
                .progressing(false, "Stable", "Cluster is stable")
                .degraded(false, "Healthy", "Last reconcile pass succeeded")
                .build(),
        ),
        Err(Error::Requeue { reason, message }) => (
            ClusterPhase::Progressing,
            builder
                .ready(false, reason, message)
                .progressing(true, reason, message)
                .degraded(false, "Healthy", "Waiting on a dependent tier is expected")
                .build(),
        ),
        Err(e) => {
            let reason = match (e.failed_stage(), e) {
                (Some(stage), _) => stage.reason(),
                (None, Error::ValidationError(_)) => "ValidationFailed",
                (None, _) => "ReconcileFailed",
            };
            let message = e.to_string();
            (
                ClusterPhase::Failed,
                builder
                    .ready(false, reason, &message)
                    .progressing(false, reason, &message)
                    .degraded(true, reason, &message)
                    .build(),
            )
        }
    };

    DbClusterStatus {
        phase,
        observed_generation: generation,
        conditions,
        ..observed
    }
}

/// Status writer for DbCluster resources
pub struct StatusManager<'a> {
    cluster: &'a DbCluster,
    client: &'a Client,
}

impl<'a> StatusManager<'a> {
    pub fn new(cluster: &'a DbCluster, client: &'a Client) -> Self {
        Self { cluster, client }
    }

    /// Patch the status subresource unless it already holds `status`.
    ///
    /// Returns whether a patch was sent.
    pub async fn update_if_changed(&self, status: &DbClusterStatus) -> Result<bool> {
        if self.cluster.status.as_ref() == Some(status) {
            return Ok(false);
        }

        let ns = self
            .cluster
            .namespace()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        let api: Api<DbCluster> = Api::namespaced(self.client.clone(), &ns);

        // Server-side apply drops map entries this manager no longer sends,
        // so removed members and stores disappear from the stored status.
        let patch = serde_json::json!({
            "apiVersion": API_VERSION,
            "kind": KIND,
            "status": status
        });

        api.patch_status(
            &self.cluster.name_any(),
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&patch),
        )
        .await?;

        Ok(true)
    }
}
