//! Kubernetes Events for DbCluster reconciliation outcomes

use async_trait::async_trait;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};
use tracing::warn;

use crate::crd::DbCluster;

/// Event reasons
pub mod reasons {
    /// Every pipeline stage succeeded
    pub const SUCCESSFUL_SYNC: &str = "SuccessfulSync";
    /// A pipeline stage failed with a hard error
    pub const FAILED_SYNC: &str = "FailedSync";
}

/// Action reported on every event
const RECONCILE_ACTION: &str = "Reconcile";

/// Records human-readable events against a DbCluster
#[async_trait]
pub trait EventRecorder: Send + Sync {
    /// Record an event. Publishing failures are logged, never returned.
    async fn record(&self, cluster: &DbCluster, severity: EventType, reason: &str, message: &str);
}

/// Publishes events through the Kubernetes Events API
pub struct KubeEventRecorder {
    recorder: Recorder,
}

impl KubeEventRecorder {
    pub fn new(client: Client, controller: &str, instance: Option<String>) -> Self {
        let reporter = Reporter {
            controller: controller.to_string(),
            instance,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn record(&self, cluster: &DbCluster, severity: EventType, reason: &str, message: &str) {
        let event = Event {
            type_: severity,
            reason: reason.to_string(),
            note: Some(message.to_string()),
            action: RECONCILE_ACTION.to_string(),
            secondary: None,
        };

        if let Err(e) = self.recorder.publish(&event, &cluster.object_ref(&())).await {
            warn!(reason = %reason, error = %e, "failed to publish event");
        }
    }
}
