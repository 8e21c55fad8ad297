use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use kube::Client;

use crate::config::OperatorConfig;
use crate::controller::cluster_control::ClusterControl;
use crate::controller::error::Result;
use crate::controller::events::KubeEventRecorder;
use crate::health::HealthState;
use crate::manager::{
    KubeMetaManager, KubeOrphanPodCleaner, KubeReclaimPolicyManager, MetadataMemberManager,
    QueryMemberManager, StorageMemberManager, TierWorkload,
};
use crate::metadata_client::{HttpMetadataTierClient, MetadataTierClient};
use crate::resources::common::FIELD_MANAGER;

/// Shared context for the controller
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Health state for metrics, if the health server runs
    pub health_state: Option<Arc<HealthState>>,
    pub config: OperatorConfig,
    /// The reconciliation pipeline
    pub control: ClusterControl,
    /// Consecutive hard failures per cluster, drives the backoff
    pub failures: FailureTracker,
}

impl Context {
    /// Wire the pipeline against the Kubernetes API and the metadata tier API
    pub fn new(
        client: Client,
        health_state: Option<Arc<HealthState>>,
        config: OperatorConfig,
    ) -> Result<Self> {
        let api: Arc<dyn MetadataTierClient> = Arc::new(HttpMetadataTierClient::new(
            config.metadata_api_timeout,
            config.metadata_api_endpoint.clone(),
        )?);
        let workload = TierWorkload::new(client.clone());

        let control = ClusterControl::new(
            Arc::new(KubeReclaimPolicyManager::new(client.clone())),
            Arc::new(MetadataMemberManager::new(workload.clone(), api.clone())),
            Arc::new(StorageMemberManager::new(workload.clone(), api)),
            Arc::new(QueryMemberManager::new(workload.clone())),
            Arc::new(KubeMetaManager::new(client.clone(), workload)),
            Arc::new(KubeOrphanPodCleaner::new(client.clone())),
            Arc::new(KubeEventRecorder::new(
                client.clone(),
                FIELD_MANAGER,
                config.pod_name.clone(),
            )),
        );

        Ok(Self {
            client,
            health_state,
            config,
            control,
            failures: FailureTracker::default(),
        })
    }
}

/// Consecutive hard failures per cluster key (`namespace/name`)
#[derive(Debug, Default)]
pub struct FailureTracker {
    failures: Mutex<HashMap<String, u32>>,
}

impl FailureTracker {
    /// Record a hard failure of `key` and return how many preceded it
    pub fn next_attempt(&self, key: &str) -> u32 {
        match self.failures.lock() {
            Ok(mut failures) => {
                let count = failures.entry(key.to_string()).or_insert(0);
                let attempt = *count;
                *count = count.saturating_add(1);
                attempt
            }
            Err(_) => 0,
        }
    }

    /// Forget earlier failures of `key`
    pub fn reset(&self, key: &str) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.remove(key);
        }
    }

    /// Whether any failure of `key` is still remembered
    pub fn is_tracked(&self, key: &str) -> bool {
        self.failures
            .lock()
            .map(|failures| failures.contains_key(key))
            .unwrap_or(false)
    }
}
