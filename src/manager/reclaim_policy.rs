//! Reclaim policy manager
//!
//! The StatefulSet controller leaves data volumes behind when a cluster is
//! scaled down or deleted. Whether the underlying persistent volumes survive
//! their claims is decided here, from `spec.reclaimPolicy`.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use tracing::{debug, info};

use crate::controller::error::{Error, Result};
use crate::crd::{DbCluster, ReclaimPolicy};
use crate::manager::ReclaimPolicyManager;
use crate::resources::common::{FIELD_MANAGER, cluster_labels, label_selector};

pub struct KubeReclaimPolicyManager {
    client: Client,
}

impl KubeReclaimPolicyManager {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReclaimPolicyManager for KubeReclaimPolicyManager {
    async fn sync(&self, cluster: &DbCluster) -> Result<()> {
        let ns = cluster
            .namespace()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        let policy = cluster.spec.reclaim_policy;

        let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), &ns);
        let pvs: Api<PersistentVolume> = Api::all(self.client.clone());

        let selector = label_selector(&cluster_labels(&cluster.name_any()));
        let claims = pvcs.list(&ListParams::default().labels(&selector)).await?;

        for claim in &claims.items {
            // Unbound claims have no volume to update yet
            let Some(volume_name) = bound_volume_name(claim) else {
                continue;
            };

            let pv = pvs.get(volume_name).await?;
            if !needs_reclaim_patch(&pv, policy) {
                continue;
            }

            let patch = serde_json::json!({
                "spec": { "persistentVolumeReclaimPolicy": policy.as_str() }
            });
            pvs.patch(
                volume_name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await?;
            info!(
                volume = %volume_name,
                claim = %claim.name_any(),
                policy = policy.as_str(),
                "updated persistent volume reclaim policy"
            );
        }

        debug!(claims = claims.items.len(), "reclaim policy in sync");
        Ok(())
    }
}

/// Volume a claim is bound to, if any
pub fn bound_volume_name(claim: &PersistentVolumeClaim) -> Option<&str> {
    claim
        .spec
        .as_ref()
        .and_then(|s| s.volume_name.as_deref())
        .filter(|name| !name.is_empty())
}

/// Whether `pv` carries a reclaim policy other than `policy`
pub fn needs_reclaim_patch(pv: &PersistentVolume, policy: ReclaimPolicy) -> bool {
    let current = pv
        .spec
        .as_ref()
        .and_then(|s| s.persistent_volume_reclaim_policy.as_deref());
    current != Some(policy.as_str())
}
