//! Meta manager
//!
//! Publishes each member's identity onto its pod and data claim: the cluster
//! it belongs to, its tier and ordinal, and the member or store id the
//! metadata tier assigned to it. Member processes read these back for
//! self-registration and operators use them to map volumes to members.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use kube::api::{Patch, PatchParams};
use kube::core::ObjectMeta;
use kube::{Api, Client, ResourceExt};
use tracing::debug;

use crate::controller::error::{Error, Result};
use crate::crd::{DbCluster, StoreState, Tier};
use crate::manager::MetaManager;
use crate::manager::workload::TierWorkload;
use crate::resources::common::{
    ANNOTATION_MEMBER_ID, ANNOTATION_STORE_ID, FIELD_MANAGER, LABEL_CLUSTER_ID, LABEL_ORDINAL,
    LABEL_POD_NAME, data_claim_name, pod_ordinal, tier_labels, workload_name,
};

/// Labels and annotations identifying one member
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemberIdentity {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

impl MemberIdentity {
    /// Whether `meta` already carries every label and annotation of this identity
    pub fn is_applied(&self, meta: &ObjectMeta) -> bool {
        contains_all(meta.labels.as_ref(), &self.labels)
            && contains_all(meta.annotations.as_ref(), &self.annotations)
    }

    fn merge_patch(&self) -> serde_json::Value {
        serde_json::json!({
            "metadata": {
                "labels": self.labels,
                "annotations": self.annotations,
            }
        })
    }
}

fn contains_all(existing: Option<&BTreeMap<String, String>>, wanted: &BTreeMap<String, String>) -> bool {
    wanted
        .iter()
        .all(|(k, v)| existing.and_then(|m| m.get(k)) == Some(v))
}

/// Identity of the member running in `pod_name`, or `None` if the pod is not
/// a member of `tier`
pub fn member_identity(cluster: &DbCluster, tier: Tier, pod_name: &str) -> Option<MemberIdentity> {
    let cluster_name = cluster.name_any();
    let ordinal = pod_ordinal(&workload_name(&cluster_name, tier), pod_name)?;

    let mut labels = tier_labels(&cluster_name, tier);
    labels.insert(
        LABEL_CLUSTER_ID.to_string(),
        cluster.metadata.uid.clone().unwrap_or_default(),
    );
    labels.insert(LABEL_ORDINAL.to_string(), ordinal.to_string());

    let mut annotations = BTreeMap::new();
    if let Some(status) = &cluster.status {
        match tier {
            Tier::Metadata => {
                if let Some(id) = status
                    .metadata_tier
                    .members
                    .get(pod_name)
                    .and_then(|m| m.id.clone())
                {
                    annotations.insert(ANNOTATION_MEMBER_ID.to_string(), id);
                }
            }
            Tier::Storage => {
                // A rebuilt pod keeps its tombstoned stores listed; the newest live one wins
                if let Some(store) = status
                    .storage_tier
                    .stores
                    .values()
                    .filter(|s| s.pod_name == pod_name && s.state != StoreState::Tombstone)
                    .max_by_key(|s| s.id.parse::<u64>().unwrap_or(0))
                {
                    annotations.insert(ANNOTATION_STORE_ID.to_string(), store.id.clone());
                }
            }
            Tier::Query => {}
        }
    }

    Some(MemberIdentity {
        labels,
        annotations,
    })
}

/// Identity of a member's data claim: the member identity plus its pod name
pub fn claim_identity(member: &MemberIdentity, pod_name: &str) -> MemberIdentity {
    let mut identity = member.clone();
    identity
        .labels
        .insert(LABEL_POD_NAME.to_string(), pod_name.to_string());
    identity
}

pub struct KubeMetaManager {
    client: Client,
    workload: TierWorkload,
}

impl KubeMetaManager {
    pub fn new(client: Client, workload: TierWorkload) -> Self {
        Self { client, workload }
    }
}

#[async_trait]
impl MetaManager for KubeMetaManager {
    async fn sync(&self, cluster: &DbCluster) -> Result<()> {
        let ns = cluster
            .namespace()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &ns);
        let claims: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), &ns);
        let params = PatchParams::apply(FIELD_MANAGER);

        for tier in Tier::ALL {
            for pod in self.workload.list_tier_pods(cluster, tier).await? {
                let pod_name = pod.name_any();
                let Some(identity) = member_identity(cluster, tier, &pod_name) else {
                    continue;
                };

                if !identity.is_applied(&pod.metadata) {
                    pods.patch(&pod_name, &params, &Patch::Merge(&identity.merge_patch()))
                        .await?;
                    debug!(pod = %pod_name, "updated member identity");
                }

                if tier == Tier::Query {
                    continue;
                }

                let claim_name = data_claim_name(&pod_name);
                let Some(claim) = claims.get_opt(&claim_name).await? else {
                    continue;
                };
                let identity = claim_identity(&identity, &pod_name);
                if !identity.is_applied(&claim.metadata) {
                    claims
                        .patch(&claim_name, &params, &Patch::Merge(&identity.merge_patch()))
                        .await?;
                    debug!(claim = %claim_name, "updated claim identity");
                }
            }
        }

        Ok(())
    }
}
