//! Workload layer shared by the tier member managers
//!
//! Applies a tier's generated resources with server-side apply and reads the
//! StatefulSet's status back. Whether an apply actually changes anything is
//! left to the API server, so applying an unchanged spec is a no-op.

use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::controller::error::{Error, Result};
use crate::crd::{DbCluster, Tier, WorkloadStatus};
use crate::resources::common::{FIELD_MANAGER, label_selector, tier_labels};
use crate::resources::{pdb, service, statefulset};

/// Applies and observes per-tier workloads
#[derive(Clone)]
pub struct TierWorkload {
    client: Client,
}

impl TierWorkload {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Apply every resource `tier` needs and return its workload status.
    ///
    /// Peer discovery comes first so members can resolve each other as soon
    /// as the StatefulSet starts them.
    pub async fn apply_tier(&self, cluster: &DbCluster, tier: Tier) -> Result<Option<WorkloadStatus>> {
        let ns = namespace(cluster)?;

        self.apply(&ns, &service::generate_peer_service(cluster, tier))
            .await?;
        if let Some(svc) = service::generate_client_service(cluster, tier) {
            self.apply(&ns, &svc).await?;
        }
        if tier == Tier::Metadata {
            self.apply(&ns, &pdb::generate_metadata_pdb(cluster)).await?;
        }

        let sts = self
            .apply(&ns, &statefulset::generate_statefulset(cluster, tier))
            .await?;
        Ok(workload_status(&sts))
    }

    /// Pods currently belonging to `tier`
    pub async fn list_tier_pods(&self, cluster: &DbCluster, tier: Tier) -> Result<Vec<Pod>> {
        let ns = namespace(cluster)?;
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &ns);
        let selector = label_selector(&tier_labels(&cluster.name_any(), tier));

        Ok(api.list(&ListParams::default().labels(&selector)).await?.items)
    }

    /// Apply a Kubernetes resource using server-side apply
    pub async fn apply<T>(&self, ns: &str, resource: &T) -> Result<T>
    where
        T: Resource<Scope = NamespaceResourceScope>
            + Serialize
            + DeserializeOwned
            + Clone
            + std::fmt::Debug,
        <T as Resource>::DynamicType: Default,
    {
        let api: Api<T> = Api::namespaced(self.client.clone(), ns);
        let name = resource.name_any();

        let applied = api
            .patch(
                &name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(resource),
            )
            .await?;
        debug!(resource = %name, "applied resource");

        Ok(applied)
    }
}

fn namespace(cluster: &DbCluster) -> Result<String> {
    cluster
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))
}

/// Snapshot of a StatefulSet's status; `None` until the controller reports one
pub fn workload_status(sts: &StatefulSet) -> Option<WorkloadStatus> {
    sts.status.as_ref().map(|s| WorkloadStatus {
        replicas: s.replicas,
        ready_replicas: s.ready_replicas.unwrap_or(0),
        updated_replicas: s.updated_replicas.unwrap_or(0),
        current_revision: s.current_revision.clone(),
        update_revision: s.update_revision.clone(),
    })
}

/// Whether a pod reports the `Ready` condition as true
pub fn pod_is_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}
