//! Orphan pod cleaner
//!
//! A pod is orphaned when its ordinal is outside the tier's desired range or
//! when the StatefulSet that created it is gone. Such pods are left behind by
//! interrupted scale-downs and by failed provisioning.

use std::collections::BTreeSet;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{DeleteParams, ListParams, Preconditions};
use kube::{Api, Client, ResourceExt};
use tracing::info;

use crate::controller::error::{Error, Result};
use crate::crd::{DbCluster, Tier};
use crate::manager::OrphanPodCleaner;
use crate::resources::common::{
    LABEL_COMPONENT, cluster_labels, label_selector, pod_ordinal,
};

/// A pod selected for deletion
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrphanPod {
    pub name: String,
    pub uid: Option<String>,
}

/// StatefulSet controlling `pod`, if any
fn owning_workload(pod: &Pod) -> Option<&str> {
    pod.owner_references()
        .iter()
        .find(|o| o.kind == "StatefulSet" && o.controller == Some(true))
        .map(|o| o.name.as_str())
}

/// Select the orphans among `pods`, all of which belong to `cluster`.
///
/// `workloads` holds the names of the cluster's StatefulSets that still
/// exist. Pods already being deleted are skipped.
pub fn find_orphans(cluster: &DbCluster, pods: &[Pod], workloads: &BTreeSet<String>) -> Vec<OrphanPod> {
    pods.iter()
        .filter(|pod| pod.metadata.deletion_timestamp.is_none())
        .filter(|pod| is_orphan(cluster, pod, workloads))
        .map(|pod| OrphanPod {
            name: pod.name_any(),
            uid: pod.metadata.uid.clone(),
        })
        .collect()
}

fn is_orphan(cluster: &DbCluster, pod: &Pod, workloads: &BTreeSet<String>) -> bool {
    let Some(workload) = owning_workload(pod) else {
        return true;
    };
    if !workloads.contains(workload) {
        return true;
    }

    let tier = pod
        .labels()
        .get(LABEL_COMPONENT)
        .and_then(|t| Tier::from_label(t));
    let Some(tier) = tier else {
        return true;
    };

    match pod_ordinal(workload, &pod.name_any()) {
        Some(ordinal) => ordinal >= cluster.spec.replicas(tier),
        None => true,
    }
}

pub struct KubeOrphanPodCleaner {
    client: Client,
}

impl KubeOrphanPodCleaner {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OrphanPodCleaner for KubeOrphanPodCleaner {
    async fn clean(&self, cluster: &DbCluster) -> Result<Vec<String>> {
        let ns = cluster
            .namespace()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &ns);
        let statefulsets: Api<StatefulSet> = Api::namespaced(self.client.clone(), &ns);

        let params = ListParams::default().labels(&label_selector(&cluster_labels(&cluster.name_any())));
        let workloads: BTreeSet<String> = statefulsets
            .list(&params)
            .await?
            .items
            .iter()
            .map(|sts| sts.name_any())
            .collect();
        let candidates = pods.list(&params).await?.items;

        let mut deleted = Vec::new();
        for orphan in find_orphans(cluster, &candidates, &workloads) {
            // The uid precondition keeps a recreated pod of the same name alive
            let delete = DeleteParams {
                preconditions: Some(Preconditions {
                    uid: orphan.uid.clone(),
                    resource_version: None,
                }),
                ..Default::default()
            };

            match pods.delete(&orphan.name, &delete).await {
                Ok(_) => {
                    info!(pod = %orphan.name, "deleted orphan pod");
                    deleted.push(orphan.name);
                }
                Err(kube::Error::Api(e)) if e.code == 404 || e.code == 409 => {
                    info!(pod = %orphan.name, code = e.code, "orphan pod already gone or replaced");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(deleted)
    }
}
