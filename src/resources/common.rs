//! Common utilities for Kubernetes resource generation
//!
//! Shared names, labels and owner references used by every resource
//! generator and by the managers that look resources up again by label.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::crd::{DbCluster, Tier};

/// API version for DbCluster CRD
pub const API_VERSION: &str = "dbcluster.example.com/v1alpha1";

/// Kind for DbCluster CRD
pub const KIND: &str = "DbCluster";

/// Operator field manager name for server-side apply
pub const FIELD_MANAGER: &str = "dbcluster-operator";

pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Member identity labels written by the meta manager
pub const LABEL_CLUSTER_ID: &str = "dbcluster.example.com/cluster-id";
pub const LABEL_ORDINAL: &str = "dbcluster.example.com/ordinal";
pub const LABEL_POD_NAME: &str = "dbcluster.example.com/pod-name";
pub const ANNOTATION_MEMBER_ID: &str = "dbcluster.example.com/member-id";
pub const ANNOTATION_STORE_ID: &str = "dbcluster.example.com/store-id";

/// Name of the data volume claim template in every stateful tier
pub const DATA_VOLUME: &str = "data";

/// Generate an owner reference for a DbCluster
///
/// Child resources are garbage collected together with the cluster.
pub fn owner_reference(cluster: &DbCluster) -> OwnerReference {
    OwnerReference {
        api_version: API_VERSION.to_string(),
        kind: KIND.to_string(),
        name: cluster.name_any(),
        uid: cluster.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Labels shared by every resource of a cluster
pub fn cluster_labels(cluster_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_NAME.to_string(), "dbcluster".to_string()),
        (LABEL_INSTANCE.to_string(), cluster_name.to_string()),
        (LABEL_MANAGED_BY.to_string(), FIELD_MANAGER.to_string()),
    ])
}

/// Labels of a single tier's resources; also its pod selector
pub fn tier_labels(cluster_name: &str, tier: Tier) -> BTreeMap<String, String> {
    let mut labels = cluster_labels(cluster_name);
    labels.insert(LABEL_COMPONENT.to_string(), tier.as_str().to_string());
    labels
}

/// Render labels as a list selector (`k=v,k=v`)
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// StatefulSet name of a tier
pub fn workload_name(cluster_name: &str, tier: Tier) -> String {
    format!("{}-{}", cluster_name, tier.as_str())
}

/// Headless service giving members stable DNS names for peer discovery
pub fn peer_service_name(cluster_name: &str, tier: Tier) -> String {
    format!("{}-{}-peer", cluster_name, tier.as_str())
}

/// Ordinal of a StatefulSet pod, if `pod_name` belongs to `workload`
pub fn pod_ordinal(workload: &str, pod_name: &str) -> Option<i32> {
    pod_name
        .strip_prefix(workload)?
        .strip_prefix('-')?
        .parse()
        .ok()
}

/// Claim name the StatefulSet controller creates for a member's data volume
pub fn data_claim_name(pod_name: &str) -> String {
    format!("{}-{}", DATA_VOLUME, pod_name)
}
