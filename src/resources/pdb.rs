//! PodDisruptionBudget generation for the metadata tier
//!
//! Voluntary disruptions (node drains, upgrades) must never take the
//! metadata tier below quorum.

use k8s_openapi::api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use kube::core::ObjectMeta;

use crate::crd::{DbCluster, Tier};
use crate::resources::common::{owner_reference, tier_labels, workload_name};

/// Smallest member count holding a strict majority of `replicas`
pub fn quorum_size(replicas: i32) -> i32 {
    replicas / 2 + 1
}

/// Members the PodDisruptionBudget keeps available
///
/// - 1 member: min_available = 0 (allow disruption, will cause downtime)
/// - 3 members: min_available = 2
/// - 5 members: min_available = 3
pub fn min_available(replicas: i32) -> i32 {
    match replicas {
        // A lone member has no quorum to protect; blocking it would hang node drains
        1 => 0,
        n => quorum_size(n),
    }
}

/// Generate the metadata tier's PodDisruptionBudget
pub fn generate_metadata_pdb(cluster: &DbCluster) -> PodDisruptionBudget {
    let cluster_name = cluster.name_any();
    let labels = tier_labels(&cluster_name, Tier::Metadata);

    PodDisruptionBudget {
        metadata: ObjectMeta {
            name: Some(workload_name(&cluster_name, Tier::Metadata)),
            namespace: cluster.namespace(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference(cluster)]),
            ..Default::default()
        },
        spec: Some(PodDisruptionBudgetSpec {
            min_available: Some(IntOrString::Int(min_available(
                cluster.spec.metadata_tier.replicas,
            ))),
            selector: Some(LabelSelector {
                match_labels: Some(labels),
                ..Default::default()
            }),
            // Use IfHealthyBudget to allow eviction if pod is unhealthy
            unhealthy_pod_eviction_policy: Some("IfHealthyBudget".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}
