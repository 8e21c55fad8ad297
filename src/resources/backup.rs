//! Backup volume claim generation
//!
//! When `spec.backup.enabled` is set the cluster gets one extra claim,
//! `{cluster}-backup`, which backup jobs mount. It is owned by the cluster
//! but, unlike the tier data volumes, is not tied to any member.

use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::ResourceExt;
use kube::core::ObjectMeta;
use std::collections::BTreeMap;

use crate::crd::DbCluster;
use crate::resources::common::{LABEL_COMPONENT, cluster_labels, owner_reference};

/// Name of the backup claim for `cluster_name`
pub fn backup_claim_name(cluster_name: &str) -> String {
    format!("{}-backup", cluster_name)
}

/// Generate the backup claim, or `None` when backups are not enabled
pub fn generate_backup_pvc(cluster: &DbCluster) -> Option<PersistentVolumeClaim> {
    let backup = cluster.spec.backup.as_ref().filter(|b| b.enabled)?;
    let cluster_name = cluster.name_any();

    let mut labels = cluster_labels(&cluster_name);
    labels.insert(LABEL_COMPONENT.to_string(), "backup".to_string());

    Some(PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(backup_claim_name(&cluster_name)),
            namespace: cluster.namespace(),
            labels: Some(labels),
            owner_references: Some(vec![owner_reference(cluster)]),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: backup.storage_class_name.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(backup.storage_size.clone()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    })
}
