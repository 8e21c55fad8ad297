//! Test fixtures and builders for DbCluster resources
//!
//! # Quick Start
//!
//! ```rust,ignore
//! let cluster = create_test_cluster("my-cluster", "default");
//!
//! let cluster = DbClusterBuilder::new("my-cluster", "default")
//!     .with_replicas(3, 3, 2)
//!     .with_reclaim_policy(ReclaimPolicy::Delete)
//!     .with_status(converged_status(3, 3, 2))
//!     .build();
//! ```

use std::collections::BTreeMap;

use dbcluster_operator::crd::{
    BackupSpec, DbCluster, DbClusterSpec, DbClusterStatus, MetadataMember, MetadataTierStatus,
    QueryMember, QueryTierSpec, QueryTierStatus, ReclaimPolicy, StorageSpec, StorageTierStatus,
    StorageUnit, StoreState, Tier, TierSpec, WorkloadStatus,
};
use dbcluster_operator::resources::common::{LABEL_COMPONENT, tier_labels, workload_name};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::core::ObjectMeta;

// =============================================================================
// Convenience Functions for Simple Test Cases
// =============================================================================

/// Create a cluster with three members in every stateful tier and one query server
pub fn create_test_cluster(name: &str, namespace: &str) -> DbCluster {
    DbClusterBuilder::new(name, namespace)
        .with_uid("test-uid-12345")
        .build()
}

// =============================================================================
// DbCluster Builder
// =============================================================================

/// Builder for DbCluster test fixtures
#[allow(dead_code)]
pub struct DbClusterBuilder {
    name: String,
    namespace: String,
    uid: Option<String>,
    generation: Option<i64>,
    metadata_replicas: i32,
    storage_replicas: i32,
    query_replicas: i32,
    storage_size: String,
    storage_class: Option<String>,
    reclaim_policy: ReclaimPolicy,
    backup: Option<BackupSpec>,
    status: Option<DbClusterStatus>,
}

#[allow(dead_code)]
impl DbClusterBuilder {
    pub fn new(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            uid: None,
            generation: Some(1),
            metadata_replicas: 3,
            storage_replicas: 3,
            query_replicas: 1,
            storage_size: "10Gi".to_string(),
            storage_class: None,
            reclaim_policy: ReclaimPolicy::Retain,
            backup: None,
            status: None,
        }
    }

    /// Set the resource UID (for owner references)
    pub fn with_uid(mut self, uid: &str) -> Self {
        self.uid = Some(uid.to_string());
        self
    }

    pub fn with_generation(mut self, generation: i64) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Set the desired member count of every tier
    pub fn with_replicas(mut self, metadata: i32, storage: i32, query: i32) -> Self {
        self.metadata_replicas = metadata;
        self.storage_replicas = storage;
        self.query_replicas = query;
        self
    }

    /// Set data volume configuration of both stateful tiers
    pub fn with_storage(mut self, size: &str, class: Option<&str>) -> Self {
        self.storage_size = size.to_string();
        self.storage_class = class.map(String::from);
        self
    }

    pub fn with_reclaim_policy(mut self, policy: ReclaimPolicy) -> Self {
        self.reclaim_policy = policy;
        self
    }

    pub fn with_backup(mut self, size: &str, class: Option<&str>, enabled: bool) -> Self {
        self.backup = Some(BackupSpec {
            enabled,
            storage_size: size.to_string(),
            storage_class_name: class.map(String::from),
        });
        self
    }

    pub fn with_status(mut self, status: DbClusterStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn build(self) -> DbCluster {
        let storage = StorageSpec {
            storage_class: self.storage_class,
            size: self.storage_size,
        };

        DbCluster {
            metadata: ObjectMeta {
                name: Some(self.name),
                namespace: Some(self.namespace),
                uid: self.uid,
                generation: self.generation,
                ..Default::default()
            },
            spec: DbClusterSpec {
                metadata_tier: TierSpec {
                    replicas: self.metadata_replicas,
                    image: "registry.example.com/metadata:v7.5".to_string(),
                    storage: storage.clone(),
                    resources: None,
                },
                storage_tier: TierSpec {
                    replicas: self.storage_replicas,
                    image: "registry.example.com/storage:v7.5".to_string(),
                    storage,
                    resources: None,
                },
                query_tier: QueryTierSpec {
                    replicas: self.query_replicas,
                    image: "registry.example.com/query:v7.5".to_string(),
                    resources: None,
                },
                reclaim_policy: self.reclaim_policy,
                backup: self.backup,
            },
            status: self.status,
        }
    }
}

// =============================================================================
// Tier status helpers
// =============================================================================

pub fn workload(ready: i32) -> Option<WorkloadStatus> {
    Some(WorkloadStatus {
        replicas: ready,
        ready_replicas: ready,
        updated_replicas: ready,
        ..Default::default()
    })
}

/// Metadata tier with `healthy` healthy and `unhealthy` unhealthy members
pub fn metadata_status(healthy: usize, unhealthy: usize, ready: i32) -> MetadataTierStatus {
    let members = (0..healthy + unhealthy)
        .map(|i| {
            let name = format!("test-metadata-{}", i);
            let member = MetadataMember {
                name: name.clone(),
                id: Some(format!("{}", 1000 + i)),
                client_url: None,
                healthy: i < healthy,
            };
            (name, member)
        })
        .collect();

    MetadataTierStatus {
        members,
        workload: workload(ready),
    }
}

/// Storage tier with one store per entry of `states`
pub fn storage_status(states: &[StoreState], ready: i32) -> StorageTierStatus {
    let stores = states
        .iter()
        .enumerate()
        .map(|(i, state)| {
            let id = format!("{}", i + 1);
            let unit = StorageUnit {
                id: id.clone(),
                pod_name: format!("test-storage-{}", i),
                state: *state,
            };
            (id, unit)
        })
        .collect();

    StorageTierStatus {
        stores,
        workload: workload(ready),
    }
}

pub fn query_status(members: usize, ready: i32) -> QueryTierStatus {
    let members = (0..members)
        .map(|i| {
            let name = format!("test-query-{}", i);
            (
                name.clone(),
                QueryMember {
                    name,
                    healthy: true,
                },
            )
        })
        .collect::<BTreeMap<_, _>>();

    QueryTierStatus {
        members,
        workload: workload(ready),
    }
}

/// Status of a fully provisioned cluster
pub fn converged_status(metadata: i32, storage: i32, query: i32) -> DbClusterStatus {
    DbClusterStatus {
        metadata_tier: metadata_status(metadata as usize, 0, metadata),
        storage_tier: storage_status(&vec![StoreState::Up; storage as usize], storage),
        query_tier: query_status(query as usize, query),
        ..Default::default()
    }
}

// =============================================================================
// Pod fixtures
// =============================================================================

/// A pod of `tier` created by the StatefulSet `owner`
pub fn tier_pod(cluster: &str, tier: Tier, ordinal: i32, owner: Option<&str>) -> Pod {
    let workload = workload_name(cluster, tier);
    let name = format!("{}-{}", workload, ordinal);

    Pod {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some("default".to_string()),
            uid: Some(format!("uid-{}", name)),
            labels: Some(tier_labels(cluster, tier)),
            owner_references: owner.map(|owner| {
                vec![OwnerReference {
                    api_version: "apps/v1".to_string(),
                    kind: "StatefulSet".to_string(),
                    name: owner.to_string(),
                    uid: format!("uid-{}", owner),
                    controller: Some(true),
                    block_owner_deletion: Some(true),
                }]
            }),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// A pod of `tier` owned by that tier's StatefulSet
pub fn owned_pod(cluster: &str, tier: Tier, ordinal: i32) -> Pod {
    tier_pod(cluster, tier, ordinal, Some(&workload_name(cluster, tier)))
}

/// Drop the tier label from a pod
pub fn without_tier_label(mut pod: Pod) -> Pod {
    if let Some(labels) = pod.metadata.labels.as_mut() {
        labels.remove(LABEL_COMPONENT);
    }
    pod
}
