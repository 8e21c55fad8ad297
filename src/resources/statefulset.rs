//! StatefulSet generation for the three cluster tiers
//!
//! Every tier runs as one StatefulSet named `{cluster}-{tier}` behind a
//! headless peer service. The metadata and storage tiers carry a `data`
//! volume claim template; the query tier is stateless.

use k8s_openapi::api::apps::v1::{
    RollingUpdateStatefulSetStrategy, StatefulSet, StatefulSetPersistentVolumeClaimRetentionPolicy,
    StatefulSetSpec, StatefulSetUpdateStrategy,
};
use k8s_openapi::api::core::v1::{
    Affinity, Container, ContainerPort, EnvVar, EnvVarSource, HTTPGetAction, ObjectFieldSelector,
    PersistentVolumeClaim, PersistentVolumeClaimSpec, PodAffinityTerm, PodAntiAffinity, PodSpec,
    PodTemplateSpec, Probe, ResourceRequirements, TCPSocketAction, VolumeMount,
    VolumeResourceRequirements, WeightedPodAffinityTerm,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use kube::core::ObjectMeta;
use std::collections::BTreeMap;

use crate::crd::{self, DbCluster, StorageSpec, Tier};
use crate::resources::common::{
    DATA_VOLUME, owner_reference, peer_service_name, tier_labels, workload_name,
};
use crate::resources::service::client_service_name;

/// Metadata tier client port (member health and store listing API)
pub const METADATA_CLIENT_PORT: i32 = 2379;
/// Metadata tier peer port (consensus traffic)
pub const METADATA_PEER_PORT: i32 = 2380;
/// Storage tier store port
pub const STORAGE_PORT: i32 = 20160;
/// Query tier SQL port
pub const QUERY_PORT: i32 = 4000;
/// Query tier status port
pub const QUERY_STATUS_PORT: i32 = 10080;

const DATA_MOUNT_PATH: &str = "/var/lib/dbcluster";

/// Generate the StatefulSet for `tier`
pub fn generate_statefulset(cluster: &DbCluster, tier: Tier) -> StatefulSet {
    let cluster_name = cluster.name_any();
    let name = workload_name(&cluster_name, tier);
    let labels = tier_labels(&cluster_name, tier);

    let (image, resources, storage) = match tier {
        Tier::Metadata => (
            &cluster.spec.metadata_tier.image,
            cluster.spec.metadata_tier.resources.as_ref(),
            Some(&cluster.spec.metadata_tier.storage),
        ),
        Tier::Storage => (
            &cluster.spec.storage_tier.image,
            cluster.spec.storage_tier.resources.as_ref(),
            Some(&cluster.spec.storage_tier.storage),
        ),
        Tier::Query => (
            &cluster.spec.query_tier.image,
            cluster.spec.query_tier.resources.as_ref(),
            None,
        ),
    };

    let container = Container {
        name: tier.as_str().to_string(),
        image: Some(image.clone()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        ports: Some(container_ports(tier)),
        env: Some(env_vars(cluster, tier)),
        volume_mounts: storage.map(|_| {
            vec![VolumeMount {
                name: DATA_VOLUME.to_string(),
                mount_path: DATA_MOUNT_PATH.to_string(),
                ..Default::default()
            }]
        }),
        resources: resources.map(resource_requirements),
        readiness_probe: Some(readiness_probe(tier)),
        ..Default::default()
    };

    // Tiers holding quorum or data come up one member at a time
    let pod_management_policy = match tier {
        Tier::Query => "Parallel",
        Tier::Metadata | Tier::Storage => "OrderedReady",
    };

    StatefulSet {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: cluster.namespace(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference(cluster)]),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            service_name: Some(peer_service_name(&cluster_name, tier)),
            replicas: Some(cluster.spec.replicas(tier)),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            update_strategy: Some(StatefulSetUpdateStrategy {
                type_: Some("RollingUpdate".to_string()),
                rolling_update: Some(RollingUpdateStatefulSetStrategy {
                    partition: Some(0),
                    ..Default::default()
                }),
            }),
            pod_management_policy: Some(pod_management_policy.to_string()),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels.clone()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    termination_grace_period_seconds: Some(30),
                    affinity: Some(anti_affinity(labels.clone())),
                    ..Default::default()
                }),
            },
            volume_claim_templates: storage.map(|s| vec![data_claim_template(s, labels.clone())]),
            // Volume lifetime is governed by the reclaim policy manager
            persistent_volume_claim_retention_policy: storage.map(|_| {
                StatefulSetPersistentVolumeClaimRetentionPolicy {
                    when_deleted: Some("Retain".to_string()),
                    when_scaled: Some("Retain".to_string()),
                }
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn container_ports(tier: Tier) -> Vec<ContainerPort> {
    let port = |number: i32, name: &str| ContainerPort {
        container_port: number,
        name: Some(name.to_string()),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    };

    match tier {
        Tier::Metadata => vec![
            port(METADATA_CLIENT_PORT, "client"),
            port(METADATA_PEER_PORT, "peer"),
        ],
        Tier::Storage => vec![port(STORAGE_PORT, "store")],
        Tier::Query => vec![port(QUERY_PORT, "sql"), port(QUERY_STATUS_PORT, "status")],
    }
}

fn env_vars(cluster: &DbCluster, tier: Tier) -> Vec<EnvVar> {
    let cluster_name = cluster.name_any();
    let field_ref = |name: &str, path: &str| EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: path.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    };
    let value = |name: &str, value: String| EnvVar {
        name: name.to_string(),
        value: Some(value),
        ..Default::default()
    };

    let mut env = vec![
        field_ref("POD_NAME", "metadata.name"),
        field_ref("NAMESPACE", "metadata.namespace"),
        value("CLUSTER_NAME", cluster_name.clone()),
        value("PEER_SERVICE", peer_service_name(&cluster_name, tier)),
    ];

    match tier {
        Tier::Metadata => {
            env.push(value(
                "INITIAL_CLUSTER_SIZE",
                cluster.spec.metadata_tier.replicas.to_string(),
            ));
        }
        Tier::Storage | Tier::Query => {
            // Both dependent tiers register with the metadata tier
            env.push(value(
                "METADATA_ENDPOINT",
                format!(
                    "http://{}:{}",
                    client_service_name(&cluster_name, Tier::Metadata),
                    METADATA_CLIENT_PORT
                ),
            ));
        }
    }

    env
}

fn readiness_probe(tier: Tier) -> Probe {
    let (http_get, tcp_socket) = match tier {
        Tier::Metadata => (
            Some(HTTPGetAction {
                path: Some("/health".to_string()),
                port: IntOrString::Int(METADATA_CLIENT_PORT),
                scheme: Some("HTTP".to_string()),
                ..Default::default()
            }),
            None,
        ),
        Tier::Storage => (
            None,
            Some(TCPSocketAction {
                port: IntOrString::Int(STORAGE_PORT),
                ..Default::default()
            }),
        ),
        Tier::Query => (
            Some(HTTPGetAction {
                path: Some("/status".to_string()),
                port: IntOrString::Int(QUERY_STATUS_PORT),
                scheme: Some("HTTP".to_string()),
                ..Default::default()
            }),
            None,
        ),
    };

    Probe {
        http_get,
        tcp_socket,
        initial_delay_seconds: Some(5),
        period_seconds: Some(10),
        timeout_seconds: Some(5),
        success_threshold: Some(1),
        failure_threshold: Some(3),
        ..Default::default()
    }
}

/// Convert the CRD's resource requirements into the core API type
fn resource_requirements(r: &crd::ResourceRequirements) -> ResourceRequirements {
    let to_map = |list: &crd::ResourceList| {
        let mut map = BTreeMap::new();
        if let Some(cpu) = &list.cpu {
            map.insert("cpu".to_string(), Quantity(cpu.clone()));
        }
        if let Some(memory) = &list.memory {
            map.insert("memory".to_string(), Quantity(memory.clone()));
        }
        map
    };

    ResourceRequirements {
        limits: r.limits.as_ref().map(to_map),
        requests: r.requests.as_ref().map(to_map),
        ..Default::default()
    }
}

fn data_claim_template(
    storage: &StorageSpec,
    labels: BTreeMap<String, String>,
) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(DATA_VOLUME.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: storage.storage_class.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(storage.size.clone()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Prefer spreading a tier's members across nodes
fn anti_affinity(labels: BTreeMap<String, String>) -> Affinity {
    Affinity {
        pod_anti_affinity: Some(PodAntiAffinity {
            preferred_during_scheduling_ignored_during_execution: Some(vec![
                WeightedPodAffinityTerm {
                    weight: 100,
                    pod_affinity_term: PodAffinityTerm {
                        label_selector: Some(LabelSelector {
                            match_labels: Some(labels),
                            ..Default::default()
                        }),
                        topology_key: "kubernetes.io/hostname".to_string(),
                        ..Default::default()
                    },
                },
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
