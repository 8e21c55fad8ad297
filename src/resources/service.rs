//! Service generation for the cluster tiers
//!
//! Each tier gets a headless peer service giving its members stable DNS
//! names. The metadata and query tiers additionally get a client service:
//! the operator's metadata API client and SQL clients connect through them.

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use kube::core::ObjectMeta;

use crate::crd::{DbCluster, Tier};
use crate::resources::common::{owner_reference, peer_service_name, tier_labels};
use crate::resources::statefulset::{
    METADATA_CLIENT_PORT, METADATA_PEER_PORT, QUERY_PORT, QUERY_STATUS_PORT, STORAGE_PORT,
};

/// Client service name of a tier (`{cluster}-{tier}`)
pub fn client_service_name(cluster_name: &str, tier: Tier) -> String {
    format!("{}-{}", cluster_name, tier.as_str())
}

fn service_port(port: i32, name: &str) -> ServicePort {
    ServicePort {
        port,
        target_port: Some(IntOrString::Int(port)),
        name: Some(name.to_string()),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

/// Generate the headless peer service for `tier`
///
/// Not-ready addresses are published so members can find each other while
/// the tier is still forming.
pub fn generate_peer_service(cluster: &DbCluster, tier: Tier) -> Service {
    let cluster_name = cluster.name_any();
    let labels = tier_labels(&cluster_name, tier);

    let ports = match tier {
        Tier::Metadata => vec![
            service_port(METADATA_CLIENT_PORT, "client"),
            service_port(METADATA_PEER_PORT, "peer"),
        ],
        Tier::Storage => vec![service_port(STORAGE_PORT, "store")],
        Tier::Query => vec![service_port(QUERY_STATUS_PORT, "status")],
    };

    Service {
        metadata: ObjectMeta {
            name: Some(peer_service_name(&cluster_name, tier)),
            namespace: cluster.namespace(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference(cluster)]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            selector: Some(labels),
            ports: Some(ports),
            publish_not_ready_addresses: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Generate the client service for `tier`, if the tier has one
pub fn generate_client_service(cluster: &DbCluster, tier: Tier) -> Option<Service> {
    let ports = match tier {
        Tier::Metadata => vec![service_port(METADATA_CLIENT_PORT, "client")],
        Tier::Query => vec![
            service_port(QUERY_PORT, "sql"),
            service_port(QUERY_STATUS_PORT, "status"),
        ],
        Tier::Storage => return None,
    };

    let cluster_name = cluster.name_any();
    let labels = tier_labels(&cluster_name, tier);

    Some(Service {
        metadata: ObjectMeta {
            name: Some(client_service_name(&cluster_name, tier)),
            namespace: cluster.namespace(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference(cluster)]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(labels),
            ports: Some(ports),
            ..Default::default()
        }),
        ..Default::default()
    })
}
