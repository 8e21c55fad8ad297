use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// DbCluster is the Schema for the dbclusters API
///
/// A cluster is made of three cooperating tiers which are provisioned in order:
/// the metadata (consensus) tier, the storage tier and the stateless query tier.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "dbcluster.example.com",
    version = "v1alpha1",
    kind = "DbCluster",
    plural = "dbclusters",
    shortname = "dbc",
    namespaced,
    status = "DbClusterStatus",
    printcolumn = r#"{"name":"Metadata", "type":"integer", "jsonPath":".spec.metadataTier.replicas"}"#,
    printcolumn = r#"{"name":"Storage", "type":"integer", "jsonPath":".spec.storageTier.replicas"}"#,
    printcolumn = r#"{"name":"Query", "type":"integer", "jsonPath":".spec.queryTier.replicas"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DbClusterSpec {
    /// Consensus tier holding cluster metadata and store placement
    pub metadata_tier: TierSpec,

    /// Storage tier; each member is an independent store
    pub storage_tier: TierSpec,

    /// Stateless SQL query tier
    pub query_tier: QueryTierSpec,

    /// What happens to persistent volumes once their claim is deleted
    #[serde(default)]
    pub reclaim_policy: ReclaimPolicy,

    /// Optional backup volume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupSpec>,
}

/// Spec shared by the stateful tiers
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TierSpec {
    /// Number of members
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Container image
    pub image: String,

    /// Data volume configuration
    pub storage: StorageSpec,

    /// Resource requirements for member pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

/// Spec for the stateless query tier
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryTierSpec {
    /// Number of query servers
    #[serde(default = "default_query_replicas")]
    pub replicas: i32,

    /// Container image
    pub image: String,

    /// Resource requirements for query pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

fn default_replicas() -> i32 {
    3
}

fn default_query_replicas() -> i32 {
    1
}

/// Storage configuration for data volumes
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    /// Storage class name (uses default if not specified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,

    /// Size of the persistent volume (e.g., "10Gi", "100Gi")
    pub size: String,
}

/// Resource requirements for member pods
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceList>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<ResourceList>,
}

/// Resource quantities for CPU and memory
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
pub struct ResourceList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

/// Data retention on claim deletion
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, Default, PartialEq, Eq)]
pub enum ReclaimPolicy {
    /// Keep the volume (and its data) after the claim is gone
    #[default]
    Retain,
    /// Delete the volume together with its claim
    Delete,
}

impl ReclaimPolicy {
    /// Value of `PersistentVolumeSpec.persistentVolumeReclaimPolicy`
    pub fn as_str(&self) -> &'static str {
        match self {
            ReclaimPolicy::Retain => "Retain",
            ReclaimPolicy::Delete => "Delete",
        }
    }
}

/// Backup volume options
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupSpec {
    /// Whether a backup volume claim should exist at all
    #[serde(default)]
    pub enabled: bool,

    /// Requested size (e.g., "100Gi")
    pub storage_size: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
}

/// The three cluster tiers, in provisioning order
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    Metadata,
    Storage,
    Query,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Metadata, Tier::Storage, Tier::Query];

    /// Lowercase name used in resource names and labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Metadata => "metadata",
            Tier::Storage => "storage",
            Tier::Query => "query",
        }
    }

    pub fn from_label(value: &str) -> Option<Tier> {
        Tier::ALL.into_iter().find(|t| t.as_str() == value)
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} tier", self.as_str())
    }
}

impl DbClusterSpec {
    /// Desired member count of a tier
    pub fn replicas(&self, tier: Tier) -> i32 {
        match tier {
            Tier::Metadata => self.metadata_tier.replicas,
            Tier::Storage => self.storage_tier.replicas,
            Tier::Query => self.query_tier.replicas,
        }
    }
}

/// Status of the DbCluster
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DbClusterStatus {
    /// Current phase of the cluster lifecycle
    #[serde(default)]
    pub phase: ClusterPhase,

    #[serde(default)]
    pub metadata_tier: MetadataTierStatus,

    #[serde(default)]
    pub storage_tier: StorageTierStatus,

    #[serde(default)]
    pub query_tier: QueryTierStatus,

    /// Observed generation of the resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Kubernetes-style conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Observed state of the metadata tier
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetadataTierStatus {
    /// Members keyed by member name
    #[serde(default)]
    pub members: BTreeMap<String, MetadataMember>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload: Option<WorkloadStatus>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetadataMember {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_url: Option<String>,

    pub healthy: bool,
}

/// Observed state of the storage tier
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageTierStatus {
    /// Stores keyed by store id
    #[serde(default)]
    pub stores: BTreeMap<String, StorageUnit>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload: Option<WorkloadStatus>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageUnit {
    pub id: String,
    pub pod_name: String,
    pub state: StoreState,
}

/// Store state as reported by the metadata tier
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
pub enum StoreState {
    Up,
    Down,
    Offline,
    Tombstone,
}

impl StoreState {
    /// Only `Up` stores count as available capacity
    pub fn is_available(&self) -> bool {
        matches!(self, StoreState::Up)
    }

    /// Parse the metadata tier's `state_name`. Unknown names are treated as `Down`.
    pub fn from_state_name(name: &str) -> StoreState {
        match name {
            "Up" => StoreState::Up,
            "Offline" => StoreState::Offline,
            "Tombstone" => StoreState::Tombstone,
            _ => StoreState::Down,
        }
    }
}

/// Observed state of the query tier
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryTierStatus {
    /// Query servers keyed by pod name
    #[serde(default)]
    pub members: BTreeMap<String, QueryMember>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload: Option<WorkloadStatus>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryMember {
    pub name: String,
    pub healthy: bool,
}

/// Snapshot of a tier's StatefulSet status
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadStatus {
    #[serde(default)]
    pub replicas: i32,

    #[serde(default)]
    pub ready_replicas: i32,

    #[serde(default)]
    pub updated_replicas: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_revision: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_revision: Option<String>,
}

/// Ready replica count of an optional workload status (absent means none ready)
pub fn ready_replicas(workload: Option<&WorkloadStatus>) -> i32 {
    workload.map(|w| w.ready_replicas).unwrap_or(0)
}

/// Cluster lifecycle phase
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, Default, PartialEq, Eq)]
pub enum ClusterPhase {
    /// Cluster has not been reconciled yet
    #[default]
    Pending,
    /// Tiers are being provisioned or are waiting on a readiness gate
    Progressing,
    /// Every stage of the last pass succeeded
    Running,
    /// The last pass stopped on a hard error
    Failed,
}

impl std::fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterPhase::Pending => write!(f, "Pending"),
            ClusterPhase::Progressing => write!(f, "Progressing"),
            ClusterPhase::Running => write!(f, "Running"),
            ClusterPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Kubernetes-style condition
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition: True, False, or Unknown
    pub status: String,

    /// Reason for the condition's last transition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    pub last_transition_time: String,

    /// Generation observed when condition was set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
