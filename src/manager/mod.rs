//! Pipeline collaborators
//!
//! Every stage of the reconciliation pipeline is reached through one of the
//! traits in this module so the controller can be driven against recording
//! fakes in tests. Stages receive the cluster by shared reference and never
//! mutate it; tier managers hand their observations back as a [`TierStatus`]
//! fragment which the controller merges into its working copy.

pub mod meta;
pub mod metadata;
pub mod orphan;
pub mod query;
pub mod reclaim_policy;
pub mod storage;
pub mod workload;

use async_trait::async_trait;

use crate::controller::error::{Error, Result};
use crate::crd::{
    DbCluster, DbClusterStatus, MetadataTierStatus, QueryTierStatus, StorageTierStatus, Tier,
};

pub use meta::KubeMetaManager;
pub use metadata::MetadataMemberManager;
pub use orphan::KubeOrphanPodCleaner;
pub use query::QueryMemberManager;
pub use reclaim_policy::KubeReclaimPolicyManager;
pub use storage::StorageMemberManager;
pub use workload::TierWorkload;

/// Observed status of a single tier, produced by that tier's member manager
#[derive(Clone, Debug, PartialEq)]
pub enum TierStatus {
    Metadata(MetadataTierStatus),
    Storage(StorageTierStatus),
    Query(QueryTierStatus),
}

impl TierStatus {
    pub fn tier(&self) -> Tier {
        match self {
            TierStatus::Metadata(_) => Tier::Metadata,
            TierStatus::Storage(_) => Tier::Storage,
            TierStatus::Query(_) => Tier::Query,
        }
    }

    /// Replace the tier's section of `status` wholesale
    pub fn merge_into(self, status: &mut DbClusterStatus) {
        match self {
            TierStatus::Metadata(s) => status.metadata_tier = s,
            TierStatus::Storage(s) => status.storage_tier = s,
            TierStatus::Query(s) => status.query_tier = s,
        }
    }
}

/// Failed tier sync, carrying whatever status could still be observed
#[derive(Debug)]
pub struct TierSyncError {
    pub observed: Option<TierStatus>,
    pub error: Error,
}

impl TierSyncError {
    pub fn new(error: impl Into<Error>) -> Self {
        Self {
            observed: None,
            error: error.into(),
        }
    }

    pub fn with_observed(error: impl Into<Error>, observed: TierStatus) -> Self {
        Self {
            observed: Some(observed),
            error: error.into(),
        }
    }
}

impl From<Error> for TierSyncError {
    fn from(error: Error) -> Self {
        TierSyncError::new(error)
    }
}

impl From<kube::Error> for TierSyncError {
    fn from(error: kube::Error) -> Self {
        TierSyncError::new(error)
    }
}

/// Reconciles one tier's workload and reports the tier's observed status.
///
/// Implementations must be idempotent: calling `sync` against an already
/// converged cluster changes nothing.
#[async_trait]
pub trait TierMemberManager: Send + Sync {
    fn tier(&self) -> Tier;

    async fn sync(&self, cluster: &DbCluster) -> std::result::Result<TierStatus, TierSyncError>;
}

/// Keeps persistent volume reclaim policies in line with `spec.reclaimPolicy`
#[async_trait]
pub trait ReclaimPolicyManager: Send + Sync {
    async fn sync(&self, cluster: &DbCluster) -> Result<()>;
}

/// Publishes per-member identity (ordinal, tier, cluster) onto member resources
#[async_trait]
pub trait MetaManager: Send + Sync {
    async fn sync(&self, cluster: &DbCluster) -> Result<()>;
}

/// Removes pods that no longer map to a live ordinal of their tier
#[async_trait]
pub trait OrphanPodCleaner: Send + Sync {
    /// Returns the names of the deleted pods
    async fn clean(&self, cluster: &DbCluster) -> Result<Vec<String>>;
}
