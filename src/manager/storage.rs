//! Storage tier member manager

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{debug, warn};

use crate::crd::{DbCluster, StorageTierStatus, StorageUnit, Tier, ready_replicas};
use crate::manager::workload::TierWorkload;
use crate::manager::{TierMemberManager, TierStatus, TierSyncError};
use crate::metadata_client::{MetadataTierClient, StoreInfo};
use crate::resources::common::{pod_ordinal, workload_name};

/// Reconciles the storage tier's workload and reports the stores the
/// metadata tier knows for it.
pub struct StorageMemberManager {
    workload: TierWorkload,
    api: Arc<dyn MetadataTierClient>,
}

impl StorageMemberManager {
    pub fn new(workload: TierWorkload, api: Arc<dyn MetadataTierClient>) -> Self {
        Self { workload, api }
    }
}

#[async_trait]
impl TierMemberManager for StorageMemberManager {
    fn tier(&self) -> Tier {
        Tier::Storage
    }

    async fn sync(&self, cluster: &DbCluster) -> Result<TierStatus, TierSyncError> {
        let workload = self.workload.apply_tier(cluster, Tier::Storage).await?;
        let mut status = StorageTierStatus {
            stores: BTreeMap::new(),
            workload,
        };

        if ready_replicas(status.workload.as_ref()) == 0 {
            debug!(cluster = %cluster.name_any(), "no store ready, skipping store listing");
            return Ok(TierStatus::Storage(status));
        }

        match self.api.stores(cluster).await {
            Ok(stores) => {
                status.stores = stores_for_workload(
                    &workload_name(&cluster.name_any(), Tier::Storage),
                    &stores,
                );
                Ok(TierStatus::Storage(status))
            }
            Err(e) => {
                warn!(cluster = %cluster.name_any(), error = %e, "listing stores failed");
                Err(TierSyncError::with_observed(e, TierStatus::Storage(status)))
            }
        }
    }
}

/// Stores served by pods of `workload`, keyed by store id
pub fn stores_for_workload(workload: &str, stores: &[StoreInfo]) -> BTreeMap<String, StorageUnit> {
    stores
        .iter()
        .filter(|s| pod_ordinal(workload, s.pod_name()).is_some())
        .map(|s| (s.id.to_string(), s.to_storage_unit()))
        .collect()
}
