//! Metadata tier member manager

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{debug, warn};

use crate::crd::{DbCluster, MetadataMember, MetadataTierStatus, Tier, ready_replicas};
use crate::manager::workload::TierWorkload;
use crate::manager::{TierMemberManager, TierStatus, TierSyncError};
use crate::metadata_client::{MemberHealth, MetadataTierClient};

/// Reconciles the metadata tier's workload and reports member health as seen
/// by the tier itself.
pub struct MetadataMemberManager {
    workload: TierWorkload,
    api: Arc<dyn MetadataTierClient>,
}

impl MetadataMemberManager {
    pub fn new(workload: TierWorkload, api: Arc<dyn MetadataTierClient>) -> Self {
        Self { workload, api }
    }
}

#[async_trait]
impl TierMemberManager for MetadataMemberManager {
    fn tier(&self) -> Tier {
        Tier::Metadata
    }

    async fn sync(&self, cluster: &DbCluster) -> Result<TierStatus, TierSyncError> {
        let workload = self.workload.apply_tier(cluster, Tier::Metadata).await?;
        let mut status = MetadataTierStatus {
            members: BTreeMap::new(),
            workload,
        };

        // Nothing can answer yet
        if ready_replicas(status.workload.as_ref()) == 0 {
            debug!(cluster = %cluster.name_any(), "no metadata member ready, skipping health check");
            return Ok(TierStatus::Metadata(status));
        }

        match self.api.members_health(cluster).await {
            Ok(health) => {
                status.members = members_from_health(health);
                Ok(TierStatus::Metadata(status))
            }
            Err(e) => {
                warn!(cluster = %cluster.name_any(), error = %e, "metadata tier health check failed");
                Err(TierSyncError::with_observed(e, TierStatus::Metadata(status)))
            }
        }
    }
}

/// Member map keyed by member name
pub fn members_from_health(health: Vec<MemberHealth>) -> BTreeMap<String, MetadataMember> {
    health
        .into_iter()
        .map(|m| {
            let member = MetadataMember {
                name: m.name.clone(),
                id: Some(m.member_id.to_string()),
                client_url: m.client_urls.into_iter().next(),
                healthy: m.health,
            };
            (m.name, member)
        })
        .collect()
}
