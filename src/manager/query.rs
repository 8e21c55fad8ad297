//! Query tier member manager
//!
//! Query servers are stateless and do not register anywhere, so their health
//! is the pods' readiness.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;

use crate::crd::{DbCluster, QueryMember, QueryTierStatus, Tier};
use crate::manager::workload::{TierWorkload, pod_is_ready};
use crate::manager::{TierMemberManager, TierStatus, TierSyncError};

pub struct QueryMemberManager {
    workload: TierWorkload,
}

impl QueryMemberManager {
    pub fn new(workload: TierWorkload) -> Self {
        Self { workload }
    }
}

#[async_trait]
impl TierMemberManager for QueryMemberManager {
    fn tier(&self) -> Tier {
        Tier::Query
    }

    async fn sync(&self, cluster: &DbCluster) -> Result<TierStatus, TierSyncError> {
        let workload = self.workload.apply_tier(cluster, Tier::Query).await?;
        let mut status = QueryTierStatus {
            members: BTreeMap::new(),
            workload,
        };

        match self.workload.list_tier_pods(cluster, Tier::Query).await {
            Ok(pods) => {
                status.members = query_members(&pods);
                Ok(TierStatus::Query(status))
            }
            Err(e) => Err(TierSyncError::with_observed(e, TierStatus::Query(status))),
        }
    }
}

/// Member map keyed by pod name
pub fn query_members(pods: &[Pod]) -> BTreeMap<String, QueryMember> {
    pods.iter()
        .filter_map(|pod| {
            let name = pod.metadata.name.clone()?;
            let member = QueryMember {
                name: name.clone(),
                healthy: pod_is_ready(pod),
            };
            Some((name, member))
        })
        .collect()
}
