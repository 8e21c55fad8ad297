//! Ordered reconciliation pipeline for a single DbCluster
//!
//! One pass runs the stages strictly in this order and stops at the first one
//! that does not succeed:
//!
//! 1. reclaim policy sync
//! 2. metadata tier sync, then the metadata tier gate
//! 3. storage tier sync, then the storage tier gate
//! 4. query tier sync
//! 5. meta (member identity) sync
//! 6. orphan pod cleaning
//!
//! Nothing is rolled back when a stage fails: every stage is idempotent, so the
//! next pass simply starts again from the top. A gate that is not satisfied
//! yields [`Error::Requeue`]; every other failure is wrapped in
//! [`Error::StageError`] naming the stage.

use std::sync::Arc;

use kube::ResourceExt;
use kube::runtime::events::EventType;
use tracing::{debug, info, warn};

use crate::controller::error::{Error, Result, Stage};
use crate::controller::events::{EventRecorder, reasons};
use crate::controller::gates;
use crate::crd::DbCluster;
use crate::manager::{
    MetaManager, OrphanPodCleaner, ReclaimPolicyManager, TierMemberManager, TierStatus,
    TierSyncError,
};

/// Drives a cluster through the pipeline using injected stage implementations
pub struct ClusterControl {
    reclaim_policy: Arc<dyn ReclaimPolicyManager>,
    metadata_tier: Arc<dyn TierMemberManager>,
    storage_tier: Arc<dyn TierMemberManager>,
    query_tier: Arc<dyn TierMemberManager>,
    meta: Arc<dyn MetaManager>,
    orphan_pods: Arc<dyn OrphanPodCleaner>,
    recorder: Arc<dyn EventRecorder>,
}

impl ClusterControl {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reclaim_policy: Arc<dyn ReclaimPolicyManager>,
        metadata_tier: Arc<dyn TierMemberManager>,
        storage_tier: Arc<dyn TierMemberManager>,
        query_tier: Arc<dyn TierMemberManager>,
        meta: Arc<dyn MetaManager>,
        orphan_pods: Arc<dyn OrphanPodCleaner>,
        recorder: Arc<dyn EventRecorder>,
    ) -> Self {
        Self {
            reclaim_policy,
            metadata_tier,
            storage_tier,
            query_tier,
            meta,
            orphan_pods,
            recorder,
        }
    }

    /// Run one reconcile pass against `cluster`.
    ///
    /// `cluster` is the pass's working copy: the only mutation is the merge of
    /// tier status fragments into `cluster.status`, done here between stages.
    pub async fn update_cluster(&self, cluster: &mut DbCluster) -> Result<()> {
        let result = self.run_pipeline(cluster).await;

        match &result {
            Ok(()) => {
                self.recorder
                    .record(
                        cluster,
                        EventType::Normal,
                        reasons::SUCCESSFUL_SYNC,
                        "all tiers are provisioned and ready",
                    )
                    .await;
            }
            Err(e) if e.is_requeue() => {
                info!(cluster = %cluster.name_any(), "{}", e);
            }
            Err(e) => {
                warn!(cluster = %cluster.name_any(), error = %e, "reconcile pass failed");
                self.recorder
                    .record(cluster, EventType::Warning, reasons::FAILED_SYNC, &e.to_string())
                    .await;
            }
        }

        result
    }

    async fn run_pipeline(&self, cluster: &mut DbCluster) -> Result<()> {
        self.reclaim_policy
            .sync(cluster)
            .await
            .map_err(|e| Error::stage(Stage::ReclaimPolicy, e))?;

        self.sync_tier(self.metadata_tier.as_ref(), cluster).await?;
        gates::check_metadata_tier(
            &cluster.spec,
            &cluster.status.get_or_insert_with(Default::default).metadata_tier,
        )?;

        self.sync_tier(self.storage_tier.as_ref(), cluster).await?;
        gates::check_storage_tier(
            &cluster.spec,
            &cluster.status.get_or_insert_with(Default::default).storage_tier,
        )?;

        self.sync_tier(self.query_tier.as_ref(), cluster).await?;

        self.meta
            .sync(cluster)
            .await
            .map_err(|e| Error::stage(Stage::Meta, e))?;

        let deleted = self
            .orphan_pods
            .clean(cluster)
            .await
            .map_err(|e| Error::stage(Stage::OrphanPods, e))?;
        if !deleted.is_empty() {
            info!(pods = ?deleted, "deleted orphan pods");
        }

        Ok(())
    }

    /// Sync one tier and merge whatever status it observed, even on failure
    async fn sync_tier(&self, manager: &dyn TierMemberManager, cluster: &mut DbCluster) -> Result<()> {
        let stage = Stage::TierMembers(manager.tier());

        match manager.sync(cluster).await {
            Ok(status) => merge_tier_status(stage, status, cluster),
            Err(TierSyncError { observed, error }) => {
                if let Some(status) = observed {
                    merge_tier_status(stage, status, cluster)?;
                }
                Err(Error::stage(stage, error))
            }
        }
    }
}

fn merge_tier_status(stage: Stage, status: TierStatus, cluster: &mut DbCluster) -> Result<()> {
    if Stage::TierMembers(status.tier()) != stage {
        return Err(Error::stage(
            stage,
            Error::InternalError(format!(
                "{} returned status for the {}",
                stage,
                status.tier()
            )),
        ));
    }
    debug!(tier = %status.tier(), "merging observed tier status");
    status.merge_into(cluster.status.get_or_insert_with(Default::default));
    Ok(())
}
