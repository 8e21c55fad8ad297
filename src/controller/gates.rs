//! Readiness gates between tiers
//!
//! A gate is a pure predicate over the desired spec and the status the tier's
//! member manager produced during the current pass. The storage tier is only
//! provisioned once the metadata tier has quorum and replica parity, and the
//! query tier only once every storage replica is up.

use crate::controller::error::{Error, Result};
use crate::crd::{DbClusterSpec, MetadataTierStatus, StorageTierStatus, ready_replicas};

pub const WAITING_FOR_METADATA_TIER: &str = "WaitingForMetadataTier";
pub const WAITING_FOR_STORAGE_TIER: &str = "WaitingForStorageTier";

/// Strict majority of `desired` members
pub fn has_quorum(healthy: usize, desired: i32) -> bool {
    healthy as i64 > i64::from(desired) / 2
}

/// Metadata tier is ready once a strict majority of the desired members is
/// healthy and the workload has rolled out every desired replica.
pub fn metadata_tier_ready(spec: &DbClusterSpec, status: &MetadataTierStatus) -> bool {
    let desired = spec.metadata_tier.replicas;
    let healthy = status.members.values().filter(|m| m.healthy).count();

    has_quorum(healthy, desired) && ready_replicas(status.workload.as_ref()) == desired
}

/// Storage tier is ready once at least the desired number of stores is up and
/// the workload has rolled out every desired replica. Stores are independent
/// shards, so this is an absolute count rather than a majority.
pub fn storage_tier_ready(spec: &DbClusterSpec, status: &StorageTierStatus) -> bool {
    let desired = spec.storage_tier.replicas;
    let available = status
        .stores
        .values()
        .filter(|s| s.state.is_available())
        .count();

    available as i64 >= i64::from(desired) && ready_replicas(status.workload.as_ref()) == desired
}

/// Requeue unless the metadata tier is ready
pub fn check_metadata_tier(spec: &DbClusterSpec, status: &MetadataTierStatus) -> Result<()> {
    if metadata_tier_ready(spec, status) {
        return Ok(());
    }

    let healthy = status.members.values().filter(|m| m.healthy).count();
    Err(Error::requeue(
        WAITING_FOR_METADATA_TIER,
        format!(
            "waiting for metadata tier cluster running: {}/{} members healthy, {}/{} replicas ready",
            healthy,
            spec.metadata_tier.replicas,
            ready_replicas(status.workload.as_ref()),
            spec.metadata_tier.replicas
        ),
    ))
}

/// Requeue unless the storage tier is ready
pub fn check_storage_tier(spec: &DbClusterSpec, status: &StorageTierStatus) -> Result<()> {
    if storage_tier_ready(spec, status) {
        return Ok(());
    }

    let available = status
        .stores
        .values()
        .filter(|s| s.state.is_available())
        .count();
    Err(Error::requeue(
        WAITING_FOR_STORAGE_TIER,
        format!(
            "waiting for storage tier cluster running: {}/{} stores up, {}/{} replicas ready",
            available,
            spec.storage_tier.replicas,
            ready_replicas(status.workload.as_ref()),
            spec.storage_tier.replicas
        ),
    ))
}
