//! Validation of DbCluster specs
//!
//! Runs before every reconcile pass. An invalid spec never reaches the
//! pipeline.

use tracing::warn;

use crate::controller::error::{Error, Result};
use crate::crd::{DbCluster, StorageSpec, Tier};

/// Minimum number of metadata and storage members
pub const MIN_REPLICAS: i32 = 1;

/// Minimum number of query servers; the query tier may be scaled to zero
pub const MIN_QUERY_REPLICAS: i32 = 0;

/// Maximum number of members in any tier
pub const MAX_REPLICAS: i32 = 100;

/// Validate the cluster spec
pub fn validate_spec(cluster: &DbCluster) -> Result<()> {
    for tier in Tier::ALL {
        validate_replicas(tier, cluster.spec.replicas(tier))?;
    }

    let metadata_replicas = cluster.spec.metadata_tier.replicas;
    if metadata_replicas % 2 == 0 {
        warn!(
            replicas = metadata_replicas,
            "even metadata tier size tolerates no more failures than {}",
            metadata_replicas - 1
        );
    }

    validate_storage(Tier::Metadata, &cluster.spec.metadata_tier.storage)?;
    validate_storage(Tier::Storage, &cluster.spec.storage_tier.storage)?;

    if let Some(backup) = cluster.spec.backup.as_ref().filter(|b| b.enabled) {
        validate_size("backup storage size", &backup.storage_size)?;
    }

    Ok(())
}

/// Validate replica count of a tier
fn validate_replicas(tier: Tier, replicas: i32) -> Result<()> {
    let min = match tier {
        Tier::Query => MIN_QUERY_REPLICAS,
        Tier::Metadata | Tier::Storage => MIN_REPLICAS,
    };

    if replicas < min {
        return Err(Error::ValidationError(format!(
            "{} replica count {} is below minimum {}",
            tier, replicas, min
        )));
    }

    if replicas > MAX_REPLICAS {
        return Err(Error::ValidationError(format!(
            "{} replica count {} exceeds maximum {}",
            tier, replicas, MAX_REPLICAS
        )));
    }

    Ok(())
}

/// Validate storage configuration
fn validate_storage(tier: Tier, storage: &StorageSpec) -> Result<()> {
    validate_size(&format!("{} storage size", tier), &storage.size)
}

fn validate_size(what: &str, size: &str) -> Result<()> {
    // Validate size format (e.g., "10Gi", "100Gi")
    if !size.ends_with("Gi") && !size.ends_with("Mi") && !size.ends_with("Ti") {
        return Err(Error::ValidationError(format!(
            "{} must end with Gi, Mi, or Ti: {}",
            what, size
        )));
    }

    let num_str = size.trim_end_matches(char::is_alphabetic);
    let _num: u64 = num_str
        .parse()
        .map_err(|_| Error::ValidationError(format!("invalid {} number: {}", what, size)))?;

    Ok(())
}
