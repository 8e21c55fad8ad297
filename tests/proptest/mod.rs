// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Property-based tests for DbCluster validation, gates and the pipeline
//!
//! These tests use proptest to generate random configurations and verify that:
//! 1. Valid specs always pass validation and generate resources without panicking
//! 2. Invalid specs are always rejected with errors, not panics
//! 3. Readiness gates agree with their quorum and replica-parity definitions
//! 4. Orphan selection never touches a live member and never misses a stale one
//! 5. The pipeline stops exactly at the first unsatisfied gate

#[path = "../common/mod.rs"]
mod common;

use std::collections::BTreeSet;

use proptest::prelude::*;

use common::*;
use dbcluster_operator::controller::gates::{
    has_quorum, metadata_tier_ready, storage_tier_ready,
};
use dbcluster_operator::controller::{Error, validate_spec};
use dbcluster_operator::crd::{DbClusterStatus, StoreState, Tier};
use dbcluster_operator::manager::orphan::find_orphans;
use dbcluster_operator::resources::common::workload_name;
use dbcluster_operator::resources::{pdb, statefulset};

// =============================================================================
// Strategies
// =============================================================================

/// Generate a valid member count for a stateful tier (1-100)
fn valid_replicas() -> impl Strategy<Value = i32> {
    1..=100i32
}

/// Generate an invalid member count for a stateful tier
fn invalid_replicas() -> impl Strategy<Value = i32> {
    prop_oneof![(-100..=-1i32), Just(0), (101..=1000i32),]
}

/// Generate a valid storage size (shrinks toward smaller values)
fn valid_storage_size() -> impl Strategy<Value = String> {
    prop_oneof![
        (100..=999u32).prop_map(|n| format!("{}Mi", n)),
        (1..=100u32).prop_map(|n| format!("{}Gi", n)),
        (1..=10u32).prop_map(|n| format!("{}Ti", n)),
    ]
}

/// Generate an invalid storage size
fn invalid_storage_size() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("".to_string()),
        // Missing unit
        (1..=100u32).prop_map(|n| n.to_string()),
        // GB instead of Gi
        (1..=100u32).prop_map(|n| format!("{}GB", n)),
        (1..=100u32).prop_map(|n| format!("-{}Gi", n)),
        (1..=100u32).prop_map(|n| format!("{} Gi", n)),
        "[a-z]{3,8}",
    ]
}

fn store_state() -> impl Strategy<Value = StoreState> {
    prop_oneof![
        Just(StoreState::Up),
        Just(StoreState::Down),
        Just(StoreState::Offline),
        Just(StoreState::Tombstone),
    ]
}

fn tier() -> impl Strategy<Value = Tier> {
    prop_oneof![Just(Tier::Metadata), Just(Tier::Storage), Just(Tier::Query)]
}

// =============================================================================
// Validation and resource generation
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn valid_specs_pass_validation(
        metadata in valid_replicas(),
        storage in valid_replicas(),
        query in 0..=100i32,
        size in valid_storage_size(),
    ) {
        let cluster = DbClusterBuilder::new("prop", "default")
            .with_replicas(metadata, storage, query)
            .with_storage(&size, None)
            .build();

        prop_assert!(validate_spec(&cluster).is_ok());
    }

    #[test]
    fn invalid_stateful_replicas_are_rejected(
        replicas in invalid_replicas(),
        on_metadata in any::<bool>(),
    ) {
        let (metadata, storage) = if on_metadata { (replicas, 3) } else { (3, replicas) };
        let cluster = DbClusterBuilder::new("prop", "default")
            .with_replicas(metadata, storage, 1)
            .build();

        let result = validate_spec(&cluster);
        prop_assert!(matches!(result, Err(Error::ValidationError(_))));
    }

    #[test]
    fn invalid_storage_sizes_are_rejected(size in invalid_storage_size()) {
        let cluster = DbClusterBuilder::new("prop", "default")
            .with_storage(&size, None)
            .build();

        let result = validate_spec(&cluster);
        prop_assert!(matches!(result, Err(Error::ValidationError(_))));
    }

    #[test]
    fn validation_is_deterministic(replicas in -10..=110i32, size in "[0-9a-zA-Z]{0,6}") {
        let cluster = DbClusterBuilder::new("prop", "default")
            .with_replicas(replicas, replicas, replicas)
            .with_storage(&size, None)
            .build();

        let first = validate_spec(&cluster).map_err(|e| e.to_string());
        let second = validate_spec(&cluster).map_err(|e| e.to_string());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn statefulset_replicas_follow_spec(
        metadata in valid_replicas(),
        storage in valid_replicas(),
        query in 0..=100i32,
        tier in tier(),
    ) {
        let cluster = DbClusterBuilder::new("prop", "default")
            .with_replicas(metadata, storage, query)
            .build();

        let sts = statefulset::generate_statefulset(&cluster, tier);
        let spec = sts.spec.unwrap();
        prop_assert_eq!(spec.replicas, Some(cluster.spec.replicas(tier)));
        prop_assert_eq!(spec.volume_claim_templates.is_some(), tier != Tier::Query);
    }

    #[test]
    fn pdb_keeps_a_strict_majority(replicas in valid_replicas()) {
        let min_available = pdb::quorum_size(replicas);

        prop_assert!(min_available <= replicas);
        prop_assert!(has_quorum(min_available as usize, replicas));
        prop_assert!(!has_quorum((min_available - 1) as usize, replicas));
    }
}

// =============================================================================
// Readiness gates
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn quorum_is_monotonic(healthy in 0..=50usize, desired in 1..=50i32) {
        if has_quorum(healthy, desired) {
            prop_assert!(has_quorum(healthy + 1, desired));
        }
        prop_assert_eq!(has_quorum(healthy, desired), healthy * 2 > desired as usize);
    }

    #[test]
    fn metadata_gate_matches_definition(
        desired in 1..=7i32,
        healthy in 0..=7usize,
        unhealthy in 0..=3usize,
        ready in 0..=8i32,
    ) {
        let cluster = DbClusterBuilder::new("test", "default")
            .with_replicas(desired, 3, 1)
            .build();
        let status = metadata_status(healthy, unhealthy, ready);

        let expected = healthy * 2 > desired as usize && ready == desired;
        prop_assert_eq!(metadata_tier_ready(&cluster.spec, &status), expected);
    }

    #[test]
    fn storage_gate_matches_definition(
        desired in 1..=6i32,
        states in prop::collection::vec(store_state(), 0..8),
        ready in 0..=7i32,
    ) {
        let cluster = DbClusterBuilder::new("test", "default")
            .with_replicas(3, desired, 1)
            .build();
        let status = storage_status(&states, ready);

        let up = states.iter().filter(|s| **s == StoreState::Up).count();
        let expected = up >= desired as usize && ready == desired;
        prop_assert_eq!(storage_tier_ready(&cluster.spec, &status), expected);
    }
}

// =============================================================================
// Orphan selection
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn orphans_are_exactly_the_out_of_range_ordinals(
        desired in (1..=5i32, 1..=5i32, 0..=5i32),
        ordinals in prop::collection::btree_set((tier(), 0..=8i32), 0..12),
    ) {
        let (metadata, storage, query) = desired;
        let cluster = DbClusterBuilder::new("test", "default")
            .with_replicas(metadata, storage, query)
            .build();
        let workloads: BTreeSet<String> =
            Tier::ALL.into_iter().map(|t| workload_name("test", t)).collect();
        let pods: Vec<_> = ordinals
            .iter()
            .map(|(tier, ordinal)| owned_pod("test", *tier, *ordinal))
            .collect();

        let orphans: BTreeSet<String> = find_orphans(&cluster, &pods, &workloads)
            .into_iter()
            .map(|o| o.name)
            .collect();

        for (tier, ordinal) in &ordinals {
            let name = format!("{}-{}", workload_name("test", *tier), ordinal);
            let out_of_range = *ordinal >= cluster.spec.replicas(*tier);
            prop_assert_eq!(orphans.contains(&name), out_of_range, "{}", name);
        }
    }

    #[test]
    fn unowned_pods_are_always_orphans(tier in tier(), ordinal in 0..=3i32) {
        let cluster = create_test_cluster("test", "default");
        let workloads: BTreeSet<String> =
            Tier::ALL.into_iter().map(|t| workload_name("test", t)).collect();
        let pods = vec![tier_pod("test", tier, ordinal, None)];

        prop_assert_eq!(find_orphans(&cluster, &pods, &workloads).len(), 1);
    }
}

// =============================================================================
// Pipeline
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn pipeline_stops_at_first_unsatisfied_gate(
        healthy in 0..=3usize,
        metadata_ready in 0..=3i32,
        up in 0..=3usize,
        storage_ready in 0..=3i32,
    ) {
        let states: Vec<StoreState> = (0..3)
            .map(|i| if i < up { StoreState::Up } else { StoreState::Down })
            .collect();
        let status = DbClusterStatus {
            metadata_tier: metadata_status(healthy, 3 - healthy, metadata_ready),
            storage_tier: storage_status(&states, storage_ready),
            query_tier: query_status(1, 1),
            ..Default::default()
        };
        let mut cluster = DbClusterBuilder::new("test", "default")
            .with_replicas(3, 3, 1)
            .with_status(status)
            .build();

        let pipeline = FakePipeline::new();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let result = runtime.block_on(pipeline.control().update_cluster(&mut cluster));

        let metadata_ok = healthy >= 2 && metadata_ready == 3;
        let storage_ok = up == 3 && storage_ready == 3;
        let expected_calls: &[&str] = if !metadata_ok {
            &["reclaim_policy", "metadata"]
        } else if !storage_ok {
            &["reclaim_policy", "metadata", "storage"]
        } else {
            &["reclaim_policy", "metadata", "storage", "query", "meta", "orphan_pods"]
        };

        prop_assert_eq!(pipeline.calls(), expected_calls.to_vec());
        prop_assert_eq!(result.is_ok(), metadata_ok && storage_ok);
        if let Err(e) = result {
            prop_assert!(e.is_requeue());
            prop_assert!(pipeline.recorder.events().is_empty());
        }
    }
}
