//! Unit tests for the reconciliation pipeline
//!
//! Every collaborator is a recording fake, so these tests pin down stage
//! ordering, gate behavior and error propagation without a cluster.

use dbcluster_operator::controller::events::reasons;
use dbcluster_operator::controller::gates::{WAITING_FOR_METADATA_TIER, WAITING_FOR_STORAGE_TIER};
use dbcluster_operator::controller::{Error, Stage, pass_status};
use dbcluster_operator::crd::{DbCluster, DbClusterStatus, StoreState, Tier};
use dbcluster_operator::manager::TierStatus;
use kube::runtime::events::EventType;

use crate::common::*;

const ALL_STAGES: [&str; 6] = [
    "reclaim_policy",
    "metadata",
    "storage",
    "query",
    "meta",
    "orphan_pods",
];

fn converged_cluster() -> DbCluster {
    DbClusterBuilder::new("test", "default")
        .with_uid("test-uid-12345")
        .with_replicas(3, 3, 1)
        .with_status(converged_status(3, 3, 1))
        .build()
}

fn cluster_with_tiers(
    metadata: (usize, usize, i32),
    storage: (&[StoreState], i32),
    storage_replicas: i32,
) -> DbCluster {
    let status = DbClusterStatus {
        metadata_tier: metadata_status(metadata.0, metadata.1, metadata.2),
        storage_tier: storage_status(storage.0, storage.1),
        query_tier: query_status(1, 1),
        ..Default::default()
    };
    DbClusterBuilder::new("test", "default")
        .with_replicas(3, storage_replicas, 1)
        .with_status(status)
        .build()
}

fn requeue_reason(error: &Error) -> Option<&'static str> {
    match error {
        Error::Requeue { reason, .. } => Some(*reason),
        _ => None,
    }
}

mod ordering_tests {
    use super::*;

    #[tokio::test]
    async fn test_all_stages_run_in_order_on_converged_cluster() {
        let pipeline = FakePipeline::new();
        let mut cluster = converged_cluster();

        let result = pipeline.control().update_cluster(&mut cluster).await;

        assert!(result.is_ok(), "unexpected error: {:?}", result);
        assert_eq!(pipeline.calls(), ALL_STAGES.to_vec());
    }

    #[tokio::test]
    async fn test_success_records_normal_event() {
        let pipeline = FakePipeline::new();
        let mut cluster = converged_cluster();

        pipeline.control().update_cluster(&mut cluster).await.unwrap();

        let events = pipeline.recorder.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity, EventType::Normal);
        assert_eq!(events[0].reason, reasons::SUCCESSFUL_SYNC);
    }

    #[tokio::test]
    async fn test_orphan_deletions_do_not_fail_the_pass() {
        let pipeline = FakePipeline::new();
        pipeline.orphan_pods.delete_pods(&["test-storage-3"]);
        let mut cluster = converged_cluster();

        let result = pipeline.control().update_cluster(&mut cluster).await;

        assert!(result.is_ok());
        assert_eq!(pipeline.orphan_pods.calls(), 1);
    }
}

mod hard_error_tests {
    use super::*;

    #[tokio::test]
    async fn test_reclaim_policy_failure_stops_every_later_stage() {
        let pipeline = FakePipeline::new();
        pipeline.reclaim_policy.fail_with("volume lookup failed");
        let mut cluster = converged_cluster();

        let err = pipeline
            .control()
            .update_cluster(&mut cluster)
            .await
            .unwrap_err();

        assert!(!err.is_requeue());
        assert_eq!(err.failed_stage(), Some(Stage::ReclaimPolicy));
        assert_eq!(pipeline.calls(), vec!["reclaim_policy"]);
        assert_eq!(pipeline.metadata.calls(), 0);
        assert_eq!(pipeline.orphan_pods.calls(), 0);
    }

    #[tokio::test]
    async fn test_hard_error_records_warning_event() {
        let pipeline = FakePipeline::new();
        pipeline.reclaim_policy.fail_with("volume lookup failed");
        let mut cluster = converged_cluster();

        let err = pipeline
            .control()
            .update_cluster(&mut cluster)
            .await
            .unwrap_err();

        let events = pipeline.recorder.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity, EventType::Warning);
        assert_eq!(events[0].reason, reasons::FAILED_SYNC);
        assert_eq!(events[0].message, err.to_string());
    }

    #[tokio::test]
    async fn test_error_message_names_the_failed_stage() {
        let pipeline = FakePipeline::new();
        pipeline.query.fail_with("boom");
        let mut cluster = converged_cluster();

        let err = pipeline
            .control()
            .update_cluster(&mut cluster)
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "query tier member manager sync error: Invalid configuration: boom"
        );
    }

    #[tokio::test]
    async fn test_query_failure_skips_meta_and_orphan_cleaning() {
        let pipeline = FakePipeline::new();
        pipeline.query.fail_with("boom");
        let mut cluster = converged_cluster();

        let err = pipeline
            .control()
            .update_cluster(&mut cluster)
            .await
            .unwrap_err();

        assert_eq!(err.failed_stage(), Some(Stage::TierMembers(Tier::Query)));
        assert_eq!(
            pipeline.calls(),
            vec!["reclaim_policy", "metadata", "storage", "query"]
        );
        assert_eq!(pipeline.meta.calls(), 0);
        assert_eq!(pipeline.orphan_pods.calls(), 0);
    }

    #[tokio::test]
    async fn test_metadata_failure_skips_its_gate_and_later_tiers() {
        let pipeline = FakePipeline::new();
        pipeline.metadata.fail_with("health endpoint unreachable");
        let mut cluster = converged_cluster();

        let err = pipeline
            .control()
            .update_cluster(&mut cluster)
            .await
            .unwrap_err();

        assert!(!err.is_requeue());
        assert_eq!(err.failed_stage(), Some(Stage::TierMembers(Tier::Metadata)));
        assert_eq!(pipeline.calls(), vec!["reclaim_policy", "metadata"]);
    }

    #[tokio::test]
    async fn test_meta_failure_skips_orphan_cleaning() {
        let pipeline = FakePipeline::new();
        pipeline.meta.fail_with("patch rejected");
        let mut cluster = converged_cluster();

        let err = pipeline
            .control()
            .update_cluster(&mut cluster)
            .await
            .unwrap_err();

        assert_eq!(err.failed_stage(), Some(Stage::Meta));
        assert_eq!(pipeline.orphan_pods.calls(), 0);
    }

    #[tokio::test]
    async fn test_orphan_cleaner_failure_is_hard() {
        let pipeline = FakePipeline::new();
        pipeline.orphan_pods.fail_with("delete forbidden");
        let mut cluster = converged_cluster();

        let err = pipeline
            .control()
            .update_cluster(&mut cluster)
            .await
            .unwrap_err();

        assert!(!err.is_requeue());
        assert_eq!(err.failed_stage(), Some(Stage::OrphanPods));
        assert_eq!(pipeline.calls(), ALL_STAGES.to_vec());
    }

    #[tokio::test]
    async fn test_requeue_from_a_manager_is_treated_as_hard() {
        let pipeline = FakePipeline::new();
        pipeline
            .storage
            .requeue_with("StoreNotRegistered", "store not registered yet");
        let mut cluster = converged_cluster();

        let err = pipeline
            .control()
            .update_cluster(&mut cluster)
            .await
            .unwrap_err();

        assert!(!err.is_requeue());
        assert_eq!(err.failed_stage(), Some(Stage::TierMembers(Tier::Storage)));
        assert_eq!(pipeline.query.calls(), 0);
        assert_eq!(pipeline.recorder.events()[0].severity, EventType::Warning);
    }

    #[tokio::test]
    async fn test_status_for_another_tier_is_rejected() {
        let pipeline = FakePipeline::new();
        pipeline
            .metadata
            .report(TierStatus::Query(query_status(1, 1)));
        let mut cluster = converged_cluster();

        let err = pipeline
            .control()
            .update_cluster(&mut cluster)
            .await
            .unwrap_err();

        assert_eq!(err.failed_stage(), Some(Stage::TierMembers(Tier::Metadata)));
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "metadata tier member manager sync error: Internal error: \
             metadata tier member manager returned status for the query tier"
        );
        assert!(matches!(
            err,
            Error::StageError { ref source, .. } if matches!(**source, Error::InternalError(_))
        ));
        assert_eq!(pipeline.storage.calls(), 0);
    }
}

mod metadata_gate_tests {
    use super::*;

    const UP3: &[StoreState] = &[StoreState::Up, StoreState::Up, StoreState::Up];

    #[tokio::test]
    async fn test_metadata_gate_table() {
        // (healthy, unhealthy, ready replicas, gate passes)
        let cases = [
            (0, 0, 0, false),
            (1, 2, 3, false),
            (2, 1, 3, true),
            (3, 0, 3, true),
            (3, 0, 2, false),
            (2, 1, 2, false),
        ];

        for (healthy, unhealthy, ready, passes) in cases {
            let pipeline = FakePipeline::new();
            let mut cluster = cluster_with_tiers((healthy, unhealthy, ready), (UP3, 3), 3);

            let result = pipeline.control().update_cluster(&mut cluster).await;

            if passes {
                assert!(
                    result.is_ok(),
                    "healthy={} ready={}: {:?}",
                    healthy,
                    ready,
                    result
                );
                assert_eq!(pipeline.storage.calls(), 1);
            } else {
                let err = result.unwrap_err();
                assert_eq!(
                    requeue_reason(&err),
                    Some(WAITING_FOR_METADATA_TIER),
                    "healthy={} ready={}",
                    healthy,
                    ready
                );
                assert_eq!(pipeline.calls(), vec!["reclaim_policy", "metadata"]);
            }
        }
    }

    #[tokio::test]
    async fn test_requeue_records_no_event() {
        let pipeline = FakePipeline::new();
        let mut cluster = cluster_with_tiers((1, 2, 3), (UP3, 3), 3);

        let err = pipeline
            .control()
            .update_cluster(&mut cluster)
            .await
            .unwrap_err();

        assert!(err.is_requeue());
        assert!(err.failed_stage().is_none());
        assert!(pipeline.recorder.events().is_empty());
    }

    #[tokio::test]
    async fn test_fresh_cluster_waits_for_metadata_tier() {
        let pipeline = FakePipeline::new();
        let mut cluster = create_test_cluster("test", "default");

        let err = pipeline
            .control()
            .update_cluster(&mut cluster)
            .await
            .unwrap_err();

        assert_eq!(requeue_reason(&err), Some(WAITING_FOR_METADATA_TIER));
        assert!(cluster.status.is_some());
    }

    #[tokio::test]
    async fn test_gate_sees_status_reported_in_the_same_pass() {
        let pipeline = FakePipeline::new();
        pipeline
            .metadata
            .report(TierStatus::Metadata(metadata_status(3, 0, 3)));
        let mut cluster = create_test_cluster("test", "default");

        let err = pipeline
            .control()
            .update_cluster(&mut cluster)
            .await
            .unwrap_err();

        // The metadata gate passed on the fresh report; storage has nothing yet
        assert_eq!(requeue_reason(&err), Some(WAITING_FOR_STORAGE_TIER));
        assert_eq!(
            pipeline.calls(),
            vec!["reclaim_policy", "metadata", "storage"]
        );
    }
}

mod storage_gate_tests {
    use super::*;

    #[tokio::test]
    async fn test_storage_gate_table() {
        // (stores, ready replicas, desired replicas, gate passes)
        let cases: [(&[StoreState], i32, i32, bool); 6] = [
            (&[], 0, 1, false),
            (&[StoreState::Down], 1, 1, false),
            (&[StoreState::Up], 0, 1, false),
            (&[StoreState::Up], 1, 1, true),
            (&[StoreState::Up, StoreState::Up, StoreState::Up], 3, 3, true),
            (&[StoreState::Up, StoreState::Up, StoreState::Offline], 3, 3, false),
        ];

        for (stores, ready, desired, passes) in cases {
            let pipeline = FakePipeline::new();
            let mut cluster = cluster_with_tiers((3, 0, 3), (stores, ready), desired);

            let result = pipeline.control().update_cluster(&mut cluster).await;

            if passes {
                assert!(result.is_ok(), "stores={:?}: {:?}", stores, result);
                assert_eq!(pipeline.query.calls(), 1);
            } else {
                let err = result.unwrap_err();
                assert_eq!(
                    requeue_reason(&err),
                    Some(WAITING_FOR_STORAGE_TIER),
                    "stores={:?} ready={}",
                    stores,
                    ready
                );
                assert_eq!(
                    pipeline.calls(),
                    vec!["reclaim_policy", "metadata", "storage"]
                );
            }
        }
    }
}

mod status_merge_tests {
    use super::*;

    #[tokio::test]
    async fn test_observed_status_is_merged_when_a_tier_fails() {
        let pipeline = FakePipeline::new();
        let observed = metadata_status(1, 0, 1);
        pipeline
            .metadata
            .report(TierStatus::Metadata(observed.clone()));
        pipeline.metadata.fail_with("member list incomplete");
        let mut cluster = converged_cluster();

        let result = pipeline.control().update_cluster(&mut cluster).await;

        assert!(result.is_err());
        assert_eq!(cluster.status.unwrap().metadata_tier, observed);
    }

    #[tokio::test]
    async fn test_reported_status_replaces_the_tier_section() {
        let pipeline = FakePipeline::new();
        let reported = query_status(2, 2);
        pipeline.query.report(TierStatus::Query(reported.clone()));
        let mut cluster = converged_cluster();
        let before = cluster.status.clone().unwrap();

        pipeline.control().update_cluster(&mut cluster).await.unwrap();

        let after = cluster.status.unwrap();
        assert_eq!(after.query_tier, reported);
        assert_eq!(after.metadata_tier, before.metadata_tier);
        assert_eq!(after.storage_tier, before.storage_tier);
    }
}

mod idempotence_tests {
    use super::*;

    #[tokio::test]
    async fn test_second_pass_on_converged_cluster_changes_nothing() {
        let pipeline = FakePipeline::new();
        let control = pipeline.control();

        let original = converged_cluster();
        let mut working = original.clone();
        let first = control.update_cluster(&mut working).await;
        assert!(first.is_ok());
        let first_status = pass_status(&original, working.status.take().unwrap(), &first);

        let mut stored = original.clone();
        stored.status = Some(first_status.clone());
        let mut working = stored.clone();
        let second = control.update_cluster(&mut working).await;
        assert!(second.is_ok());
        let second_status = pass_status(&stored, working.status.take().unwrap(), &second);

        assert_eq!(first_status, second_status);
        assert_eq!(pipeline.calls(), [ALL_STAGES, ALL_STAGES].concat());
    }
}
