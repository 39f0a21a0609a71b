//! Operations Module Tests
//!
//! ## Test Scopes
//! - **Tracker**: duplicate detection, absent vs errored replicas, finish semantics,
//!   retention reaping, incarnation checks.
//! - **Aggregator**: sticky terminal states, merging across discriminators.
//! - **Poller**: reporting until terminal, tolerance of transport failures,
//!   stopping when the operation is finished.

#[cfg(test)]
mod tests {
    use crate::engine::registry::ConnectionRegistry;
    use crate::engine::router::RequestRouter;
    use crate::engine::testing::FakeConnector;
    use crate::engine::types::{DataEngine, EngineMethod, EngineTarget};
    use crate::error::ProxyError;
    use crate::operations::aggregator::{self, StatusAggregator};
    use crate::operations::poller::{PollerSettings, ReplicaPoller};
    use crate::operations::status::*;
    use crate::operations::tracker::OperationTracker;
    use crate::operations::types::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const REPLICA_A: &str = "tcp://10.0.1.1:10000";
    const REPLICA_B: &str = "tcp://10.0.1.2:10000";

    fn target() -> EngineTarget {
        EngineTarget {
            address: "10.0.0.5:10010".to_string(),
            engine_name: "vol-a-e-0".to_string(),
            volume_name: "vol-a".to_string(),
            data_engine: DataEngine::V1,
        }
    }

    fn purge_key() -> OperationKey {
        OperationKey::new(&target(), OperationKind::SnapshotPurge, None)
    }

    fn purge(state: ReplicaState, progress: i32) -> SnapshotPurgeStatus {
        SnapshotPurgeStatus {
            is_purging: state == ReplicaState::InProgress,
            progress,
            error: None,
            state,
        }
    }

    fn replicas() -> Vec<String> {
        vec![REPLICA_A.to_string(), REPLICA_B.to_string()]
    }

    // ============================================================
    // TRACKER
    // ============================================================

    #[test]
    fn test_second_begin_is_duplicate() {
        let tracker = OperationTracker::<SnapshotPurgeStatus>::new();

        tracker.begin(purge_key(), replicas()).unwrap();
        let err = tracker.begin(purge_key(), replicas()).unwrap_err();

        assert!(matches!(err, ProxyError::DuplicateOperation(_)));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_begin_without_replicas_is_rejected() {
        let tracker = OperationTracker::<SnapshotPurgeStatus>::new();
        let err = tracker.begin(purge_key(), Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, ProxyError::InvalidArgument(_)));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_unreported_replica_is_absent() {
        let tracker = OperationTracker::<SnapshotPurgeStatus>::new();
        tracker.begin(purge_key(), replicas()).unwrap();

        assert!(tracker.query(&purge_key()).unwrap().is_empty());

        tracker.report(&purge_key(), REPLICA_A, purge(ReplicaState::InProgress, 30));
        let statuses = tracker.query(&purge_key()).unwrap();

        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[REPLICA_A].progress, 30);
        assert!(!statuses.contains_key(REPLICA_B), "Absent is not Error");
    }

    #[test]
    fn test_report_for_unknown_operation_is_dropped() {
        let tracker = OperationTracker::<SnapshotPurgeStatus>::new();
        assert!(!tracker.report(&purge_key(), REPLICA_A, purge(ReplicaState::Complete, 100)));
        assert!(tracker.query(&purge_key()).is_err());
    }

    #[test]
    fn test_report_from_untracked_replica_is_dropped() {
        let tracker = OperationTracker::<SnapshotPurgeStatus>::new();
        tracker.begin(purge_key(), vec![REPLICA_A.to_string()]).unwrap();

        assert!(!tracker.report(&purge_key(), REPLICA_B, purge(ReplicaState::InProgress, 1)));
        assert!(tracker.query(&purge_key()).unwrap().is_empty());
    }

    #[test]
    fn test_report_is_idempotent_upsert() {
        let tracker = OperationTracker::<SnapshotPurgeStatus>::new();
        tracker.begin(purge_key(), replicas()).unwrap();

        tracker.report(&purge_key(), REPLICA_A, purge(ReplicaState::InProgress, 40));
        tracker.report(&purge_key(), REPLICA_A, purge(ReplicaState::InProgress, 40));
        tracker.report(&purge_key(), REPLICA_A, purge(ReplicaState::InProgress, 70));

        let statuses = tracker.query(&purge_key()).unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[REPLICA_A].progress, 70);
    }

    #[test]
    fn test_finish_then_query_is_unknown_and_finish_is_idempotent() {
        let tracker = OperationTracker::<SnapshotPurgeStatus>::new();
        tracker.begin(purge_key(), replicas()).unwrap();

        assert!(tracker.finish(&purge_key()));
        assert!(matches!(
            tracker.query(&purge_key()),
            Err(ProxyError::UnknownOperation(_))
        ));
        assert!(!tracker.finish(&purge_key()), "Second finish is a no-op");
    }

    #[test]
    fn test_completed_operation_can_be_started_again() {
        let tracker = OperationTracker::<SnapshotPurgeStatus>::new();
        let first = tracker.begin(purge_key(), replicas()).unwrap();
        tracker.report(&purge_key(), REPLICA_A, purge(ReplicaState::Complete, 100));
        tracker.report(&purge_key(), REPLICA_B, purge(ReplicaState::Error, 10));
        assert!(!tracker.is_active(&purge_key()));

        let second = tracker.begin(purge_key(), replicas()).unwrap();

        assert_ne!(first.id, second.id);
        assert!(tracker.query(&purge_key()).unwrap().is_empty());
        assert!(!tracker.is_current(&first));
        assert!(
            !tracker.report_for(&first, REPLICA_A, purge(ReplicaState::Complete, 100)),
            "Reports from the replaced incarnation are dropped"
        );
    }

    #[test]
    fn test_finish_handle_ignores_other_incarnation() {
        let tracker = OperationTracker::<SnapshotPurgeStatus>::new();
        let first = tracker.begin(purge_key(), vec![REPLICA_A.to_string()]).unwrap();
        tracker.report(&purge_key(), REPLICA_A, purge(ReplicaState::Complete, 100));
        let second = tracker.begin(purge_key(), vec![REPLICA_A.to_string()]).unwrap();

        assert!(!tracker.finish_handle(&first));
        assert!(tracker.is_current(&second));
        assert!(tracker.finish_handle(&second));
    }

    #[tokio::test]
    async fn test_reap_removes_only_terminal_operations() {
        let tracker = OperationTracker::<SnapshotPurgeStatus>::new();
        let done = purge_key();
        let running = OperationKey::new(&target(), OperationKind::SnapshotPurge, Some("other"));

        tracker.begin(done.clone(), vec![REPLICA_A.to_string()]).unwrap();
        tracker.begin(running.clone(), vec![REPLICA_A.to_string()]).unwrap();
        tracker.report(&done, REPLICA_A, purge(ReplicaState::Complete, 100));
        tracker.report(&running, REPLICA_A, purge(ReplicaState::InProgress, 50));

        assert_eq!(tracker.reap(Duration::from_secs(60)), 0, "Retention not elapsed");

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(tracker.reap(Duration::from_millis(10)), 1);
        assert!(tracker.query(&done).is_err());
        assert!(tracker.query(&running).is_ok());
    }

    #[tokio::test]
    async fn test_finish_aborts_attached_pollers() {
        let tracker = OperationTracker::<SnapshotPurgeStatus>::new();
        let handle = tracker.begin(purge_key(), replicas()).unwrap();

        let ticks = Arc::new(AtomicUsize::new(0));
        let ticks_clone = ticks.clone();
        let poller = tokio::spawn(async move {
            loop {
                ticks_clone.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });
        tracker.attach_pollers(&handle, vec![poller]);

        tokio::time::sleep(Duration::from_millis(20)).await;
        tracker.finish(&purge_key());
        tokio::time::sleep(Duration::from_millis(10)).await;
        let after_finish = ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(ticks.load(Ordering::SeqCst), after_finish);
    }

    // ============================================================
    // AGGREGATOR
    // ============================================================

    #[test]
    fn test_terminal_state_is_sticky() {
        let tracker = Arc::new(OperationTracker::<SnapshotPurgeStatus>::new());
        let aggregator = StatusAggregator::new(tracker.clone());
        tracker.begin(purge_key(), replicas()).unwrap();

        tracker.report(&purge_key(), REPLICA_A, purge(ReplicaState::Complete, 100));
        tracker.report(&purge_key(), REPLICA_A, purge(ReplicaState::InProgress, 60));

        let merged = aggregator.merge(&purge_key()).unwrap();
        assert_eq!(merged[REPLICA_A].state, ReplicaState::Complete);
        assert_eq!(merged[REPLICA_A].progress, 100);
    }

    #[test]
    fn test_error_is_sticky_too() {
        let tracker = Arc::new(OperationTracker::<SnapshotPurgeStatus>::new());
        let aggregator = StatusAggregator::new(tracker.clone());
        tracker.begin(purge_key(), replicas()).unwrap();

        tracker.report(&purge_key(), REPLICA_B, SnapshotPurgeStatus::failed(REPLICA_B, "io error".into()));
        tracker.report(&purge_key(), REPLICA_B, purge(ReplicaState::Complete, 100));

        let merged = aggregator.merge(&purge_key()).unwrap();
        assert_eq!(merged[REPLICA_B].state, ReplicaState::Error);
        assert_eq!(merged[REPLICA_B].error.as_deref(), Some("io error"));
    }

    #[test]
    fn test_should_replace_only_non_terminal_entries() {
        let running = purge(ReplicaState::InProgress, 40);
        let done = purge(ReplicaState::Complete, 100);
        let failed = SnapshotPurgeStatus::failed(REPLICA_A, "io error".into());

        assert!(aggregator::should_replace(None::<&SnapshotPurgeStatus>));
        assert!(aggregator::should_replace(Some(&running)));
        assert!(!aggregator::should_replace(Some(&done)));
        assert!(!aggregator::should_replace(Some(&failed)));
    }

    #[test]
    fn test_merge_kind_unions_operations_newest_wins() {
        let tracker = Arc::new(OperationTracker::<ReplicaRebuildStatus>::new());
        let aggregator = StatusAggregator::new(tracker.clone());

        let rebuild_a = OperationKey::new(&target(), OperationKind::ReplicaRebuild, Some(REPLICA_A));
        let rebuild_b = OperationKey::new(&target(), OperationKind::ReplicaRebuild, Some(REPLICA_B));
        tracker.begin(rebuild_a.clone(), vec![REPLICA_A.to_string()]).unwrap();
        tracker.begin(rebuild_b.clone(), vec![REPLICA_B.to_string()]).unwrap();

        tracker.report(
            &rebuild_a,
            REPLICA_A,
            ReplicaRebuildStatus {
                is_rebuilding: true,
                progress: 20,
                state: ReplicaState::InProgress,
                ..Default::default()
            },
        );
        tracker.report(
            &rebuild_b,
            REPLICA_B,
            ReplicaRebuildStatus {
                progress: 100,
                state: ReplicaState::Complete,
                ..Default::default()
            },
        );

        let merged = aggregator
            .merge_kind(&target(), OperationKind::ReplicaRebuild)
            .unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[REPLICA_A].progress, 20);
        assert_eq!(merged[REPLICA_B].state, ReplicaState::Complete);

        let other_kind = aggregator.merge_kind(&target(), OperationKind::Restore);
        assert!(matches!(other_kind, Err(ProxyError::UnknownOperation(_))));
    }

    #[test]
    fn test_only_replica_filter() {
        let mut statuses = StatusMap::new();
        statuses.insert(REPLICA_A.to_string(), purge(ReplicaState::InProgress, 1));
        statuses.insert(REPLICA_B.to_string(), purge(ReplicaState::InProgress, 2));

        let all = StatusAggregator::only_replica(statuses.clone(), "");
        assert_eq!(all.len(), 2);

        let one = StatusAggregator::only_replica(statuses, REPLICA_B);
        assert_eq!(one.len(), 1);
        assert_eq!(one[REPLICA_B].progress, 2);
    }

    #[test]
    fn test_operation_key_display_and_matching() {
        let key = OperationKey::new(&target(), OperationKind::Backup, Some("backup-1"));
        assert_eq!(key.to_string(), "10.0.0.5:10010/vol-a-e-0/vol-a/backup/backup-1");
        assert!(key.matches(&target(), OperationKind::Backup));
        assert!(!key.matches(&target(), OperationKind::Restore));

        let no_discriminator = OperationKey::new(&target(), OperationKind::Restore, Some(""));
        assert_eq!(no_discriminator.discriminator, None);
    }

    // ============================================================
    // POLLER
    // ============================================================

    fn router_with(fake: &Arc<FakeConnector>) -> Arc<RequestRouter> {
        let registry = ConnectionRegistry::new(fake.as_connector(), Duration::from_secs(1));
        RequestRouter::new(registry, Duration::from_secs(1), false)
    }

    fn fast_settings(failure_threshold: u32) -> PollerSettings {
        PollerSettings {
            interval: Duration::from_millis(10),
            failure_threshold,
        }
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_poller_reports_until_terminal() {
        let fake = FakeConnector::new();
        let polls = Arc::new(AtomicUsize::new(0));
        let polls_clone = polls.clone();
        fake.respond_with(move |_, method, body| {
            assert_eq!(method, EngineMethod::SnapshotHashStatus);
            assert_eq!(body["name"], "snap-1");
            let n = polls_clone.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Ok(json!({"state": "in_progress"}))
            } else {
                Ok(json!({"state": "complete", "checksum": "abc123"}))
            }
        });

        let tracker = Arc::new(OperationTracker::<SnapshotHashStatus>::new());
        let key = OperationKey::new(&target(), OperationKind::SnapshotHash, Some("snap-1"));
        let handle = tracker.begin(key.clone(), vec![REPLICA_A.to_string()]).unwrap();

        let poller = ReplicaPoller::new(
            router_with(&fake),
            tracker.clone(),
            target(),
            handle.clone(),
            REPLICA_A.to_string(),
            fast_settings(3),
        )
        .spawn();

        poller.await.unwrap();

        let statuses = tracker.query(&key).unwrap();
        assert_eq!(statuses[REPLICA_A].state, ReplicaState::Complete);
        assert_eq!(statuses[REPLICA_A].checksum, "abc123");
        assert_eq!(polls.load(Ordering::SeqCst), 3, "Stops after the terminal report");
    }

    #[tokio::test]
    async fn test_poller_marks_replica_errored_after_threshold() {
        let fake = FakeConnector::new();
        // Every forward consumes two failures (attempt + retry).
        fake.fail_next_calls(100);

        let tracker = Arc::new(OperationTracker::<SnapshotPurgeStatus>::new());
        let handle = tracker.begin(purge_key(), vec![REPLICA_A.to_string()]).unwrap();

        ReplicaPoller::new(
            router_with(&fake),
            tracker.clone(),
            target(),
            handle,
            REPLICA_A.to_string(),
            fast_settings(2),
        )
        .spawn()
        .await
        .unwrap();

        let statuses = tracker.query(&purge_key()).unwrap();
        assert_eq!(statuses[REPLICA_A].state, ReplicaState::Error);
        assert!(statuses[REPLICA_A].error.as_deref().unwrap().contains("unavailable"));
    }

    #[tokio::test]
    async fn test_poller_tolerates_transient_failures() {
        let fake = FakeConnector::new();
        fake.respond_with(|_, _, _| Ok(json!({"state": "complete", "progress": 100})));
        // One full forward fails (attempt + retry), the next succeeds.
        fake.fail_next_calls(2);

        let tracker = Arc::new(OperationTracker::<SnapshotPurgeStatus>::new());
        let handle = tracker.begin(purge_key(), vec![REPLICA_A.to_string()]).unwrap();

        ReplicaPoller::new(
            router_with(&fake),
            tracker.clone(),
            target(),
            handle,
            REPLICA_A.to_string(),
            fast_settings(3),
        )
        .spawn()
        .await
        .unwrap();

        let statuses = tracker.query(&purge_key()).unwrap();
        assert_eq!(statuses[REPLICA_A].state, ReplicaState::Complete);
    }

    #[tokio::test]
    async fn test_poller_records_engine_error_verbatim() {
        let fake = FakeConnector::new();
        fake.respond_with(|_, _, _| Err(ProxyError::Engine("replica not found".to_string())));

        let tracker = Arc::new(OperationTracker::<ReplicaRebuildStatus>::new());
        let key = OperationKey::new(&target(), OperationKind::ReplicaRebuild, Some(REPLICA_A));
        let handle = tracker.begin(key.clone(), vec![REPLICA_A.to_string()]).unwrap();

        ReplicaPoller::new(
            router_with(&fake),
            tracker.clone(),
            target(),
            handle,
            REPLICA_A.to_string(),
            fast_settings(3),
        )
        .spawn()
        .await
        .unwrap();

        let statuses = tracker.query(&key).unwrap();
        assert_eq!(statuses[REPLICA_A].state, ReplicaState::Error);
        assert_eq!(statuses[REPLICA_A].error.as_deref(), Some("replica not found"));
    }

    #[tokio::test]
    async fn test_poller_exits_when_operation_finished() {
        let fake = FakeConnector::new();
        fake.respond_with(|_, _, _| Ok(json!({"state": "in_progress", "progress": 5})));

        let tracker = Arc::new(OperationTracker::<SnapshotPurgeStatus>::new());
        let handle = tracker.begin(purge_key(), vec![REPLICA_A.to_string()]).unwrap();

        let poller = ReplicaPoller::new(
            router_with(&fake),
            tracker.clone(),
            target(),
            handle,
            REPLICA_A.to_string(),
            fast_settings(3),
        )
        .spawn();

        let tracker_observer = tracker.clone();
        wait_until(move || {
            tracker_observer
                .query(&purge_key())
                .map(|statuses| !statuses.is_empty())
                .unwrap_or(false)
        })
        .await;

        tracker.finish(&purge_key());
        tokio::time::timeout(Duration::from_secs(2), poller)
            .await
            .expect("poller should exit after finish")
            .unwrap();
    }
}
