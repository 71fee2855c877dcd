//! End-to-end push scenarios
//!
//! Offline edits, reconnects, failures and retries, driven against the
//! in-memory remote authority.

use crate::common::*;
use crate::{assert_completed, assert_contains, assert_ok, assert_skipped};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use surveysync::app::sync::{rows, ConnectivityMonitor, MemoryRemote, RemoteStore, SkipReason};
use surveysync::shared::survey::{Floor, Measurement, MutationOp, Project, SpeedTest};

#[tokio::test]
async fn test_offline_edits_reach_remote_in_dependency_order() {
    let (h, remote) = harness().offline().build_in_memory().await;

    let project = Project::new("Warehouse");
    assert_ok!(h.db.put(&project).await);
    let floor = Floor::new(project.id, "Level 1", "1");
    assert_ok!(h.db.put(&floor).await);
    assert_ok!(h.db.put(&Measurement::new(project.id, Some(floor.id), 0.1, 0.1)).await);
    assert_ok!(h.db.put(&SpeedTest::new(120.0, 20.0, 18.0)).await);

    // Touch the project again so its update is queued after the children
    let mut renamed = project.clone();
    renamed.name = "Warehouse North".to_string();
    assert_ok!(h.db.put(&renamed).await);
    assert_skipped!(h.engine.sync_with_server().await, SkipReason::Offline);
    assert!(remote.calls().is_empty());

    h.monitor.set_online(true);
    let report = assert_completed!(h.engine.sync_with_server().await);
    assert_eq!(report.failed, 0);
    assert!(report.applied >= 4);

    let calls = remote.calls();
    assert_tables_ordered(&calls, "projects", "floors");
    assert_tables_ordered(&calls, "floors", "measurements");
    assert_tables_ordered(&calls, "measurements", "speed_tests");

    let row = remote.row("projects", project.id).expect("project pushed");
    assert_eq!(row["name"], "Warehouse North");
    assert_eq!(row["user_id"], USER);
    assert!(assert_ok!(h.db.queue().is_empty().await));
}

#[tokio::test]
async fn test_second_push_is_a_noop() {
    let (h, remote) = harness().build_in_memory().await;
    let project = Project::new("Depot");
    h.db.put(&project).await.unwrap();

    let first = assert_completed!(h.engine.sync_with_server().await);
    assert_eq!(first.applied, 1);
    remote.clear_calls();

    let second = assert_completed!(h.engine.sync_with_server().await);
    assert_eq!(second.applied, 0);
    assert!(remote.calls().is_empty());
    assert_eq!(remote.rows("projects").len(), 1);
}

#[tokio::test]
async fn test_replaying_an_applied_record_changes_nothing() {
    let (h, remote) = harness().offline().build_in_memory().await;
    let project = Project::new("Depot");
    let floor = Floor::new(project.id, "Ground", "0");
    h.db.put(&project).await.unwrap();
    h.db.put(&floor).await.unwrap();

    // The remote applied both records but the device went down before the
    // local dequeue, so they are still queued
    for record in h.db.queue().drain().await.unwrap() {
        let row = rows::to_remote_row(record.entity_type, &record.payload, USER).unwrap();
        assert_ok!(remote.upsert(record.entity_type.table(), row).await);
    }
    let projects_before = remote.rows("projects");
    let floors_before = remote.rows("floors");
    assert_eq!(assert_ok!(h.db.queue().len().await), 2);

    h.monitor.set_online(true);
    let report = assert_completed!(h.engine.sync_with_server().await);
    assert_eq!((report.applied, report.failed), (2, 0));

    assert_eq!(remote.rows("projects"), projects_before);
    assert_eq!(remote.rows("floors"), floors_before);
    assert!(assert_ok!(h.db.queue().is_empty().await));
}

#[tokio::test]
async fn test_failed_project_holds_back_its_floor() {
    let (h, remote) = harness().build_in_memory().await;
    let project = Project::new("Annex");
    let floor = Floor::new(project.id, "Basement", "-1");
    h.db.put(&project).await.unwrap();
    h.db.put(&floor).await.unwrap();
    let unrelated = Project::new("Unrelated");
    h.db.put(&unrelated).await.unwrap();

    remote.fail_for(project.id);
    let report = assert_completed!(h.engine.sync_with_server().await);
    assert_eq!(report.failed, 1);
    assert_eq!(report.deferred, 1);
    assert_eq!(report.applied, 1);

    // The floor was never offered to the remote
    assert!(!was_written(&remote.calls(), floor.id));
    assert!(remote.row("projects", unrelated.id).is_some());

    let queued = h.db.queue().drain().await.unwrap();
    assert_eq!(queued.len(), 2);
    assert_eq!(queued[0].entity_id, project.id);
    assert_eq!(queued[0].attempts, 1);
    assert_contains!(queued[0].last_error.as_deref().unwrap_or_default(), "503");
    assert_eq!(queued[1].entity_id, floor.id);
    assert_eq!(queued[1].attempts, 0);

    let status = h.engine.status().await.unwrap();
    assert_eq!(status.pending, 2);
    assert!(status.last_error.is_some());

    remote.heal();
    let report = assert_completed!(h.engine.sync_with_server().await);
    assert_eq!(report.applied, 2);
    assert!(remote.row("floors", floor.id).is_some());
    assert!(h.engine.status().await.unwrap().is_settled());
}

#[tokio::test]
async fn test_repeated_failure_parks_until_requeued() {
    let (h, remote) = harness().max_attempts(2).build_in_memory().await;
    let project = Project::new("Stubborn");
    h.db.put(&project).await.unwrap();
    remote.fail_for(project.id);

    assert_eq!(assert_completed!(h.engine.sync_with_server().await).failed, 1);
    let report = assert_completed!(h.engine.sync_with_server().await);
    assert_eq!(report.newly_parked, 1);

    remote.clear_calls();
    let report = assert_completed!(h.engine.sync_with_server().await);
    assert_eq!(report.parked, 1);
    assert!(remote.calls().is_empty());

    let status = h.engine.status().await.unwrap();
    assert_eq!(status.parked, 1);
    assert_eq!(status.pending, 1);

    remote.heal();
    assert_eq!(h.db.queue().requeue_parked().await.unwrap(), 1);
    let report = assert_completed!(h.engine.sync_with_server().await);
    assert_eq!(report.applied, 1);
    assert!(remote.row("projects", project.id).is_some());
}

#[tokio::test]
async fn test_create_then_delete_offline() {
    let (h, remote) = harness().offline().build_in_memory().await;
    let project = Project::new("Short lived");
    h.db.put(&project).await.unwrap();
    h.db.put(&Floor::new(project.id, "Ground", "0")).await.unwrap();
    assert!(h.db.delete::<Project>(project.id).await.unwrap());

    // The floor's record went with the cascade
    let queued = h.db.queue().drain().await.unwrap();
    let ops: Vec<_> = queued.iter().map(|r| r.operation).collect();
    assert_eq!(ops, vec![MutationOp::Create, MutationOp::Delete]);

    h.monitor.set_online(true);
    let report = assert_completed!(h.engine.sync_with_server().await);
    assert_eq!(report.applied, 2);
    assert!(remote.rows("projects").is_empty());
    assert!(remote.rows("floors").is_empty());
}

#[tokio::test]
async fn test_concurrent_push_is_skipped() {
    let memory = Arc::new(MemoryRemote::new());
    let slow = Arc::new(SlowRemote::new(memory.clone(), Duration::from_millis(200)));
    let h = harness().build(slow, memory.clone()).await;
    h.db.put(&Project::new("Slow")).await.unwrap();

    let engine = h.engine.clone();
    let first = tokio::spawn(async move { engine.sync_with_server().await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(h.engine.is_syncing());
    assert_skipped!(h.engine.sync_with_server().await, SkipReason::AlreadyRunning);

    let report = assert_completed!(first.await.unwrap());
    assert_eq!(report.applied, 1);
    assert!(!h.engine.is_syncing());
    assert_eq!(memory.rows("projects").len(), 1);
}

#[tokio::test]
async fn test_slow_remote_call_times_out() {
    let memory = Arc::new(MemoryRemote::new());
    let slow = Arc::new(SlowRemote::new(memory.clone(), Duration::from_millis(500)));
    let h = harness()
        .remote_timeout(Duration::from_millis(50))
        .build(slow, memory.clone())
        .await;
    h.db.put(&Project::new("Far away")).await.unwrap();

    let report = assert_completed!(h.engine.sync_with_server().await);
    assert_eq!(report.failed, 1);

    let queued = h.db.queue().drain().await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_contains!(queued[0].last_error.as_deref().unwrap_or_default(), "timed out");
}

#[tokio::test]
async fn test_connectivity_loss_stops_the_drain() {
    let memory = Arc::new(MemoryRemote::new());
    let monitor = ConnectivityMonitor::new(true);
    let flaky = Arc::new(FlakyLinkRemote::new(memory.clone(), monitor.clone(), 1));
    let h = harness().monitor(monitor).build(flaky, memory.clone()).await;

    let first = Project::new("First");
    let second = Project::new("Second");
    h.db.put(&first).await.unwrap();
    h.db.put(&second).await.unwrap();

    let report = assert_completed!(h.engine.sync_with_server().await);
    assert!(report.interrupted);
    assert_eq!(report.applied, 1);
    assert_eq!(report.deferred, 1);
    assert!(memory.row("projects", first.id).is_some());
    assert!(memory.row("projects", second.id).is_none());

    // The untouched record kept its attempt count
    let queued = h.db.queue().drain().await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].attempts, 0);
}

#[tokio::test]
async fn test_photos_upload_after_push() {
    let (h, remote) = harness().build_in_memory().await;
    let project = Project::new("Photographed");
    h.db.put(&project).await.unwrap();
    let photo = surveysync::shared::survey::Photo::new(project.id, "Photographed", vec![0xFF, 0xD8]);
    h.media.save(&photo).await.unwrap();

    assert_completed!(h.engine.sync_with_server().await);
    let uploads = h.engine.upload_pending_photos().await.unwrap();
    assert_eq!(uploads.uploaded, 1);

    let path = format!("{}/{}/{}.jpg", USER, project.id, photo.id);
    assert_eq!(remote.blob(&path), Some(vec![0xFF, 0xD8]));
    assert!(h.media.unsynced().await.unwrap().is_empty());

    // Nothing left to upload
    assert_eq!(h.engine.upload_pending_photos().await.unwrap().uploaded, 0);
}
