//! Session lifecycle through `AppState`
//!
//! Sign-in pulls, sign-out and user switches purge, and one user's queued
//! writes never reach the remote under another identity.

use crate::assert_ok;
use crate::common::*;
use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use surveysync::app::session::SessionError;
use surveysync::app::sync::{MemoryRemote, SyncError};
use surveysync::app::AppError;
use surveysync::shared::survey::{Photo, Project};
use uuid::Uuid;

fn seed_project(remote: &MemoryRemote, owner: &str, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    let now = chrono::Utc::now().to_rfc3339();
    remote.insert_row(
        "projects",
        json!({
            "id": id,
            "name": name,
            "project_type": "SURVEY",
            "user_id": owner,
            "created_at": now,
            "updated_at": now,
        }),
    );
    id
}

#[tokio::test]
async fn test_sign_in_pulls_only_own_rows() {
    let remote = Arc::new(MemoryRemote::new());
    let mine = seed_project(&remote, USER, "Mine");
    seed_project(&remote, OTHER_USER, "Theirs");
    // Floor pointing at a project that is not part of the pull
    remote.insert_row(
        "floors",
        json!({
            "id": Uuid::new_v4(),
            "project_id": Uuid::new_v4(),
            "name": "Lost",
            "level": "1",
            "user_id": USER,
        }),
    );

    let state = app_state(remote.clone()).await;
    state.set_online(true);
    let report = assert_ok!(state.sign_in(USER).await).expect("online sign-in pulls");

    assert_eq!(report.projects, 1);
    assert_eq!(report.floors, 0);
    assert_eq!(report.skipped, 1);

    let projects = state.projects();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].id, mine);
    assert!(state.floors().is_empty());

    // Pulled rows are not echoed back to the remote
    let status = state.sync_status().await.unwrap();
    assert_eq!(status.pending, 0);
    assert!(status.last_pull.is_some());
}

#[tokio::test]
async fn test_offline_sign_in_skips_pull() {
    let remote = Arc::new(MemoryRemote::new());
    seed_project(&remote, USER, "Waiting");

    let state = app_state(remote.clone()).await;
    assert_eq!(state.sign_in(USER).await.unwrap(), None);
    assert!(state.projects().is_empty());
    assert!(remote.calls().is_empty());

    state.set_online(true);
    let report = state.refresh_from_server().await.unwrap();
    assert_eq!(report.projects, 1);
    assert_eq!(state.projects().len(), 1);
}

#[tokio::test]
async fn test_queued_writes_never_cross_users() {
    let remote = Arc::new(MemoryRemote::new());
    let state = app_state(remote.clone()).await;

    // Offline work by the first user
    state.sign_in(USER).await.unwrap();
    let private = state.add_project(Project::new("Private")).await.unwrap();
    state
        .add_photo(Photo::new(private.id, "Private", vec![1, 2, 3]))
        .await
        .unwrap();
    assert_eq!(state.sync_status().await.unwrap().pending, 1);

    // Second user signs in on the same device, then connectivity returns
    state.sign_in(OTHER_USER).await.unwrap();
    state.set_online(true);
    state.sign_in(OTHER_USER).await.unwrap();

    assert!(remote.row("projects", private.id).is_none());
    assert!(!was_written(&remote.calls(), private.id));

    let snapshot = state.snapshot();
    assert!(snapshot.projects.is_empty());
    assert!(snapshot.photos.is_empty());
    assert_eq!(snapshot.user_id.as_deref(), Some(OTHER_USER));
}

#[tokio::test]
async fn test_same_user_keeps_unpushed_work() {
    let remote = Arc::new(MemoryRemote::new());
    let state = app_state(remote.clone()).await;

    state.sign_in(USER).await.unwrap();
    let project = state.add_project(Project::new("Draft")).await.unwrap();

    state.sign_in(USER).await.unwrap();
    assert_eq!(state.projects().len(), 1);
    assert_eq!(state.sync_status().await.unwrap().pending, 1);

    state.set_online(true);
    state.sign_in(USER).await.unwrap();
    assert!(remote.row("projects", project.id).is_some());
    assert_eq!(state.sync_status().await.unwrap().pending, 0);
}

#[tokio::test]
async fn test_sign_out_clears_everything() {
    let remote = Arc::new(MemoryRemote::new());
    let state = app_state(remote.clone()).await;

    state.sign_in(USER).await.unwrap();
    state.add_project(Project::new("Gone soon")).await.unwrap();
    state.sign_out().await.unwrap();

    let snapshot = state.snapshot();
    assert!(snapshot.projects.is_empty());
    assert_eq!(snapshot.user_id, None);

    let stats = state.database().get_stats().await.unwrap();
    assert_eq!(stats.project_count, 0);
    assert_eq!(stats.pending_mutations, 0);
    assert!(state.engine().identity().is_none());
}

#[tokio::test]
async fn test_failed_purge_keeps_previous_identity() {
    let remote = Arc::new(MemoryRemote::new());
    let state = app_state(remote.clone()).await;
    state.sign_in(USER).await.unwrap();

    state.database().close().await;
    let result = state.sign_in(OTHER_USER).await;

    assert_matches!(result, Err(AppError::Session(SessionError::PurgeFailed(_))));
    assert_eq!(state.engine().identity().as_deref(), Some(USER));
    assert_eq!(state.current_user().as_deref(), Some(USER));
}

#[tokio::test]
async fn test_refresh_racing_user_switch_leaves_no_foreign_rows() {
    let memory = Arc::new(MemoryRemote::new());
    seed_project(&memory, USER, "First user's site");
    let gated = Arc::new(GatedRemote::new(memory.clone(), "projects"));
    let state = Arc::new(app_state_with(gated.clone(), memory.clone()).await);

    // Offline sign-in, so the gate is still armed
    state.sign_in(USER).await.unwrap();
    state.set_online(true);

    let refresh = tokio::spawn({
        let state = state.clone();
        async move { state.refresh_from_server().await }
    });
    gated.wait_entered().await;
    let switch = tokio::spawn({
        let state = state.clone();
        async move { state.sign_in(OTHER_USER).await }
    });
    tokio::task::yield_now().await;
    gated.open();

    assert_ok!(refresh.await.unwrap());
    assert_ok!(switch.await.unwrap());

    assert_eq!(state.current_user().as_deref(), Some(OTHER_USER));
    assert!(state.projects().is_empty());
    assert!(state.database().get_all::<Project>().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pull_drops_rows_fetched_for_previous_identity() {
    let memory = Arc::new(MemoryRemote::new());
    seed_project(&memory, USER, "First user's site");
    let gated = Arc::new(GatedRemote::new(memory.clone(), "projects"));
    let h = harness().build(gated.clone(), memory.clone()).await;

    let pull = tokio::spawn({
        let engine = h.engine.clone();
        async move { engine.load_data_from_server().await }
    });
    gated.wait_entered().await;
    h.engine.set_identity(Some(OTHER_USER.to_string()));
    gated.open();

    assert_matches!(pull.await.unwrap(), Err(SyncError::IdentityChanged));
    assert!(h.db.get_all::<Project>().await.unwrap().is_empty());
    assert!(h.db.last_pull_time().await.unwrap().is_none());
}
