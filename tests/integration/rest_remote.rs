//! HTTP remote against a mock server
//!
//! Checks the request shapes `RestRemote` sends: table paths, filters,
//! auth headers, upsert preference and storage uploads.

use crate::common::*;
use crate::{assert_completed, assert_ok};
use assert_matches::assert_matches;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use surveysync::app::sync::{BlobStore, RemoteError, RemoteStore, RestRemote};
use surveysync::shared::survey::{Photo, Project};
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "anon-key";

fn rest(server: &MockServer) -> RestRemote {
    assert_ok!(RestRemote::new(
        server.uri(),
        API_KEY,
        "install-photos",
        Duration::from_secs(5),
    ))
}

#[tokio::test]
async fn test_upsert_posts_with_merge_preference() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();
    Mock::given(method("POST"))
        .and(path("/rest/v1/projects"))
        .and(query_param("on_conflict", "id"))
        .and(header("apikey", API_KEY))
        .and(header("Authorization", format!("Bearer {}", API_KEY).as_str()))
        .and(header("Prefer", "resolution=merge-duplicates"))
        .and(body_partial_json(json!({ "id": id, "user_id": USER })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let remote = rest(&server);
    assert_ok!(
        remote
            .upsert("projects", json!({ "id": id, "name": "Site", "user_id": USER }))
            .await
    );
}

#[tokio::test]
async fn test_access_token_replaces_api_key_as_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/floors"))
        .and(query_param("user_id", format!("eq.{}", USER).as_str()))
        .and(header("apikey", API_KEY))
        .and(header("Authorization", "Bearer user-jwt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": Uuid::new_v4(), "name": "Ground", "user_id": USER }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let remote = rest(&server);
    remote.set_access_token(Some("user-jwt".to_string()));
    let rows = assert_ok!(remote.select_by_owner("floors", USER).await);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "Ground");
}

#[tokio::test]
async fn test_delete_filters_by_id() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/measurements"))
        .and(query_param("id", format!("eq.{}", id).as_str()))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    assert_ok!(rest(&server).delete("measurements", id).await);
}

#[tokio::test]
async fn test_error_status_is_reported_with_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/floors"))
        .respond_with(ResponseTemplate::new(409).set_body_string("violates foreign key"))
        .mount(&server)
        .await;

    let result = rest(&server).upsert("floors", json!({ "id": Uuid::new_v4() })).await;
    assert_matches!(
        result,
        Err(RemoteError::Status { status: 409, ref body }) if body.contains("foreign key")
    );
}

#[tokio::test]
async fn test_undecodable_select_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/projects"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let result = rest(&server).select_by_owner("projects", USER).await;
    assert_matches!(result, Err(RemoteError::Decode(_)));
}

#[tokio::test]
async fn test_photo_upload_path() {
    let server = MockServer::start().await;
    let photo = Photo::new(Uuid::new_v4(), "Site", vec![0xFF, 0xD8, 0xFF]);
    let expected = format!("{}/{}/{}.jpg", USER, photo.project_id, photo.id);
    Mock::given(method("POST"))
        .and(path(format!("/storage/v1/object/install-photos/{}", expected).as_str()))
        .and(header("x-upsert", "true"))
        .and(header("Content-Type", "image/jpeg"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let stored = assert_ok!(rest(&server).upload_photo(USER, &photo).await);
    assert_eq!(stored, expected);
}

#[tokio::test]
async fn test_engine_pushes_through_http() {
    let server = MockServer::start().await;
    let project = Project::new("Over the wire");
    Mock::given(method("POST"))
        .and(path("/rest/v1/projects"))
        .and(body_partial_json(json!({ "id": project.id, "user_id": USER })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let remote = Arc::new(rest(&server));
    let h = harness().build(remote.clone(), remote).await;
    h.db.put(&project).await.unwrap();

    let report = assert_completed!(h.engine.sync_with_server().await);
    assert_eq!(report.applied, 1);
    assert!(h.db.queue().is_empty().await.unwrap());
}

#[tokio::test]
async fn test_server_error_keeps_record_queued() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/projects"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let remote = Arc::new(rest(&server));
    let h = harness().build(remote.clone(), remote).await;
    h.db.put(&Project::new("Retry me")).await.unwrap();

    let report = assert_completed!(h.engine.sync_with_server().await);
    assert_eq!(report.failed, 1);

    let queued = h.db.queue().drain().await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].attempts, 1);
}
