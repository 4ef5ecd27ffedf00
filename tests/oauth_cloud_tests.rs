mod common;

use std::{net::TcpListener, sync::Arc, time::Duration};

use backup_core::{
    backup::BackupCoordinator,
    catalog::BackupCatalog,
    clock::FixedClock,
    codec::SnapshotCodec,
    config::OAuthConfig,
    database::RecordStore,
    errors::{AuthError, BackendError, BackupError},
    oauth::{AuthorizationState, OAuthSession, StaticTokenAuthorizer},
    restore::RestoreCoordinator,
    storage::{OAuthCloudBackend, StorageBackend},
};
use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::{
    matchers::{any, body_bytes, body_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use common::test_home;

const TOKEN: &str = "tok-1";

async fn connected_session() -> Arc<OAuthSession> {
    let session = Arc::new(OAuthSession::new(Arc::new(StaticTokenAuthorizer::new(
        Some(TOKEN.into()),
    ))));
    session.authorize().await.expect("authorize");
    session
}

fn backend_for(base_url: &str, session: Arc<OAuthSession>) -> OAuthCloudBackend {
    OAuthCloudBackend::new(session, &OAuthConfig::with_base_url(base_url)).expect("backend")
}

fn upload_arg(name: &str) -> String {
    format!(r#"{{"path":"/backups/{name}","mode":"add","autorename":false,"mute":true}}"#)
}

fn conflict_body(summary: &str) -> serde_json::Value {
    json!({ "error_summary": summary, "error": { ".tag": "path" } })
}

#[tokio::test]
async fn unauthenticated_calls_never_reach_the_service() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let session = Arc::new(OAuthSession::new(Arc::new(StaticTokenAuthorizer::new(None))));
    let backend = backend_for(&server.uri(), session);

    let name = "snapshot_20261019_083000.bks";
    assert!(matches!(
        backend.write(name, b"blob").await,
        Err(BackendError::Auth(AuthError::Unauthenticated))
    ));
    assert!(matches!(
        backend.read(name).await,
        Err(BackendError::Auth(AuthError::Unauthenticated))
    ));
    assert!(matches!(
        backend.list().await,
        Err(BackendError::Auth(AuthError::Unauthenticated))
    ));
    assert!(matches!(
        backend.delete(name).await,
        Err(BackendError::Auth(AuthError::Unauthenticated))
    ));
}

#[tokio::test]
async fn upload_carries_bearer_token_and_exact_bytes() {
    let server = MockServer::start().await;
    let name = "snapshot_20261019_083000.bks";
    Mock::given(method("POST"))
        .and(path("/2/files/upload"))
        .and(header("authorization", "Bearer tok-1"))
        .and(header("Dropbox-API-Arg", upload_arg(name).as_str()))
        .and(body_bytes(b"snapshot-bytes".to_vec()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": name, "size": 14 })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_for(&server.uri(), connected_session().await);
    backend.write(name, b"snapshot-bytes").await.expect("upload");
}

#[tokio::test]
async fn name_conflict_moves_save_to_next_suffix() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/files/upload"))
        .and(header(
            "Dropbox-API-Arg",
            upload_arg("snapshot_20261019_083000.bks").as_str(),
        ))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(conflict_body("path/conflict/file/..")),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/2/files/upload"))
        .and(header(
            "Dropbox-API-Arg",
            upload_arg("snapshot_20261019_083000_2.bks").as_str(),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let home = test_home();
    let store = Arc::new(RecordStore::open(home.join("records.db")).expect("open store"));
    store.add("Buy milk").await.expect("add");
    let clock = FixedClock(
        Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0)
            .single()
            .expect("valid time"),
    );
    let coordinator = BackupCoordinator::new(SnapshotCodec::new(store, Duration::from_millis(200)))
        .with_clock(Arc::new(clock));

    let backend = backend_for(&server.uri(), connected_session().await);
    let id = coordinator.save(&backend).await.expect("save");
    assert_eq!(id, "snapshot_20261019_083000_2.bks");
}

#[tokio::test]
async fn missing_remote_snapshot_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/files/download"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(conflict_body("path/not_found/..")),
        )
        .mount(&server)
        .await;

    let backend = backend_for(&server.uri(), connected_session().await);
    let err = backend
        .read("snapshot_20261019_083000.bks")
        .await
        .expect_err("missing");
    assert!(matches!(err, BackendError::NotFound(ref name) if name == "snapshot_20261019_083000.bks"));
}

#[tokio::test]
async fn listing_follows_cursor_and_keeps_only_snapshots() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/files/list_folder"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entries": [
                { ".tag": "file", "name": "snapshot_20261018_080000.bks", "size": 120 },
                { ".tag": "folder", "name": "archive" },
                { ".tag": "file", "name": "notes.txt", "size": 3 }
            ],
            "cursor": "c1",
            "has_more": true
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/2/files/list_folder/continue"))
        .and(body_json(json!({ "cursor": "c1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entries": [
                { ".tag": "file", "name": "snapshot_20261019_080000.bks", "size": 140 }
            ],
            "cursor": "c2",
            "has_more": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_for(&server.uri(), connected_session().await);
    let rows = BackupCatalog::new().list(&backend).await.expect("list");
    let listed: Vec<_> = rows
        .iter()
        .map(|row| (row.identifier.as_str(), row.size_bytes))
        .collect();
    assert_eq!(
        listed,
        vec![
            ("snapshot_20261019_080000.bks", 140),
            ("snapshot_20261018_080000.bks", 120),
        ]
    );
}

#[tokio::test]
async fn missing_remote_folder_lists_as_empty() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/files/list_folder"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(conflict_body("path/not_found/...")),
        )
        .mount(&server)
        .await;

    let backend = backend_for(&server.uri(), connected_session().await);
    assert!(backend.list().await.expect("list").is_empty());
}

#[tokio::test]
async fn rejected_token_expires_session_without_retrying() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/files/list_folder"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error_summary": "expired_access_token/"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = connected_session().await;
    let backend = backend_for(&server.uri(), session.clone());

    assert!(matches!(
        backend.list().await,
        Err(BackendError::Auth(AuthError::Expired))
    ));
    assert_eq!(session.current_state(), AuthorizationState::Expired);
    assert!(matches!(
        backend.list().await,
        Err(BackendError::Auth(AuthError::Expired))
    ));

    session.authorize().await.expect("re-authorize");
    assert!(matches!(
        session.current_state(),
        AuthorizationState::Authenticated(_)
    ));
}

#[tokio::test]
async fn server_failure_is_reported_as_remote_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/files/delete_v2"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&server)
        .await;

    let backend = backend_for(&server.uri(), connected_session().await);
    let err = backend
        .delete("snapshot_20261019_083000.bks")
        .await
        .expect_err("server error");
    assert!(matches!(err, BackendError::Remote { status: 500, ref message } if message == "internal"));
}

#[tokio::test]
async fn unreachable_service_is_a_network_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };
    let backend = backend_for(&format!("http://127.0.0.1:{port}"), connected_session().await);

    let err = backend.list().await.expect_err("nothing listening");
    assert!(matches!(err, BackendError::Network(_)));
    assert!(err.guidance().contains("internet"));
}

#[tokio::test]
async fn restore_from_cloud_replaces_live_database() {
    let home = test_home();
    let store = Arc::new(RecordStore::open(home.join("records.db")).expect("open store"));
    store.add("Buy milk").await.expect("add");
    let blob = SnapshotCodec::new(store.clone(), Duration::from_millis(200))
        .encode()
        .await
        .expect("encode");
    store.add("Buy eggs").await.expect("add");

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/files/download"))
        .and(header(
            "Dropbox-API-Arg",
            r#"{"path":"/backups/snapshot_20261019_083000.bks"}"#,
        ))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(blob))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_for(&server.uri(), connected_session().await);
    RestoreCoordinator::new(store.clone(), store.clone())
        .restore(&backend, "snapshot_20261019_083000.bks")
        .await
        .expect("restore");

    let titles: Vec<_> = store.records().await.into_iter().map(|r| r.title).collect();
    assert_eq!(titles, vec!["Buy milk"]);
}

#[tokio::test]
async fn save_through_expired_session_fails_with_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/files/upload"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let home = test_home();
    let store = Arc::new(RecordStore::open(home.join("records.db")).expect("open store"));
    store.add("Buy milk").await.expect("add");
    let coordinator =
        BackupCoordinator::new(SnapshotCodec::new(store, Duration::from_millis(200)));

    let backend = backend_for(&server.uri(), connected_session().await);
    let err = coordinator.save(&backend).await.expect_err("expired");
    assert!(matches!(
        err,
        BackupError::Backend(BackendError::Auth(AuthError::Expired))
    ));
    assert!(err.guidance().contains("expired"));
}
