//! IPC service tests over in-memory duplex connections
//!
//! Exercises the full request/response loop against a real store and
//! engine, with a stub remote client (no network involved).

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use baludesk_core::config::Config;
use baludesk_core::domain::{
    Conflict, ConflictKind, ConflictPolicy, RelativePath, SideVersion,
};
use baludesk_core::ports::{
    Clock, EngineEvent, Notifier, RemoteChange, RemoteClient, RemoteError, RemoteFile,
    Sha256Hasher, StateStore, SystemClock, TransferReceipt,
};
use baludesk_ipc::{BroadcastNotifier, IpcServer};
use baludesk_store::{DatabasePool, SqliteStateStore};
use baludesk_sync::{ConflictResolver, IgnoreRules, SyncEngine, SyncScheduler, WatcherFacade};

/// Remote stub: the IPC tests never reach the network
struct StubRemote;

#[async_trait::async_trait]
impl RemoteClient for StubRemote {
    async fn login(&self, _username: &str, _password: &str) -> Result<String, RemoteError> {
        Ok("token".to_string())
    }

    fn set_token(&self, _token: String) {}

    fn is_authenticated(&self) -> bool {
        true
    }

    async fn list_files(&self, _remote_path: &str) -> Result<Vec<RemoteFile>, RemoteError> {
        Ok(Vec::new())
    }

    async fn upload(
        &self,
        _local_path: &Path,
        _remote_path: &str,
    ) -> Result<TransferReceipt, RemoteError> {
        Ok(TransferReceipt {
            remote_modified: Utc::now(),
            fingerprint: None,
        })
    }

    async fn download(
        &self,
        remote_path: &str,
        _local_temp_path: &Path,
    ) -> Result<TransferReceipt, RemoteError> {
        Err(RemoteError::NotFound(remote_path.to_string()))
    }

    async fn delete(&self, _remote_path: &str) -> Result<(), RemoteError> {
        Ok(())
    }

    async fn changes_since(
        &self,
        _remote_root: &str,
        _since: DateTime<Utc>,
    ) -> Result<Vec<RemoteChange>, RemoteError> {
        Ok(Vec::new())
    }
}

struct Harness {
    server: Arc<IpcServer>,
    store: Arc<dyn StateStore>,
    notifier: BroadcastNotifier,
}

async fn harness() -> Harness {
    let pool = DatabasePool::in_memory().await.unwrap();
    let store: Arc<dyn StateStore> = Arc::new(SqliteStateStore::new(pool.pool().clone()));
    let remote: Arc<dyn RemoteClient> = Arc::new(StubRemote);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let hasher = Arc::new(Sha256Hasher);
    let notifier = BroadcastNotifier::new();
    let cancel = CancellationToken::new();

    let engine = Arc::new(SyncEngine::new(
        store.clone(),
        remote.clone(),
        hasher.clone(),
        clock.clone(),
        Arc::new(notifier.clone()),
        &Config::default(),
        cancel.clone(),
    ));
    let resolver = Arc::new(ConflictResolver::new(
        store.clone(),
        remote,
        hasher,
        clock.clone(),
        Arc::new(notifier.clone()),
        cancel.clone(),
    ));

    // A scheduler handle whose loop never runs: commands are fire-and-forget
    // and the handle tolerates the closed channel.
    let (watcher, watch_rx) = WatcherFacade::new(IgnoreRules::standard());
    let (scheduler, handle) = SyncScheduler::new(
        engine.clone(),
        store.clone(),
        Arc::new(notifier.clone()),
        watcher,
        watch_rx,
        std::time::Duration::from_secs(3600),
        cancel.clone(),
    );
    drop(scheduler);

    let server = Arc::new(IpcServer::new(
        store.clone(),
        engine,
        resolver,
        handle,
        clock,
        ConflictPolicy::Ask,
        notifier.sender(),
        cancel,
    ));

    Harness {
        server,
        store,
        notifier,
    }
}

/// Opens a duplex "connection" served by the IPC server
async fn connect(
    server: Arc<IpcServer>,
) -> (
    tokio::io::WriteHalf<tokio::io::DuplexStream>,
    tokio::io::Lines<BufReader<tokio::io::ReadHalf<tokio::io::DuplexStream>>>,
) {
    let (client, served) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move { server.handle_connection(served).await });

    let (read, write) = tokio::io::split(client);
    (write, BufReader::new(read).lines())
}

async fn roundtrip(
    write: &mut tokio::io::WriteHalf<tokio::io::DuplexStream>,
    lines: &mut tokio::io::Lines<BufReader<tokio::io::ReadHalf<tokio::io::DuplexStream>>>,
    request: &str,
) -> serde_json::Value {
    write.write_all(request.as_bytes()).await.unwrap();
    write.write_all(b"\n").await.unwrap();

    let line = tokio::time::timeout(std::time::Duration::from_secs(5), lines.next_line())
        .await
        .expect("response timed out")
        .unwrap()
        .expect("connection closed");
    serde_json::from_str(&line).unwrap()
}

#[tokio::test]
async fn ping_pongs() {
    let h = harness().await;
    let (mut write, mut lines) = connect(h.server.clone()).await;

    let response = roundtrip(&mut write, &mut lines, r#"{"type":"ping","requestId":"r1"}"#).await;
    assert_eq!(response["type"], "response");
    assert_eq!(response["requestId"], "r1");
    assert_eq!(response["ok"], true);
    assert_eq!(response["data"]["pong"], true);
}

#[tokio::test]
async fn malformed_requests_keep_the_connection_alive() {
    let h = harness().await;
    let (mut write, mut lines) = connect(h.server.clone()).await;

    let response = roundtrip(&mut write, &mut lines, r#"{"type":"explode"}"#).await;
    assert_eq!(response["ok"], false);

    // The connection still answers afterwards.
    let response = roundtrip(&mut write, &mut lines, r#"{"type":"ping"}"#).await;
    assert_eq!(response["ok"], true);
}

#[tokio::test]
async fn add_and_list_folders() {
    let h = harness().await;
    let dir = tempfile::tempdir().unwrap();
    let (mut write, mut lines) = connect(h.server.clone()).await;

    let request = serde_json::json!({
        "type": "add_sync_folder",
        "requestId": "r2",
        "payload": {
            "local_path": dir.path().to_string_lossy(),
            "remote_path": "/team/docs",
            "conflict_resolution": "keep_newest"
        }
    });
    let response = roundtrip(&mut write, &mut lines, &request.to_string()).await;
    assert_eq!(response["ok"], true, "add failed: {response}");

    let response = roundtrip(&mut write, &mut lines, r#"{"type":"get_folders"}"#).await;
    assert_eq!(response["ok"], true);
    let folders = response["data"].as_array().unwrap();
    assert_eq!(folders.len(), 1);
    assert_eq!(folders[0]["remote_path"], "/team/docs");
    assert_eq!(folders[0]["policy"], "keep_newest");
}

#[tokio::test]
async fn add_folder_rejects_relative_paths() {
    let h = harness().await;
    let (mut write, mut lines) = connect(h.server.clone()).await;

    let response = roundtrip(
        &mut write,
        &mut lines,
        r#"{"type":"add_sync_folder","payload":{"local_path":"not/absolute","remote_path":"/r"}}"#,
    )
    .await;
    assert_eq!(response["ok"], false);
}

#[tokio::test]
async fn pause_and_resume_one_folder() {
    let h = harness().await;
    let dir = tempfile::tempdir().unwrap();

    let folder = baludesk_core::domain::SyncFolder::new(
        dir.path().to_path_buf(),
        "/r",
        ConflictPolicy::Ask,
        Utc::now(),
    )
    .unwrap();
    h.store.add_folder(&folder).await.unwrap();

    let (mut write, mut lines) = connect(h.server.clone()).await;

    let request = serde_json::json!({
        "type": "pause_sync",
        "payload": { "folder_id": folder.id() }
    });
    let response = roundtrip(&mut write, &mut lines, &request.to_string()).await;
    assert_eq!(response["data"]["paused"], true);

    let request = serde_json::json!({
        "type": "get_sync_state",
        "payload": { "folder_id": folder.id() }
    });
    let response = roundtrip(&mut write, &mut lines, &request.to_string()).await;
    assert_eq!(response["data"]["folders"][0]["paused"], true);

    let request = serde_json::json!({
        "type": "resume_sync",
        "payload": { "folder_id": folder.id() }
    });
    let response = roundtrip(&mut write, &mut lines, &request.to_string()).await;
    assert_eq!(response["data"]["paused"], false);
}

#[tokio::test]
async fn pending_conflicts_and_ignore_resolution() {
    let h = harness().await;
    let dir = tempfile::tempdir().unwrap();

    let folder = baludesk_core::domain::SyncFolder::new(
        dir.path().to_path_buf(),
        "/r",
        ConflictPolicy::Ask,
        Utc::now(),
    )
    .unwrap();
    h.store.add_folder(&folder).await.unwrap();

    let conflict = Conflict::new(
        folder.id(),
        None,
        RelativePath::new("a.txt").unwrap(),
        ConflictKind::BothModified,
        SideVersion::default(),
        SideVersion::default(),
        Utc::now(),
    );
    h.store.log_conflict(&conflict).await.unwrap();

    let (mut write, mut lines) = connect(h.server.clone()).await;

    let response = roundtrip(&mut write, &mut lines, r#"{"type":"get_pending_conflicts"}"#).await;
    let pending = response["data"].as_array().unwrap();
    assert_eq!(pending.len(), 1);

    let request = serde_json::json!({
        "type": "resolve_conflict",
        "payload": { "conflict_id": conflict.id(), "resolution": "ignored" }
    });
    let response = roundtrip(&mut write, &mut lines, &request.to_string()).await;
    assert_eq!(response["ok"], true, "resolve failed: {response}");

    let response = roundtrip(&mut write, &mut lines, r#"{"type":"get_pending_conflicts"}"#).await;
    assert!(response["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn engine_events_are_broadcast_to_clients() {
    let h = harness().await;
    let (_write, mut lines) = connect(h.server.clone()).await;

    // Give the connection task a moment to subscribe.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    h.notifier.notify(EngineEvent::Error {
        folder: None,
        path: None,
        message: "remote unreachable".to_string(),
    });

    let line = tokio::time::timeout(std::time::Duration::from_secs(5), lines.next_line())
        .await
        .expect("event timed out")
        .unwrap()
        .expect("connection closed");
    let event: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(event["type"], "error");
    assert_eq!(event["message"], "remote unreachable");
}
