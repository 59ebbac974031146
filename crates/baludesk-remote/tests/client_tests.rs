//! Integration tests for HttpRemoteClient against a mock BaluHost server

use chrono::{TimeZone, Utc};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use baludesk_core::domain::newtypes::Fingerprint;
use baludesk_core::ports::{RemoteChangeKind, RemoteClient, RemoteError, TransferHints};
use baludesk_remote::HttpRemoteClient;

async fn client(server: &MockServer) -> HttpRemoteClient {
    let client = HttpRemoteClient::new(server.uri(), TransferHints::default()).unwrap();
    client.set_token("test-token".to_string());
    client
}

fn fp(contents: &[u8]) -> String {
    Fingerprint::of_bytes(contents).as_str().to_string()
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn login_stores_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "token": "issued-token"
        })))
        .mount(&server)
        .await;

    let client = HttpRemoteClient::new(server.uri(), TransferHints::default()).unwrap();
    assert!(!client.is_authenticated());

    let token = client.login("alice", "secret").await.unwrap();
    assert_eq!(token, "issued-token");
    assert!(client.is_authenticated());
}

#[tokio::test]
async fn login_rejection_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = HttpRemoteClient::new(server.uri(), TransferHints::default()).unwrap();
    let err = client.login("alice", "wrong").await.unwrap_err();
    assert!(matches!(err, RemoteError::Unauthorized));
}

#[tokio::test]
async fn calls_without_token_fail_without_network() {
    // No mock mounted: the call must fail before reaching the server.
    let server = MockServer::start().await;
    let client = HttpRemoteClient::new(server.uri(), TransferHints::default()).unwrap();

    let err = client.list_files("/docs").await.unwrap_err();
    assert!(matches!(err, RemoteError::Unauthorized));
}

// ============================================================================
// Listing
// ============================================================================

#[tokio::test]
async fn list_files_parses_entries() {
    let server = MockServer::start().await;
    let modified = Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0).unwrap();
    Mock::given(method("GET"))
        .and(path("/api/files"))
        .and(query_param("path", "/docs"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {
                "path": "a.txt",
                "size": 5,
                "modified": modified.to_rfc3339(),
                "fingerprint": fp(b"hello"),
                "is_dir": false
            },
            {
                "path": "sub",
                "size": 0,
                "modified": modified.to_rfc3339(),
                "fingerprint": null,
                "is_dir": true
            }
        ])))
        .mount(&server)
        .await;

    let files = client(&server).await.list_files("/docs").await.unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].relative_path.as_str(), "a.txt");
    assert_eq!(files[0].size, 5);
    assert_eq!(files[0].fingerprint, Some(Fingerprint::of_bytes(b"hello")));
    assert!(files[1].is_dir);
}

// ============================================================================
// Transfers
// ============================================================================

#[tokio::test]
async fn upload_sends_bytes_and_returns_receipt() {
    let server = MockServer::start().await;
    let modified = Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0).unwrap();
    Mock::given(method("PUT"))
        .and(path("/api/files/docs/a.txt"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "modified": modified.to_rfc3339(),
            "fingerprint": fp(b"payload")
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("a.txt");
    tokio::fs::write(&local, b"payload").await.unwrap();

    let receipt = client(&server)
        .await
        .upload(&local, "/docs/a.txt")
        .await
        .unwrap();
    assert_eq!(receipt.remote_modified, modified);
    assert_eq!(receipt.fingerprint, Some(Fingerprint::of_bytes(b"payload")));
}

#[tokio::test]
async fn download_stages_bytes_and_reads_headers() {
    let server = MockServer::start().await;
    let modified = Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0).unwrap();
    Mock::given(method("GET"))
        .and(path("/api/files/docs/a.txt/content"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"remote bytes".to_vec())
                .insert_header("x-balu-modified", modified.to_rfc3339().as_str())
                .insert_header("x-balu-fingerprint", fp(b"remote bytes").as_str()),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let temp = dir.path().join("a.txt.baludesk-part");

    let receipt = client(&server)
        .await
        .download("/docs/a.txt", &temp)
        .await
        .unwrap();

    let staged = tokio::fs::read(&temp).await.unwrap();
    assert_eq!(staged, b"remote bytes");
    assert_eq!(receipt.remote_modified, modified);
    assert_eq!(
        receipt.fingerprint,
        Some(Fingerprint::of_bytes(b"remote bytes"))
    );
}

#[tokio::test]
async fn server_errors_are_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/files"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client(&server).await.list_files("/docs").await.unwrap_err();
    assert!(err.is_retryable());
}

// ============================================================================
// Deletion
// ============================================================================

#[tokio::test]
async fn delete_treats_missing_as_success() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/files/docs/gone.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    client(&server)
        .await
        .delete("/docs/gone.txt")
        .await
        .unwrap();
}

// ============================================================================
// Changes feed
// ============================================================================

#[tokio::test]
async fn changes_since_parses_all_kinds() {
    let server = MockServer::start().await;
    let modified = Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0).unwrap();
    Mock::given(method("GET"))
        .and(path("/api/changes"))
        .and(query_param("path", "/docs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {
                "path": "new.txt",
                "kind": "created",
                "modified": modified.to_rfc3339(),
                "size": 3,
                "fingerprint": fp(b"new")
            },
            {
                "path": "changed.txt",
                "kind": "modified",
                "modified": modified.to_rfc3339(),
                "size": 7,
                "fingerprint": null
            },
            {
                "path": "old.txt",
                "kind": "deleted",
                "modified": null,
                "size": null,
                "fingerprint": null
            }
        ])))
        .mount(&server)
        .await;

    let changes = client(&server)
        .await
        .changes_since("/docs", Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap())
        .await
        .unwrap();

    assert_eq!(changes.len(), 3);
    assert_eq!(changes[0].kind, RemoteChangeKind::Created);
    assert_eq!(changes[1].kind, RemoteChangeKind::Modified);
    assert!(changes[1].fingerprint.is_none());
    assert_eq!(changes[2].kind, RemoteChangeKind::Deleted);
    assert!(changes[2].remote_modified.is_none());
}

#[tokio::test]
async fn changes_since_unsupported_signals_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/changes"))
        .respond_with(ResponseTemplate::new(501))
        .mount(&server)
        .await;

    let err = client(&server)
        .await
        .changes_since("/docs", Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Unsupported(_)));
}
