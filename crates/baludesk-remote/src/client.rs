//! BaluHost HTTP client
//!
//! Typed client for the BaluHost file API. Handles bearer authentication,
//! JSON (de)serialization, streamed downloads, and the mapping from HTTP
//! status codes onto [`RemoteError`]'s transient/fatal split:
//!
//! | Status                  | Error                      |
//! |-------------------------|----------------------------|
//! | 401, 403                | `Unauthorized`             |
//! | 404                     | `NotFound`                 |
//! | 410, 501                | `Unsupported` (changes feed) |
//! | 429, 5xx                | `Transient`                |
//! | other 4xx               | `Fatal`                    |
//!
//! Connection failures and timeouts are `Transient`. Every call carries a
//! per-request timeout (default 30 s).

use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

use baludesk_core::ports::{
    RemoteChange, RemoteChangeKind, RemoteClient, RemoteError, RemoteFile, TransferHints,
    TransferReceipt,
};
use baludesk_core::domain::newtypes::{Fingerprint, RelativePath};

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Advisory hint headers the server may honor
const HEADER_CHUNK_SIZE: &str = "x-balu-chunk-size-mb";
const HEADER_BANDWIDTH: &str = "x-balu-bandwidth-mbps";

/// Response headers carrying transfer receipts on downloads
const HEADER_MODIFIED: &str = "x-balu-modified";
const HEADER_FINGERPRINT: &str = "x-balu-fingerprint";

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct FileEntryResponse {
    path: String,
    size: u64,
    modified: DateTime<Utc>,
    fingerprint: Option<String>,
    #[serde(default)]
    is_dir: bool,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    modified: DateTime<Utc>,
    fingerprint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChangeResponse {
    path: String,
    kind: String,
    modified: Option<DateTime<Utc>>,
    size: Option<u64>,
    fingerprint: Option<String>,
}

// ============================================================================
// HttpRemoteClient
// ============================================================================

/// [`RemoteClient`] implementation over the BaluHost REST API
pub struct HttpRemoteClient {
    http: Client,
    base_url: String,
    token: RwLock<Option<String>>,
    hints: TransferHints,
}

impl HttpRemoteClient {
    /// Creates a client for `base_url` with the default timeout
    pub fn new(base_url: impl Into<String>, hints: TransferHints) -> anyhow::Result<Self> {
        Self::with_timeout(base_url, hints, DEFAULT_TIMEOUT)
    }

    /// Creates a client with an explicit per-request timeout
    pub fn with_timeout(
        base_url: impl Into<String>,
        hints: TransferHints,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("could not build HTTP client: {e}"))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: RwLock::new(None),
            hints,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attaches the bearer token and advisory hints to a request
    fn authed(&self, builder: RequestBuilder) -> Result<RequestBuilder, RemoteError> {
        let token = self
            .token
            .read()
            .expect("token lock poisoned")
            .clone()
            .ok_or(RemoteError::Unauthorized)?;

        let mut builder = builder.bearer_auth(token);
        builder = builder.header(HEADER_CHUNK_SIZE, self.hints.chunk_size_mb);
        if self.hints.bandwidth_limit_mbps > 0 {
            builder = builder.header(HEADER_BANDWIDTH, self.hints.bandwidth_limit_mbps);
        }
        Ok(builder)
    }
}

/// Maps a reqwest transport error to [`RemoteError`]
fn transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() || err.is_connect() {
        RemoteError::Transient(err.to_string())
    } else {
        RemoteError::Fatal(err.to_string())
    }
}

/// Maps a non-success HTTP status to [`RemoteError`]
fn status_error(status: StatusCode, context: &str) -> RemoteError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Unauthorized,
        StatusCode::NOT_FOUND => RemoteError::NotFound(context.to_string()),
        StatusCode::GONE | StatusCode::NOT_IMPLEMENTED => {
            RemoteError::Unsupported(context.to_string())
        }
        StatusCode::TOO_MANY_REQUESTS => {
            RemoteError::Transient(format!("rate limited during {context}"))
        }
        s if s.is_server_error() => {
            RemoteError::Transient(format!("server error {s} during {context}"))
        }
        s => RemoteError::Fatal(format!("unexpected status {s} during {context}")),
    }
}

/// Checks a response's status, consuming error bodies
async fn check(response: Response, context: &str) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(status_error(status, context))
    }
}

fn parse_fingerprint(raw: Option<String>) -> Option<Fingerprint> {
    match raw {
        Some(s) => match Fingerprint::new(s) {
            Ok(fp) => Some(fp),
            Err(e) => {
                warn!(error = %e, "Server sent an unparseable fingerprint, ignoring");
                None
            }
        },
        None => None,
    }
}

fn parse_change_kind(raw: &str) -> Option<RemoteChangeKind> {
    match raw {
        "created" => Some(RemoteChangeKind::Created),
        "modified" => Some(RemoteChangeKind::Modified),
        "deleted" => Some(RemoteChangeKind::Deleted),
        _ => None,
    }
}

#[async_trait::async_trait]
impl RemoteClient for HttpRemoteClient {
    #[instrument(skip(self, password))]
    async fn login(&self, username: &str, password: &str) -> Result<String, RemoteError> {
        let response = self
            .http
            .post(self.url("/api/auth/login"))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await
            .map_err(transport_error)?;

        let response = check(response, "login").await?;
        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Fatal(format!("malformed login response: {e}")))?;

        *self.token.write().expect("token lock poisoned") = Some(body.token.clone());
        debug!(username, "Authenticated with remote");
        Ok(body.token)
    }

    fn set_token(&self, token: String) {
        *self.token.write().expect("token lock poisoned") = Some(token);
    }

    fn is_authenticated(&self) -> bool {
        self.token.read().expect("token lock poisoned").is_some()
    }

    #[instrument(skip(self))]
    async fn list_files(&self, remote_path: &str) -> Result<Vec<RemoteFile>, RemoteError> {
        let request = self
            .authed(self.http.get(self.url("/api/files")))?
            .query(&[("path", remote_path), ("recursive", "true")]);

        let response = check(request.send().await.map_err(transport_error)?, "list").await?;
        let entries: Vec<FileEntryResponse> = response
            .json()
            .await
            .map_err(|e| RemoteError::Fatal(format!("malformed listing: {e}")))?;

        let mut files = Vec::with_capacity(entries.len());
        for entry in entries {
            let relative_path = match RelativePath::new(entry.path.trim_start_matches('/')) {
                Ok(path) => path,
                Err(e) => {
                    warn!(path = %entry.path, error = %e, "Skipping unmappable listing entry");
                    continue;
                }
            };
            files.push(RemoteFile {
                relative_path,
                size: entry.size,
                remote_modified: entry.modified,
                fingerprint: parse_fingerprint(entry.fingerprint),
                is_dir: entry.is_dir,
            });
        }
        Ok(files)
    }

    #[instrument(skip(self), fields(local = %local_path.display()))]
    async fn upload(
        &self,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<TransferReceipt, RemoteError> {
        let bytes = tokio::fs::read(local_path).await?;
        let size = bytes.len();

        let request = self
            .authed(self.http.put(self.url(&format!("/api/files{remote_path}"))))?
            .body(bytes);

        let response = check(request.send().await.map_err(transport_error)?, "upload").await?;
        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Fatal(format!("malformed upload response: {e}")))?;

        debug!(remote_path, size, "Upload accepted");
        Ok(TransferReceipt {
            remote_modified: body.modified,
            fingerprint: parse_fingerprint(body.fingerprint),
        })
    }

    #[instrument(skip(self), fields(temp = %local_temp_path.display()))]
    async fn download(
        &self,
        remote_path: &str,
        local_temp_path: &Path,
    ) -> Result<TransferReceipt, RemoteError> {
        let request = self.authed(
            self.http
                .get(self.url(&format!("/api/files{remote_path}/content"))),
        )?;

        let mut response =
            check(request.send().await.map_err(transport_error)?, "download").await?;

        let remote_modified = response
            .headers()
            .get(HEADER_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        let fingerprint = parse_fingerprint(
            response
                .headers()
                .get(HEADER_FINGERPRINT)
                .and_then(|v| v.to_str().ok())
                .map(String::from),
        );

        let mut file = tokio::fs::File::create(local_temp_path).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await.map_err(transport_error)? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!(remote_path, bytes = written, "Download staged");
        Ok(TransferReceipt {
            remote_modified,
            fingerprint,
        })
    }

    #[instrument(skip(self))]
    async fn delete(&self, remote_path: &str) -> Result<(), RemoteError> {
        let request = self.authed(
            self.http
                .delete(self.url(&format!("/api/files{remote_path}"))),
        )?;

        match check(request.send().await.map_err(transport_error)?, "delete").await {
            Ok(_) => Ok(()),
            // Already gone counts as deleted.
            Err(RemoteError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    async fn changes_since(
        &self,
        remote_root: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<RemoteChange>, RemoteError> {
        let since_str = since.to_rfc3339();
        let request = self
            .authed(self.http.get(self.url("/api/changes")))?
            .query(&[("path", remote_root), ("since", since_str.as_str())]);

        let response = check(request.send().await.map_err(transport_error)?, "changes").await?;
        let entries: Vec<ChangeResponse> = response
            .json()
            .await
            .map_err(|e| RemoteError::Fatal(format!("malformed changes response: {e}")))?;

        let mut changes = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(kind) = parse_change_kind(&entry.kind) else {
                warn!(kind = %entry.kind, "Skipping change with unknown kind");
                continue;
            };
            let relative_path = match RelativePath::new(entry.path.trim_start_matches('/')) {
                Ok(path) => path,
                Err(e) => {
                    warn!(path = %entry.path, error = %e, "Skipping unmappable change entry");
                    continue;
                }
            };
            changes.push(RemoteChange {
                relative_path,
                kind,
                remote_modified: entry.modified,
                size: entry.size,
                fingerprint: parse_fingerprint(entry.fingerprint),
            });
        }
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "t"),
            RemoteError::Unauthorized
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "t"),
            RemoteError::NotFound(_)
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_IMPLEMENTED, "t"),
            RemoteError::Unsupported(_)
        ));
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, "t").is_retryable());
        assert!(status_error(StatusCode::BAD_GATEWAY, "t").is_retryable());
        assert!(!status_error(StatusCode::BAD_REQUEST, "t").is_retryable());
    }

    #[test]
    fn fingerprint_parsing_tolerates_garbage() {
        assert!(parse_fingerprint(Some("zz".to_string())).is_none());
        assert!(parse_fingerprint(None).is_none());
        let valid = "a".repeat(64);
        assert!(parse_fingerprint(Some(valid)).is_some());
    }

    #[test]
    fn unauthenticated_calls_fail_fast() {
        let client =
            HttpRemoteClient::new("http://localhost:9", TransferHints::default()).unwrap();
        assert!(!client.is_authenticated());
        let err = client.authed(client.http.get("http://localhost:9")).err();
        assert!(matches!(err, Some(RemoteError::Unauthorized)));
    }
}
