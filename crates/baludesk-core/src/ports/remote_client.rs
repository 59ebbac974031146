//! Remote file service port (driven/secondary port)
//!
//! Interface for the BaluHost server the agent mirrors against. The primary
//! implementation is the HTTP client in `baludesk-remote`, but the trait is
//! transport-agnostic so engine tests can run against in-memory fakes.
//!
//! ## Design Notes
//!
//! - Errors are a typed [`RemoteError`] rather than `anyhow` because the
//!   executor's retry policy depends on the transient/fatal distinction.
//! - `RemoteFile` and `RemoteChange` are port-level DTOs, not domain
//!   entities; the engine maps them onto baseline rows.
//! - `upload` must be idempotent on retry: re-sending the same bytes leaves
//!   the server in the same state it reached the first time.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::newtypes::{Fingerprint, RelativePath};

// ============================================================================
// Errors
// ============================================================================

/// Errors surfaced by a remote client implementation
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Missing or rejected credentials (HTTP 401/403)
    #[error("Not authenticated with the remote service")]
    Unauthorized,

    /// The remote path does not exist (HTTP 404)
    #[error("Remote path not found: {0}")]
    NotFound(String),

    /// Transient failure worth retrying: connection errors, timeouts,
    /// HTTP 429 and 5xx
    #[error("Transient remote error: {0}")]
    Transient(String),

    /// Permanent failure: malformed request, HTTP 4xx other than 404/429
    #[error("Remote request failed: {0}")]
    Fatal(String),

    /// The server does not implement the requested capability
    /// (`changes_since` on older servers)
    #[error("Remote endpoint not supported: {0}")]
    Unsupported(String),

    /// Local I/O while staging an upload or download
    #[error("Local I/O error during transfer: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    /// Whether the executor should retry the operation with backoff
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Transient(_))
    }
}

// ============================================================================
// DTOs
// ============================================================================

/// One entry from a remote directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Path relative to the listed remote root
    pub relative_path: RelativePath,
    /// Size in bytes (0 for directories)
    pub size: u64,
    /// Server-side modification time
    pub remote_modified: DateTime<Utc>,
    /// Content fingerprint when the server reports one
    pub fingerprint: Option<Fingerprint>,
    /// Whether the entry is a directory
    pub is_dir: bool,
}

/// The kind of change reported by `changes_since`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteChangeKind {
    Created,
    Modified,
    Deleted,
}

/// One change reported by the remote changes feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteChange {
    /// Path relative to the queried remote root
    pub relative_path: RelativePath,
    pub kind: RemoteChangeKind,
    /// Modification time; `None` for deletions
    pub remote_modified: Option<DateTime<Utc>>,
    /// Size in bytes; `None` for deletions
    pub size: Option<u64>,
    /// Content fingerprint when the server reports one
    pub fingerprint: Option<Fingerprint>,
}

/// What the server reports back after accepting a transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// Server-side modification time after the operation
    pub remote_modified: DateTime<Utc>,
    /// Fingerprint the server computed or echoed, when available
    pub fingerprint: Option<Fingerprint>,
}

/// Advisory transfer tuning forwarded to the server
///
/// The server may ignore these; the engine never enforces them locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferHints {
    /// Preferred chunk size in MiB
    pub chunk_size_mb: u32,
    /// Bandwidth cap in Mbit/s; 0 means unlimited
    pub bandwidth_limit_mbps: u32,
}

impl Default for TransferHints {
    fn default() -> Self {
        Self {
            chunk_size_mb: 10,
            bandwidth_limit_mbps: 0,
        }
    }
}

// ============================================================================
// RemoteClient trait
// ============================================================================

/// Port trait for the remote file service
///
/// All paths are relative to a folder's configured remote root except for
/// the `remote_path` arguments, which are full server-side paths the engine
/// builds by joining the folder's remote root with a [`RelativePath`].
#[async_trait::async_trait]
pub trait RemoteClient: Send + Sync {
    /// Exchanges credentials for a bearer token and installs it on the client
    async fn login(&self, username: &str, password: &str) -> Result<String, RemoteError>;

    /// Installs a previously obtained token (from the credential store)
    fn set_token(&self, token: String);

    /// Whether a token is currently installed
    fn is_authenticated(&self) -> bool;

    /// Lists the remote tree under `remote_path`, recursively
    async fn list_files(&self, remote_path: &str) -> Result<Vec<RemoteFile>, RemoteError>;

    /// Uploads the file at `local_path` to `remote_path`
    ///
    /// Idempotent on retry: uploading the same bytes twice leaves the same
    /// remote state.
    async fn upload(
        &self,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<TransferReceipt, RemoteError>;

    /// Downloads `remote_path` into `local_temp_path`
    ///
    /// The caller is responsible for verifying the fingerprint and moving
    /// the temp file into place.
    async fn download(
        &self,
        remote_path: &str,
        local_temp_path: &Path,
    ) -> Result<TransferReceipt, RemoteError>;

    /// Deletes `remote_path`; a missing path (404) is treated as success
    async fn delete(&self, remote_path: &str) -> Result<(), RemoteError>;

    /// Returns changes under `remote_root` since `since`
    ///
    /// # Errors
    /// [`RemoteError::Unsupported`] when the server lacks the changes feed;
    /// callers fall back to [`list_files`](RemoteClient::list_files) and
    /// diff against their baseline.
    async fn changes_since(
        &self,
        remote_root: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<RemoteChange>, RemoteError>;
}
