//! Sync folder configuration entity

use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::FolderId;

/// How the engine resolves a conflict for files under a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Persist a conflict record and wait for the user to decide
    Ask,
    /// Local wins: the conflicting path is uploaded, overwriting remote
    KeepLocal,
    /// Remote wins: the conflicting path is downloaded, overwriting local
    KeepRemote,
    /// The side with the later modification time wins; ties fall back to
    /// fingerprint equality, then to keeping local
    KeepNewest,
}

impl ConflictPolicy {
    /// Stable string form used in storage and config
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::Ask => "ask",
            ConflictPolicy::KeepLocal => "keep_local",
            ConflictPolicy::KeepRemote => "keep_remote",
            ConflictPolicy::KeepNewest => "keep_newest",
        }
    }
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        ConflictPolicy::Ask
    }
}

impl std::fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = DomainError;

    /// Accepts both snake_case and kebab-case spellings; config files written
    /// by older UI builds use the latter.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "ask" | "ask_user" | "manual" => Ok(ConflictPolicy::Ask),
            "keep_local" | "local" => Ok(ConflictPolicy::KeepLocal),
            "keep_remote" | "remote" => Ok(ConflictPolicy::KeepRemote),
            "keep_newest" | "newest" => Ok(ConflictPolicy::KeepNewest),
            other => Err(DomainError::UnknownValue {
                field: "conflict_policy",
                value: other.to_string(),
            }),
        }
    }
}

/// A configured mapping between a local directory and a remote path
///
/// Created when the user adds a folder through the UI, mutated on config
/// edits, and removed (cascading to its metadata, conflicts, and sync state)
/// when the user deletes the mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFolder {
    id: FolderId,
    local_path: PathBuf,
    remote_path: String,
    enabled: bool,
    policy: ConflictPolicy,
    created_at: DateTime<Utc>,
    last_full_sync: Option<DateTime<Utc>>,
}

impl SyncFolder {
    /// Creates a new enabled folder mapping
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidPath`] when `local_path` is not absolute
    /// or `remote_path` is empty.
    pub fn new(
        local_path: PathBuf,
        remote_path: impl Into<String>,
        policy: ConflictPolicy,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if !local_path.is_absolute() {
            return Err(DomainError::InvalidPath(format!(
                "local path must be absolute: {}",
                local_path.display()
            )));
        }
        let remote_path = remote_path.into();
        if remote_path.is_empty() {
            return Err(DomainError::InvalidPath("empty remote path".to_string()));
        }

        Ok(Self {
            id: FolderId::new(),
            local_path,
            remote_path,
            enabled: true,
            policy,
            created_at,
            last_full_sync: None,
        })
    }

    /// Reconstructs a folder from persisted fields, without validation
    ///
    /// Only the store should call this; rows were validated when written.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn from_parts(
        id: FolderId,
        local_path: PathBuf,
        remote_path: String,
        enabled: bool,
        policy: ConflictPolicy,
        created_at: DateTime<Utc>,
        last_full_sync: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            local_path,
            remote_path,
            enabled,
            policy,
            created_at,
            last_full_sync,
        }
    }

    pub fn id(&self) -> FolderId {
        self.id
    }

    pub fn local_path(&self) -> &PathBuf {
        &self.local_path
    }

    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_full_sync(&self) -> Option<DateTime<Utc>> {
        self.last_full_sync
    }

    /// Enables or disables syncing for this folder
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Changes the conflict-resolution policy
    pub fn set_policy(&mut self, policy: ConflictPolicy) {
        self.policy = policy;
    }

    /// Points the mapping at a different remote path
    pub fn set_remote_path(&mut self, remote_path: impl Into<String>) {
        self.remote_path = remote_path.into();
    }

    /// Records the completion time of a full reconcile pass
    pub fn record_full_sync(&mut self, at: DateTime<Utc>) {
        self.last_full_sync = Some(at);
    }
}
