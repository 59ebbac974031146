//! File metadata baseline entity
//!
//! A [`FileMetadata`] row records what the agent and the server last agreed
//! about one file: its fingerprint, size, and the modification timestamps on
//! both sides at the instant of the last successful transfer. The presence
//! of a row means "this path was known at the last sync"; absence means the
//! path is new to us. There are no sentinel rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{FileId, FolderId, Fingerprint, RelativePath};

/// Per-file baseline, keyed by (folder id, relative path)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    id: FileId,
    folder_id: FolderId,
    relative_path: RelativePath,
    fingerprint: Fingerprint,
    size: u64,
    local_modified: DateTime<Utc>,
    remote_modified: DateTime<Utc>,
    synced_at: DateTime<Utc>,
}

impl FileMetadata {
    /// Creates a fresh baseline row after a successful transfer
    #[must_use]
    pub fn new(
        folder_id: FolderId,
        relative_path: RelativePath,
        fingerprint: Fingerprint,
        size: u64,
        local_modified: DateTime<Utc>,
        remote_modified: DateTime<Utc>,
        synced_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: FileId::new(),
            folder_id,
            relative_path,
            fingerprint,
            size,
            local_modified,
            remote_modified,
            synced_at,
        }
    }

    /// Reconstructs a row from persisted fields
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn from_parts(
        id: FileId,
        folder_id: FolderId,
        relative_path: RelativePath,
        fingerprint: Fingerprint,
        size: u64,
        local_modified: DateTime<Utc>,
        remote_modified: DateTime<Utc>,
        synced_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            folder_id,
            relative_path,
            fingerprint,
            size,
            local_modified,
            remote_modified,
            synced_at,
        }
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn folder_id(&self) -> FolderId {
        self.folder_id
    }

    pub fn relative_path(&self) -> &RelativePath {
        &self.relative_path
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Local mtime observed at the last sync instant
    pub fn local_modified(&self) -> DateTime<Utc> {
        self.local_modified
    }

    /// Remote mtime reported at the last sync instant
    pub fn remote_modified(&self) -> DateTime<Utc> {
        self.remote_modified
    }

    pub fn synced_at(&self) -> DateTime<Utc> {
        self.synced_at
    }
}
