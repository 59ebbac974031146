//! Activity-log entities
//!
//! Append-only audit of file operations. Entries are written by the
//! executor (through `baludesk-audit`) for every upload, download, delete,
//! conflict, and error, and surfaced to the UI on request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{ActivityId, FolderId, RelativePath};

/// Which operation an activity entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Upload,
    Download,
    LocalDelete,
    RemoteDelete,
    Conflict,
    Error,
}

impl ActivityKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Upload => "upload",
            ActivityKind::Download => "download",
            ActivityKind::LocalDelete => "local_delete",
            ActivityKind::RemoteDelete => "remote_delete",
            ActivityKind::Conflict => "conflict",
            ActivityKind::Error => "error",
        }
    }
}

impl std::str::FromStr for ActivityKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload" => Ok(ActivityKind::Upload),
            "download" => Ok(ActivityKind::Download),
            "local_delete" => Ok(ActivityKind::LocalDelete),
            "remote_delete" => Ok(ActivityKind::RemoteDelete),
            "conflict" => Ok(ActivityKind::Conflict),
            "error" => Ok(ActivityKind::Error),
            other => Err(DomainError::UnknownValue {
                field: "activity_kind",
                value: other.to_string(),
            }),
        }
    }
}

/// Outcome recorded for an activity entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Success,
    Failure,
    Skipped,
}

impl ActivityStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Success => "success",
            ActivityStatus::Failure => "failure",
            ActivityStatus::Skipped => "skipped",
        }
    }
}

impl std::str::FromStr for ActivityStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(ActivityStatus::Success),
            "failure" => Ok(ActivityStatus::Failure),
            "skipped" => Ok(ActivityStatus::Skipped),
            other => Err(DomainError::UnknownValue {
                field: "activity_status",
                value: other.to_string(),
            }),
        }
    }
}

/// One row of the append-only activity log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    id: ActivityId,
    folder_id: FolderId,
    relative_path: Option<RelativePath>,
    kind: ActivityKind,
    status: ActivityStatus,
    size: Option<u64>,
    message: String,
    at: DateTime<Utc>,
}

impl ActivityEntry {
    #[must_use]
    pub fn new(
        folder_id: FolderId,
        relative_path: Option<RelativePath>,
        kind: ActivityKind,
        status: ActivityStatus,
        size: Option<u64>,
        message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ActivityId::new(),
            folder_id,
            relative_path,
            kind,
            status,
            size,
            message: message.into(),
            at,
        }
    }

    /// Reconstructs an entry from persisted fields
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn from_parts(
        id: ActivityId,
        folder_id: FolderId,
        relative_path: Option<RelativePath>,
        kind: ActivityKind,
        status: ActivityStatus,
        size: Option<u64>,
        message: String,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            folder_id,
            relative_path,
            kind,
            status,
            size,
            message,
            at,
        }
    }

    pub fn id(&self) -> ActivityId {
        self.id
    }

    pub fn folder_id(&self) -> FolderId {
        self.folder_id
    }

    pub fn relative_path(&self) -> Option<&RelativePath> {
        self.relative_path.as_ref()
    }

    pub fn kind(&self) -> ActivityKind {
        self.kind
    }

    pub fn status(&self) -> ActivityStatus {
        self.status
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }
}
