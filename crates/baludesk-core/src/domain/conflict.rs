//! Conflict entities
//!
//! A [`Conflict`] is recorded whenever reconciliation cannot choose a side
//! on its own. Rows persist with `resolved = false` until the user (or a
//! policy) resolves them, and are never deleted: the table doubles as an
//! audit trail of every disagreement the engine has seen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{ConflictId, FileId, FolderId, Fingerprint, RelativePath};

/// What kind of disagreement was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Both sides changed the file since the last sync
    BothModified,
    /// Local changed the file, remote deleted it
    LocalModifiedRemoteDeleted,
    /// Remote changed the file, local deleted it
    RemoteModifiedLocalDeleted,
    /// The path changed type (file vs directory) on one side
    TypeMismatch,
}

impl ConflictKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::BothModified => "both_modified",
            ConflictKind::LocalModifiedRemoteDeleted => "local_modified_remote_deleted",
            ConflictKind::RemoteModifiedLocalDeleted => "remote_modified_local_deleted",
            ConflictKind::TypeMismatch => "type_mismatch",
        }
    }
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ConflictKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "both_modified" => Ok(ConflictKind::BothModified),
            "local_modified_remote_deleted" => Ok(ConflictKind::LocalModifiedRemoteDeleted),
            "remote_modified_local_deleted" => Ok(ConflictKind::RemoteModifiedLocalDeleted),
            "type_mismatch" => Ok(ConflictKind::TypeMismatch),
            other => Err(DomainError::UnknownValue {
                field: "conflict_kind",
                value: other.to_string(),
            }),
        }
    }
}

/// How a conflict was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// The local version was kept and uploaded
    KeptLocal,
    /// The remote version was kept and downloaded
    KeptRemote,
    /// Both versions were kept; the local copy was renamed
    KeptBothRenamed,
    /// The user dismissed the conflict without action
    Ignored,
}

impl ConflictResolution {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictResolution::KeptLocal => "kept_local",
            ConflictResolution::KeptRemote => "kept_remote",
            ConflictResolution::KeptBothRenamed => "kept_both_renamed",
            ConflictResolution::Ignored => "ignored",
        }
    }
}

impl std::fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ConflictResolution {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kept_local" => Ok(ConflictResolution::KeptLocal),
            "kept_remote" => Ok(ConflictResolution::KeptRemote),
            "kept_both_renamed" => Ok(ConflictResolution::KeptBothRenamed),
            "ignored" => Ok(ConflictResolution::Ignored),
            other => Err(DomainError::UnknownValue {
                field: "conflict_resolution",
                value: other.to_string(),
            }),
        }
    }
}

/// Observed state of one side of a conflicting path
///
/// All fields are optional because the side may be deleted, or the remote
/// may not report fingerprints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideVersion {
    /// Modification time, when the side still exists
    pub modified: Option<DateTime<Utc>>,
    /// Size in bytes, when known
    pub size: Option<u64>,
    /// Content fingerprint, when known
    pub fingerprint: Option<Fingerprint>,
}

/// A recorded disagreement between local and remote state for one path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    id: ConflictId,
    folder_id: FolderId,
    /// Baseline row the conflict refers to, when one exists
    file_id: Option<FileId>,
    relative_path: RelativePath,
    kind: ConflictKind,
    local: SideVersion,
    remote: SideVersion,
    detected_at: DateTime<Utc>,
    resolved: bool,
    resolution: Option<ConflictResolution>,
    resolved_at: Option<DateTime<Utc>>,
}

impl Conflict {
    /// Creates a new unresolved conflict record
    #[must_use]
    pub fn new(
        folder_id: FolderId,
        file_id: Option<FileId>,
        relative_path: RelativePath,
        kind: ConflictKind,
        local: SideVersion,
        remote: SideVersion,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ConflictId::new(),
            folder_id,
            file_id,
            relative_path,
            kind,
            local,
            remote,
            detected_at,
            resolved: false,
            resolution: None,
            resolved_at: None,
        }
    }

    /// Reconstructs a conflict from persisted fields
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn from_parts(
        id: ConflictId,
        folder_id: FolderId,
        file_id: Option<FileId>,
        relative_path: RelativePath,
        kind: ConflictKind,
        local: SideVersion,
        remote: SideVersion,
        detected_at: DateTime<Utc>,
        resolved: bool,
        resolution: Option<ConflictResolution>,
        resolved_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            folder_id,
            file_id,
            relative_path,
            kind,
            local,
            remote,
            detected_at,
            resolved,
            resolution,
            resolved_at,
        }
    }

    pub fn id(&self) -> ConflictId {
        self.id
    }

    pub fn folder_id(&self) -> FolderId {
        self.folder_id
    }

    pub fn file_id(&self) -> Option<FileId> {
        self.file_id
    }

    pub fn relative_path(&self) -> &RelativePath {
        &self.relative_path
    }

    pub fn kind(&self) -> ConflictKind {
        self.kind
    }

    pub fn local(&self) -> &SideVersion {
        &self.local
    }

    pub fn remote(&self) -> &SideVersion {
        &self.remote
    }

    pub fn detected_at(&self) -> DateTime<Utc> {
        self.detected_at
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub fn resolution(&self) -> Option<ConflictResolution> {
        self.resolution
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    /// Marks the conflict resolved
    ///
    /// # Errors
    /// Returns [`DomainError::ValidationFailed`] when the conflict was
    /// already resolved; resolution is a one-shot transition.
    pub fn resolve(
        &mut self,
        resolution: ConflictResolution,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.resolved {
            return Err(DomainError::ValidationFailed(format!(
                "conflict {} already resolved",
                self.id
            )));
        }
        self.resolved = true;
        self.resolution = Some(resolution);
        self.resolved_at = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Conflict {
        Conflict::new(
            FolderId::new(),
            None,
            RelativePath::new("a.txt").unwrap(),
            ConflictKind::BothModified,
            SideVersion::default(),
            SideVersion::default(),
            Utc::now(),
        )
    }

    #[test]
    fn new_conflict_is_unresolved() {
        let c = sample();
        assert!(!c.is_resolved());
        assert!(c.resolution().is_none());
    }

    #[test]
    fn resolve_is_one_shot() {
        let mut c = sample();
        c.resolve(ConflictResolution::KeptLocal, Utc::now()).unwrap();
        assert!(c.is_resolved());
        assert_eq!(c.resolution(), Some(ConflictResolution::KeptLocal));
        assert!(c.resolve(ConflictResolution::Ignored, Utc::now()).is_err());
    }

    #[test]
    fn kind_string_roundtrip() {
        for kind in [
            ConflictKind::BothModified,
            ConflictKind::LocalModifiedRemoteDeleted,
            ConflictKind::RemoteModifiedLocalDeleted,
            ConflictKind::TypeMismatch,
        ] {
            assert_eq!(kind.as_str().parse::<ConflictKind>().unwrap(), kind);
        }
    }
}
