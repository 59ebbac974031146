//! Automatic conflict resolution policy
//!
//! Maps a detected conflict plus the folder's configured policy onto a
//! concrete decision. Only the `Ask` policy defers to the user; the others
//! resolve immediately and the engine turns the decision back into a plan
//! operation.

use baludesk_core::domain::conflict::SideVersion;
use baludesk_core::domain::{ConflictKind, ConflictPolicy};
use tracing::trace;

/// What to do with a conflicting path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Local wins; upload, overwriting remote
    Upload,
    /// Remote wins; download, overwriting local
    Download,
    /// Local deletion wins; delete the remote copy
    RemoteDelete,
    /// Remote deletion wins; delete the local copy
    LocalDelete,
    /// Contents are identical; write the baseline without transferring
    Adopt,
    /// Persist a conflict record and skip the path this pass
    Record,
}

/// Applies `policy` to a conflict of `kind` between the two observed sides
pub fn apply_policy(
    policy: ConflictPolicy,
    kind: ConflictKind,
    local: &SideVersion,
    remote: &SideVersion,
) -> PolicyDecision {
    let decision = match policy {
        ConflictPolicy::Ask => PolicyDecision::Record,

        ConflictPolicy::KeepLocal => match kind {
            // Local deleted the file; keeping local means the deletion wins.
            ConflictKind::RemoteModifiedLocalDeleted => PolicyDecision::RemoteDelete,
            _ => PolicyDecision::Upload,
        },

        ConflictPolicy::KeepRemote => match kind {
            // Remote deleted the file; keeping remote means the deletion wins.
            ConflictKind::LocalModifiedRemoteDeleted => PolicyDecision::LocalDelete,
            _ => PolicyDecision::Download,
        },

        ConflictPolicy::KeepNewest => keep_newest(kind, local, remote),
    };

    trace!(?policy, ?kind, ?decision, "Conflict policy applied");
    decision
}

/// The keep-newest rules
///
/// A deleted side has no timestamp, so the surviving side wins outright.
/// For both-modified: later mtime wins; ties break by fingerprint equality
/// (equal contents adopt without transfer), then by keeping local.
fn keep_newest(kind: ConflictKind, local: &SideVersion, remote: &SideVersion) -> PolicyDecision {
    match kind {
        ConflictKind::LocalModifiedRemoteDeleted => PolicyDecision::Upload,
        ConflictKind::RemoteModifiedLocalDeleted => PolicyDecision::Download,
        ConflictKind::BothModified | ConflictKind::TypeMismatch => {
            match (local.modified, remote.modified) {
                (Some(l), Some(r)) if l > r => PolicyDecision::Upload,
                (Some(l), Some(r)) if l < r => PolicyDecision::Download,
                _ => {
                    // Tie or missing timestamps.
                    let identical = match (&local.fingerprint, &remote.fingerprint) {
                        (Some(l), Some(r)) => l == r,
                        _ => false,
                    };
                    if identical {
                        PolicyDecision::Adopt
                    } else {
                        PolicyDecision::Upload
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baludesk_core::domain::newtypes::Fingerprint;
    use chrono::{Duration, Utc};

    fn side(age_secs: i64, contents: &[u8]) -> SideVersion {
        SideVersion {
            modified: Some(Utc::now() - Duration::seconds(age_secs)),
            size: Some(contents.len() as u64),
            fingerprint: Some(Fingerprint::of_bytes(contents)),
        }
    }

    #[test]
    fn ask_records() {
        assert_eq!(
            apply_policy(
                ConflictPolicy::Ask,
                ConflictKind::BothModified,
                &side(0, b"A"),
                &side(10, b"B")
            ),
            PolicyDecision::Record
        );
    }

    #[test]
    fn keep_local_uploads() {
        assert_eq!(
            apply_policy(
                ConflictPolicy::KeepLocal,
                ConflictKind::BothModified,
                &side(0, b"A"),
                &side(10, b"B")
            ),
            PolicyDecision::Upload
        );
    }

    #[test]
    fn keep_local_propagates_local_deletion() {
        assert_eq!(
            apply_policy(
                ConflictPolicy::KeepLocal,
                ConflictKind::RemoteModifiedLocalDeleted,
                &SideVersion::default(),
                &side(0, b"B")
            ),
            PolicyDecision::RemoteDelete
        );
    }

    #[test]
    fn keep_remote_downloads() {
        assert_eq!(
            apply_policy(
                ConflictPolicy::KeepRemote,
                ConflictKind::BothModified,
                &side(0, b"A"),
                &side(10, b"B")
            ),
            PolicyDecision::Download
        );
    }

    #[test]
    fn keep_remote_propagates_remote_deletion() {
        assert_eq!(
            apply_policy(
                ConflictPolicy::KeepRemote,
                ConflictKind::LocalModifiedRemoteDeleted,
                &side(0, b"A"),
                &SideVersion::default()
            ),
            PolicyDecision::LocalDelete
        );
    }

    #[test]
    fn keep_newest_prefers_later_local() {
        assert_eq!(
            apply_policy(
                ConflictPolicy::KeepNewest,
                ConflictKind::BothModified,
                &side(0, b"A"),
                &side(60, b"B")
            ),
            PolicyDecision::Upload
        );
    }

    #[test]
    fn keep_newest_prefers_later_remote() {
        assert_eq!(
            apply_policy(
                ConflictPolicy::KeepNewest,
                ConflictKind::BothModified,
                &side(60, b"A"),
                &side(0, b"B")
            ),
            PolicyDecision::Download
        );
    }

    #[test]
    fn keep_newest_tie_with_equal_contents_adopts() {
        let t = Utc::now();
        let local = SideVersion {
            modified: Some(t),
            size: Some(1),
            fingerprint: Some(Fingerprint::of_bytes(b"X")),
        };
        let remote = SideVersion {
            modified: Some(t),
            size: Some(1),
            fingerprint: Some(Fingerprint::of_bytes(b"X")),
        };
        assert_eq!(
            apply_policy(
                ConflictPolicy::KeepNewest,
                ConflictKind::BothModified,
                &local,
                &remote
            ),
            PolicyDecision::Adopt
        );
    }

    #[test]
    fn keep_newest_tie_with_differing_contents_keeps_local() {
        let t = Utc::now();
        let local = SideVersion {
            modified: Some(t),
            size: Some(1),
            fingerprint: Some(Fingerprint::of_bytes(b"X")),
        };
        let remote = SideVersion {
            modified: Some(t),
            size: Some(1),
            fingerprint: Some(Fingerprint::of_bytes(b"Y")),
        };
        assert_eq!(
            apply_policy(
                ConflictPolicy::KeepNewest,
                ConflictKind::BothModified,
                &local,
                &remote
            ),
            PolicyDecision::Upload
        );
    }

    #[test]
    fn keep_newest_survivor_wins_deletion_conflicts() {
        assert_eq!(
            apply_policy(
                ConflictPolicy::KeepNewest,
                ConflictKind::LocalModifiedRemoteDeleted,
                &side(0, b"A"),
                &SideVersion::default()
            ),
            PolicyDecision::Upload
        );
        assert_eq!(
            apply_policy(
                ConflictPolicy::KeepNewest,
                ConflictKind::RemoteModifiedLocalDeleted,
                &SideVersion::default(),
                &side(0, b"B")
            ),
            PolicyDecision::Download
        );
    }
}
