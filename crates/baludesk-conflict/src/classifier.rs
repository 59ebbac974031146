//! Three-way change classification
//!
//! For every path that appears in the local diff, the remote diff, or both,
//! the classifier decides what reconciliation should do with it. The inputs
//! are the observed side states plus whether a baseline row exists; the
//! output is a [`Verdict`].
//!
//! The classifier never consults policy. Conflicts are reported as such and
//! the caller applies the folder's policy afterwards, so the table below
//! stays a complete, order-independent description of the sync semantics.

use baludesk_core::domain::newtypes::Fingerprint;
use baludesk_core::domain::ConflictKind;

/// What the change detector observed for a path on the local side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalSide {
    /// Path absent from the local diff and from disk
    None,
    /// On disk with no baseline row
    Created,
    /// On disk, differs from the baseline
    Modified,
    /// Baseline row exists, path gone from disk
    Deleted,
    /// On disk, identical to the baseline
    Unchanged,
}

/// What the remote changes feed reported for a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteSide {
    /// Path absent from the remote diff
    None,
    Created,
    Modified,
    Deleted,
}

/// Everything the classifier needs to know about one path
#[derive(Debug, Clone, Copy)]
pub struct PathFacts<'a> {
    pub local: LocalSide,
    pub remote: RemoteSide,
    /// Whether a baseline row exists for the path
    pub baseline_present: bool,
    /// Local content fingerprint, when the caller has computed one
    pub local_fingerprint: Option<&'a Fingerprint>,
    /// Remote-reported fingerprint, when the server supplies one
    pub remote_fingerprint: Option<&'a Fingerprint>,
}

/// The classifier's decision for one path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Send the local bytes to the server
    Upload,
    /// Fetch the remote bytes
    Download,
    /// Propagate a local deletion to the server
    RemoteDelete,
    /// Propagate a remote deletion to disk
    LocalDelete,
    /// Both sides are gone; remove the baseline row
    DropBaseline,
    /// Both sides hold identical content; record it in the baseline
    /// without transferring anything
    Adopt,
    /// Nothing to do
    NoOp,
    /// The sides disagree; apply the folder's policy
    Conflict(ConflictKind),
}

/// Returns true only when both fingerprints are known and equal
fn fingerprints_equal(facts: &PathFacts<'_>) -> bool {
    match (facts.local_fingerprint, facts.remote_fingerprint) {
        (Some(local), Some(remote)) => local == remote,
        _ => false,
    }
}

/// Applies the reconciliation decision table to one path
///
/// Combinations outside the table (a remote `created` for a path we track,
/// a remote `modified` for a path we never saw) are folded onto the nearest
/// tabled row rather than rejected: the remote feed's created/modified
/// distinction is advisory and servers disagree about it after moves.
pub fn classify(facts: &PathFacts<'_>) -> Verdict {
    use LocalSide as L;
    use RemoteSide as R;

    match (facts.local, facts.remote, facts.baseline_present) {
        // --- one-sided creation ---
        (L::Created, R::None, _) => Verdict::Upload,
        (L::None, R::Created | R::Modified, false) => Verdict::Download,

        // --- both created independently ---
        (L::Created, R::Created | R::Modified, _) => {
            if fingerprints_equal(facts) {
                Verdict::Adopt
            } else {
                Verdict::Conflict(ConflictKind::BothModified)
            }
        }

        // Remote deleted something we never synced; the local creation stands.
        (L::Created, R::Deleted, _) => Verdict::Upload,

        // --- one-sided modification ---
        (L::Modified, R::None, true) => Verdict::Upload,
        (L::None | L::Unchanged, R::Modified | R::Created, true) => Verdict::Download,
        (L::Modified, R::Modified | R::Created, true) => {
            if fingerprints_equal(facts) {
                Verdict::Adopt
            } else {
                Verdict::Conflict(ConflictKind::BothModified)
            }
        }

        // --- deletions ---
        (L::Deleted, R::None, true) => Verdict::RemoteDelete,
        (L::None | L::Unchanged, R::Deleted, true) => Verdict::LocalDelete,
        (L::Deleted, R::Deleted, _) => Verdict::DropBaseline,
        (L::Modified, R::Deleted, true) => {
            Verdict::Conflict(ConflictKind::LocalModifiedRemoteDeleted)
        }
        (L::Deleted, R::Modified | R::Created, true) => {
            Verdict::Conflict(ConflictKind::RemoteModifiedLocalDeleted)
        }

        // --- quiet paths ---
        (L::Unchanged, R::None, _) => Verdict::NoOp,
        (L::None, R::None, _) => Verdict::NoOp,

        // Degenerate rows: a side reports change but no baseline backs it.
        // Treat the surviving side as authoritative.
        (L::Modified, _, false) => Verdict::Upload,
        (L::Deleted, _, false) => Verdict::DropBaseline,
        (L::Unchanged, R::Modified | R::Created, false) => Verdict::Download,
        (L::None | L::Unchanged, R::Deleted, false) => Verdict::NoOp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(local: LocalSide, remote: RemoteSide, baseline: bool) -> PathFacts<'static> {
        PathFacts {
            local,
            remote,
            baseline_present: baseline,
            local_fingerprint: None,
            remote_fingerprint: None,
        }
    }

    // Every row of the decision table, in table order.

    #[test]
    fn created_vs_none_uploads() {
        assert_eq!(
            classify(&facts(LocalSide::Created, RemoteSide::None, false)),
            Verdict::Upload
        );
    }

    #[test]
    fn none_vs_created_downloads() {
        assert_eq!(
            classify(&facts(LocalSide::None, RemoteSide::Created, false)),
            Verdict::Download
        );
    }

    #[test]
    fn created_vs_created_equal_fingerprints_adopts() {
        let fp = Fingerprint::of_bytes(b"same");
        let facts = PathFacts {
            local: LocalSide::Created,
            remote: RemoteSide::Created,
            baseline_present: false,
            local_fingerprint: Some(&fp),
            remote_fingerprint: Some(&fp),
        };
        assert_eq!(classify(&facts), Verdict::Adopt);
    }

    #[test]
    fn created_vs_created_differing_fingerprints_conflicts() {
        let local = Fingerprint::of_bytes(b"A");
        let remote = Fingerprint::of_bytes(b"B");
        let facts = PathFacts {
            local: LocalSide::Created,
            remote: RemoteSide::Created,
            baseline_present: false,
            local_fingerprint: Some(&local),
            remote_fingerprint: Some(&remote),
        };
        assert_eq!(
            classify(&facts),
            Verdict::Conflict(ConflictKind::BothModified)
        );
    }

    #[test]
    fn created_vs_created_unknown_fingerprint_conflicts() {
        // Equality cannot be proven, so this must not silently adopt.
        assert_eq!(
            classify(&facts(LocalSide::Created, RemoteSide::Created, false)),
            Verdict::Conflict(ConflictKind::BothModified)
        );
    }

    #[test]
    fn modified_vs_none_uploads() {
        assert_eq!(
            classify(&facts(LocalSide::Modified, RemoteSide::None, true)),
            Verdict::Upload
        );
    }

    #[test]
    fn none_vs_modified_downloads() {
        assert_eq!(
            classify(&facts(LocalSide::None, RemoteSide::Modified, true)),
            Verdict::Download
        );
    }

    #[test]
    fn modified_vs_modified_conflicts() {
        assert_eq!(
            classify(&facts(LocalSide::Modified, RemoteSide::Modified, true)),
            Verdict::Conflict(ConflictKind::BothModified)
        );
    }

    #[test]
    fn modified_vs_modified_equal_fingerprints_adopts() {
        let fp = Fingerprint::of_bytes(b"converged");
        let facts = PathFacts {
            local: LocalSide::Modified,
            remote: RemoteSide::Modified,
            baseline_present: true,
            local_fingerprint: Some(&fp),
            remote_fingerprint: Some(&fp),
        };
        assert_eq!(classify(&facts), Verdict::Adopt);
    }

    #[test]
    fn deleted_vs_none_deletes_remote() {
        assert_eq!(
            classify(&facts(LocalSide::Deleted, RemoteSide::None, true)),
            Verdict::RemoteDelete
        );
    }

    #[test]
    fn none_vs_deleted_deletes_local() {
        assert_eq!(
            classify(&facts(LocalSide::None, RemoteSide::Deleted, true)),
            Verdict::LocalDelete
        );
        assert_eq!(
            classify(&facts(LocalSide::Unchanged, RemoteSide::Deleted, true)),
            Verdict::LocalDelete
        );
    }

    #[test]
    fn deleted_vs_deleted_drops_baseline() {
        assert_eq!(
            classify(&facts(LocalSide::Deleted, RemoteSide::Deleted, true)),
            Verdict::DropBaseline
        );
    }

    #[test]
    fn modified_vs_deleted_conflicts() {
        assert_eq!(
            classify(&facts(LocalSide::Modified, RemoteSide::Deleted, true)),
            Verdict::Conflict(ConflictKind::LocalModifiedRemoteDeleted)
        );
    }

    #[test]
    fn deleted_vs_modified_conflicts() {
        assert_eq!(
            classify(&facts(LocalSide::Deleted, RemoteSide::Modified, true)),
            Verdict::Conflict(ConflictKind::RemoteModifiedLocalDeleted)
        );
    }

    #[test]
    fn unchanged_vs_modified_downloads() {
        assert_eq!(
            classify(&facts(LocalSide::Unchanged, RemoteSide::Modified, true)),
            Verdict::Download
        );
    }

    #[test]
    fn unchanged_vs_none_is_noop() {
        assert_eq!(
            classify(&facts(LocalSide::Unchanged, RemoteSide::None, true)),
            Verdict::NoOp
        );
    }

    // Off-table combinations.

    #[test]
    fn local_creation_survives_remote_delete() {
        assert_eq!(
            classify(&facts(LocalSide::Created, RemoteSide::Deleted, false)),
            Verdict::Upload
        );
    }

    #[test]
    fn remote_recreation_after_local_delete_conflicts() {
        assert_eq!(
            classify(&facts(LocalSide::Deleted, RemoteSide::Created, true)),
            Verdict::Conflict(ConflictKind::RemoteModifiedLocalDeleted)
        );
    }

    #[test]
    fn remote_delete_without_baseline_is_noop() {
        assert_eq!(
            classify(&facts(LocalSide::None, RemoteSide::Deleted, false)),
            Verdict::NoOp
        );
    }
}
