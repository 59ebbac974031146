//! Per-folder sync cursor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::FolderId;

/// The per-folder cursor handed to the remote `changes_since` query
///
/// `last_sync` only ever moves forward; the engine advances it to a
/// timestamp captured *before* a reconcile pass began, so racing changes
/// are re-observed on the next pass rather than lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    folder_id: FolderId,
    last_sync: DateTime<Utc>,
    last_reconcile: Option<DateTime<Utc>>,
}

impl SyncState {
    /// Initial cursor for a freshly added folder: everything is "changed"
    #[must_use]
    pub fn initial(folder_id: FolderId) -> Self {
        Self {
            folder_id,
            last_sync: DateTime::<Utc>::UNIX_EPOCH,
            last_reconcile: None,
        }
    }

    /// Reconstructs a cursor from persisted fields
    #[must_use]
    pub fn from_parts(
        folder_id: FolderId,
        last_sync: DateTime<Utc>,
        last_reconcile: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            folder_id,
            last_sync,
            last_reconcile,
        }
    }

    pub fn folder_id(&self) -> FolderId {
        self.folder_id
    }

    pub fn last_sync(&self) -> DateTime<Utc> {
        self.last_sync
    }

    pub fn last_reconcile(&self) -> Option<DateTime<Utc>> {
        self.last_reconcile
    }

    /// Advances the cursor after a successful reconcile pass
    ///
    /// A `cursor` earlier than the current value is ignored, keeping the
    /// cursor monotonic even if passes complete out of order.
    pub fn advance(&mut self, cursor: DateTime<Utc>, reconciled_at: DateTime<Utc>) {
        if cursor > self.last_sync {
            self.last_sync = cursor;
        }
        self.last_reconcile = Some(reconciled_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn initial_cursor_is_epoch() {
        let s = SyncState::initial(FolderId::new());
        assert_eq!(s.last_sync(), DateTime::<Utc>::UNIX_EPOCH);
        assert!(s.last_reconcile().is_none());
    }

    #[test]
    fn advance_is_monotonic() {
        let mut s = SyncState::initial(FolderId::new());
        let t1 = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 3, 1, 13, 0, 0).unwrap();

        s.advance(t2, t2);
        assert_eq!(s.last_sync(), t2);

        // Older cursor must not rewind.
        s.advance(t1, t2);
        assert_eq!(s.last_sync(), t2);
    }
}
