//! State store port (driven/secondary port)
//!
//! Interface for persisting and querying the four §3 entities: folders,
//! file-metadata baseline rows, conflicts, and per-folder sync state, plus
//! the append-only activity log.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   (SQLite today) and don't need domain-level classification.
//! - A reconcile pass batches its writes into a [`StoreBatch`] and commits
//!   them atomically through [`StateStore::apply_batch`]; implementations
//!   must guarantee commit-or-rollback on all exit paths.
//! - All write operations take references, so callers retain ownership.

use chrono::{DateTime, Utc};

use crate::domain::{
    ActivityEntry, Conflict, ConflictId, ConflictResolution, FileMetadata, FolderId, RelativePath,
    SyncFolder, SyncState,
};

// ============================================================================
// StoreBatch
// ============================================================================

/// One mutation queued for atomic commit
#[derive(Debug, Clone)]
pub enum StoreMutation {
    /// Insert or replace a baseline row by (folder id, relative path)
    UpsertFile(FileMetadata),
    /// Remove a baseline row after a confirmed delete
    DeleteFile(FolderId, RelativePath),
    /// Record a new conflict
    LogConflict(Conflict),
    /// Advance a folder's sync cursor
    SetSyncState(SyncState),
    /// Append an activity-log entry
    AppendActivity(ActivityEntry),
    /// Persist folder changes (e.g. last full-sync time)
    UpdateFolder(SyncFolder),
}

/// An ordered set of mutations committed in a single transaction
///
/// The engine accumulates a pass's writes here so that a crash mid-pass
/// never leaves the baseline half-updated.
#[derive(Debug, Clone, Default)]
pub struct StoreBatch {
    mutations: Vec<StoreMutation>,
}

impl StoreBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_file(&mut self, row: FileMetadata) {
        self.mutations.push(StoreMutation::UpsertFile(row));
    }

    pub fn delete_file(&mut self, folder: FolderId, path: RelativePath) {
        self.mutations.push(StoreMutation::DeleteFile(folder, path));
    }

    pub fn log_conflict(&mut self, conflict: Conflict) {
        self.mutations.push(StoreMutation::LogConflict(conflict));
    }

    pub fn set_sync_state(&mut self, state: SyncState) {
        self.mutations.push(StoreMutation::SetSyncState(state));
    }

    pub fn append_activity(&mut self, entry: ActivityEntry) {
        self.mutations.push(StoreMutation::AppendActivity(entry));
    }

    pub fn update_folder(&mut self, folder: SyncFolder) {
        self.mutations.push(StoreMutation::UpdateFolder(folder));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    /// Consumes the batch, yielding mutations in insertion order
    #[must_use]
    pub fn into_mutations(self) -> Vec<StoreMutation> {
        self.mutations
    }
}

// ============================================================================
// StateStore trait
// ============================================================================

/// Port trait for persistent sync state
#[async_trait::async_trait]
pub trait StateStore: Send + Sync {
    // --- Folder operations ---

    /// Inserts a new folder mapping together with its initial sync state
    async fn add_folder(&self, folder: &SyncFolder) -> anyhow::Result<()>;

    /// Updates an existing folder's mutable fields
    async fn update_folder(&self, folder: &SyncFolder) -> anyhow::Result<()>;

    /// Removes a folder; cascades to its metadata, conflicts, sync state,
    /// and activity rows
    async fn remove_folder(&self, id: FolderId) -> anyhow::Result<()>;

    async fn get_folder(&self, id: FolderId) -> anyhow::Result<Option<SyncFolder>>;

    async fn list_folders(&self) -> anyhow::Result<Vec<SyncFolder>>;

    // --- File metadata operations ---

    /// Inserts or replaces a baseline row by (folder id, relative path)
    async fn upsert_file_metadata(&self, row: &FileMetadata) -> anyhow::Result<()>;

    async fn get_file_metadata(
        &self,
        folder: FolderId,
        path: &RelativePath,
    ) -> anyhow::Result<Option<FileMetadata>>;

    async fn list_file_metadata(&self, folder: FolderId) -> anyhow::Result<Vec<FileMetadata>>;

    async fn delete_file_metadata(
        &self,
        folder: FolderId,
        path: &RelativePath,
    ) -> anyhow::Result<()>;

    /// Rows whose synced-time is later than `since`; a UI convenience, not
    /// part of reconciliation
    async fn list_changed_since(
        &self,
        folder: FolderId,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<FileMetadata>>;

    /// Number of baseline rows for a folder
    async fn count_files(&self, folder: FolderId) -> anyhow::Result<u64>;

    // --- Conflict operations ---

    async fn log_conflict(&self, conflict: &Conflict) -> anyhow::Result<()>;

    async fn get_conflict(&self, id: ConflictId) -> anyhow::Result<Option<Conflict>>;

    /// Unresolved conflicts, optionally restricted to one folder
    async fn list_pending_conflicts(
        &self,
        folder: Option<FolderId>,
    ) -> anyhow::Result<Vec<Conflict>>;

    /// Marks a conflict resolved; rows are never deleted
    async fn resolve_conflict(
        &self,
        id: ConflictId,
        resolution: ConflictResolution,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    // --- Sync state operations ---

    async fn get_sync_state(&self, folder: FolderId) -> anyhow::Result<Option<SyncState>>;

    async fn set_sync_state(&self, state: &SyncState) -> anyhow::Result<()>;

    // --- Activity log ---

    async fn append_activity(&self, entry: &ActivityEntry) -> anyhow::Result<()>;

    /// Most recent activity entries for a folder, newest first
    async fn list_activity(
        &self,
        folder: FolderId,
        limit: u32,
    ) -> anyhow::Result<Vec<ActivityEntry>>;

    // --- Transactions ---

    /// Applies every mutation in `batch` within one write transaction,
    /// rolling back all of them if any fails
    async fn apply_batch(&self, batch: StoreBatch) -> anyhow::Result<()>;
}
