//! SQLite implementation of the StateStore port
//!
//! Handles all domain type serialization/deserialization and SQL query
//! construction. Every query is parameterized; user-controlled paths never
//! reach the SQL text.
//!
//! ## Type Mapping
//!
//! | Domain Type                  | SQL Type | Strategy                          |
//! |------------------------------|----------|-----------------------------------|
//! | FolderId, FileId, ConflictId | TEXT     | UUID string via Display / FromStr |
//! | RelativePath                 | TEXT     | validated string                  |
//! | Fingerprint                  | TEXT     | validated hex string              |
//! | ConflictPolicy, enums        | TEXT     | `as_str()` / `FromStr`            |
//! | SideVersion                  | TEXT     | serde_json                        |
//! | DateTime<Utc>                | TEXT     | RFC 3339                          |
//! | sizes                       | INTEGER  | i64 cast                          |

use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqlitePool};

use baludesk_core::domain::{
    ActivityEntry, ActivityId, ActivityKind, ActivityStatus, Conflict, ConflictId, ConflictKind,
    ConflictPolicy, ConflictResolution, FileId, FileMetadata, FolderId, Fingerprint, RelativePath,
    SideVersion, SyncFolder, SyncState,
};
use baludesk_core::ports::state_store::{StateStore, StoreBatch, StoreMutation};

use crate::StoreError;

/// SQLite-backed implementation of the [`StateStore`] port
///
/// All operations run through a connection pool; batched reconcile writes
/// share one transaction via [`apply_batch`](StateStore::apply_batch).
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Creates a new store instance over the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode(format!("Failed to parse datetime '{}': {}", s, e)))
}

fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

fn decode<T: FromStr>(field: &str, value: &str) -> Result<T, StoreError>
where
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| StoreError::Decode(format!("{} '{}': {}", field, value, e)))
}

fn side_version_to_json(side: &SideVersion) -> Result<String, StoreError> {
    serde_json::to_string(side).map_err(|e| StoreError::Decode(e.to_string()))
}

fn side_version_from_json(s: &str) -> Result<SideVersion, StoreError> {
    serde_json::from_str(s).map_err(|e| StoreError::Decode(format!("side version: {}", e)))
}

// ============================================================================
// Row mapping functions
// ============================================================================

fn folder_from_row(row: &SqliteRow) -> Result<SyncFolder, StoreError> {
    let id: String = row.get("id");
    let local_path: String = row.get("local_path");
    let remote_path: String = row.get("remote_path");
    let enabled: i64 = row.get("enabled");
    let policy: String = row.get("conflict_policy");
    let created_at: String = row.get("created_at");
    let last_full_sync: Option<String> = row.get("last_full_sync");

    Ok(SyncFolder::from_parts(
        decode::<FolderId>("folder id", &id)?,
        PathBuf::from(local_path),
        remote_path,
        enabled != 0,
        decode::<ConflictPolicy>("conflict policy", &policy)?,
        parse_datetime(&created_at)?,
        parse_optional_datetime(last_full_sync)?,
    ))
}

fn file_meta_from_row(row: &SqliteRow) -> Result<FileMetadata, StoreError> {
    let id: String = row.get("id");
    let folder_id: String = row.get("folder_id");
    let relative_path: String = row.get("relative_path");
    let fingerprint: String = row.get("fingerprint");
    let size: i64 = row.get("size");
    let local_modified: String = row.get("local_modified");
    let remote_modified: String = row.get("remote_modified");
    let synced_at: String = row.get("synced_at");

    Ok(FileMetadata::from_parts(
        decode::<FileId>("file id", &id)?,
        decode::<FolderId>("folder id", &folder_id)?,
        decode::<RelativePath>("relative path", &relative_path)?,
        decode::<Fingerprint>("fingerprint", &fingerprint)?,
        size as u64,
        parse_datetime(&local_modified)?,
        parse_datetime(&remote_modified)?,
        parse_datetime(&synced_at)?,
    ))
}

fn conflict_from_row(row: &SqliteRow) -> Result<Conflict, StoreError> {
    let id: String = row.get("id");
    let folder_id: String = row.get("folder_id");
    let file_id: Option<String> = row.get("file_id");
    let relative_path: String = row.get("relative_path");
    let kind: String = row.get("kind");
    let local_version: String = row.get("local_version");
    let remote_version: String = row.get("remote_version");
    let detected_at: String = row.get("detected_at");
    let resolved: i64 = row.get("resolved");
    let resolution: Option<String> = row.get("resolution");
    let resolved_at: Option<String> = row.get("resolved_at");

    let file_id = match file_id {
        Some(ref s) if !s.is_empty() => Some(decode::<FileId>("file id", s)?),
        _ => None,
    };
    let resolution = match resolution {
        Some(ref s) if !s.is_empty() => Some(decode::<ConflictResolution>("resolution", s)?),
        _ => None,
    };

    Ok(Conflict::from_parts(
        decode::<ConflictId>("conflict id", &id)?,
        decode::<FolderId>("folder id", &folder_id)?,
        file_id,
        decode::<RelativePath>("relative path", &relative_path)?,
        decode::<ConflictKind>("conflict kind", &kind)?,
        side_version_from_json(&local_version)?,
        side_version_from_json(&remote_version)?,
        parse_datetime(&detected_at)?,
        resolved != 0,
        resolution,
        parse_optional_datetime(resolved_at)?,
    ))
}

fn activity_from_row(row: &SqliteRow) -> Result<ActivityEntry, StoreError> {
    let id: String = row.get("id");
    let folder_id: String = row.get("folder_id");
    let relative_path: Option<String> = row.get("relative_path");
    let kind: String = row.get("kind");
    let status: String = row.get("status");
    let size: Option<i64> = row.get("size");
    let message: String = row.get("message");
    let at: String = row.get("at");

    let relative_path = match relative_path {
        Some(ref s) if !s.is_empty() => Some(decode::<RelativePath>("relative path", s)?),
        _ => None,
    };

    Ok(ActivityEntry::from_parts(
        decode::<ActivityId>("activity id", &id)?,
        decode::<FolderId>("folder id", &folder_id)?,
        relative_path,
        decode::<ActivityKind>("activity kind", &kind)?,
        decode::<ActivityStatus>("activity status", &status)?,
        size.map(|s| s as u64),
        message,
        parse_datetime(&at)?,
    ))
}

// ============================================================================
// Write helpers, generic over pool and transaction executors
// ============================================================================

async fn exec_upsert_folder<'e, E>(ex: E, folder: &SyncFolder) -> Result<(), StoreError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO sync_folders
            (id, local_path, remote_path, enabled, conflict_policy, created_at, last_full_sync)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT (id) DO UPDATE SET
            local_path = excluded.local_path,
            remote_path = excluded.remote_path,
            enabled = excluded.enabled,
            conflict_policy = excluded.conflict_policy,
            last_full_sync = excluded.last_full_sync",
    )
    .bind(folder.id().to_string())
    .bind(folder.local_path().display().to_string())
    .bind(folder.remote_path())
    .bind(folder.is_enabled() as i64)
    .bind(folder.policy().as_str())
    .bind(folder.created_at().to_rfc3339())
    .bind(folder.last_full_sync().map(|t| t.to_rfc3339()))
    .execute(ex)
    .await?;
    Ok(())
}

async fn exec_upsert_file<'e, E>(ex: E, row: &FileMetadata) -> Result<(), StoreError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO file_metadata
            (id, folder_id, relative_path, fingerprint, size,
             local_modified, remote_modified, synced_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT (folder_id, relative_path) DO UPDATE SET
            fingerprint = excluded.fingerprint,
            size = excluded.size,
            local_modified = excluded.local_modified,
            remote_modified = excluded.remote_modified,
            synced_at = excluded.synced_at",
    )
    .bind(row.id().to_string())
    .bind(row.folder_id().to_string())
    .bind(row.relative_path().as_str())
    .bind(row.fingerprint().as_str())
    .bind(row.size() as i64)
    .bind(row.local_modified().to_rfc3339())
    .bind(row.remote_modified().to_rfc3339())
    .bind(row.synced_at().to_rfc3339())
    .execute(ex)
    .await?;
    Ok(())
}

async fn exec_delete_file<'e, E>(
    ex: E,
    folder: FolderId,
    path: &RelativePath,
) -> Result<(), StoreError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("DELETE FROM file_metadata WHERE folder_id = ?1 AND relative_path = ?2")
        .bind(folder.to_string())
        .bind(path.as_str())
        .execute(ex)
        .await?;
    Ok(())
}

async fn exec_log_conflict<'e, E>(ex: E, conflict: &Conflict) -> Result<(), StoreError>
where
    E: Executor<'e, Database = Sqlite>,
{
    // A second pending conflict for the same path collapses into the
    // existing row (partial unique index); audit history stays intact.
    sqlx::query(
        "INSERT INTO conflicts
            (id, folder_id, file_id, relative_path, kind,
             local_version, remote_version, detected_at, resolved, resolution, resolved_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT DO NOTHING",
    )
    .bind(conflict.id().to_string())
    .bind(conflict.folder_id().to_string())
    .bind(conflict.file_id().map(|id| id.to_string()))
    .bind(conflict.relative_path().as_str())
    .bind(conflict.kind().as_str())
    .bind(side_version_to_json(conflict.local())?)
    .bind(side_version_to_json(conflict.remote())?)
    .bind(conflict.detected_at().to_rfc3339())
    .bind(conflict.is_resolved() as i64)
    .bind(conflict.resolution().map(|r| r.as_str()))
    .bind(conflict.resolved_at().map(|t| t.to_rfc3339()))
    .execute(ex)
    .await?;
    Ok(())
}

async fn exec_set_sync_state<'e, E>(ex: E, state: &SyncState) -> Result<(), StoreError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO sync_state (folder_id, last_sync, last_reconcile)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (folder_id) DO UPDATE SET
            last_sync = excluded.last_sync,
            last_reconcile = excluded.last_reconcile",
    )
    .bind(state.folder_id().to_string())
    .bind(state.last_sync().to_rfc3339())
    .bind(state.last_reconcile().map(|t| t.to_rfc3339()))
    .execute(ex)
    .await?;
    Ok(())
}

async fn exec_append_activity<'e, E>(ex: E, entry: &ActivityEntry) -> Result<(), StoreError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO activity_log
            (id, folder_id, relative_path, kind, status, size, message, at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )
    .bind(entry.id().to_string())
    .bind(entry.folder_id().to_string())
    .bind(entry.relative_path().map(|p| p.as_str().to_string()))
    .bind(entry.kind().as_str())
    .bind(entry.status().as_str())
    .bind(entry.size().map(|s| s as i64))
    .bind(entry.message())
    .bind(entry.at().to_rfc3339())
    .execute(ex)
    .await?;
    Ok(())
}

// ============================================================================
// StateStore implementation
// ============================================================================

#[async_trait::async_trait]
impl StateStore for SqliteStateStore {
    async fn add_folder(&self, folder: &SyncFolder) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await.map_err(StoreError::Sqlx)?;
        exec_upsert_folder(&mut *tx, folder).await?;
        exec_set_sync_state(&mut *tx, &SyncState::initial(folder.id())).await?;
        tx.commit().await.map_err(StoreError::Sqlx)?;

        tracing::debug!(folder = %folder.id(), path = %folder.local_path().display(), "Folder added");
        Ok(())
    }

    async fn update_folder(&self, folder: &SyncFolder) -> anyhow::Result<()> {
        exec_upsert_folder(&self.pool, folder).await?;
        Ok(())
    }

    async fn remove_folder(&self, id: FolderId) -> anyhow::Result<()> {
        let result = sqlx::query("DELETE FROM sync_folders WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(StoreError::Sqlx)?;

        tracing::debug!(folder = %id, removed = result.rows_affected(), "Folder removed");
        Ok(())
    }

    async fn get_folder(&self, id: FolderId) -> anyhow::Result<Option<SyncFolder>> {
        let row = sqlx::query("SELECT * FROM sync_folders WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Sqlx)?;

        Ok(row.as_ref().map(folder_from_row).transpose()?)
    }

    async fn list_folders(&self) -> anyhow::Result<Vec<SyncFolder>> {
        let rows = sqlx::query("SELECT * FROM sync_folders ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Sqlx)?;

        rows.iter()
            .map(|r| folder_from_row(r).map_err(anyhow::Error::from))
            .collect()
    }

    async fn upsert_file_metadata(&self, row: &FileMetadata) -> anyhow::Result<()> {
        exec_upsert_file(&self.pool, row).await?;
        Ok(())
    }

    async fn get_file_metadata(
        &self,
        folder: FolderId,
        path: &RelativePath,
    ) -> anyhow::Result<Option<FileMetadata>> {
        let row = sqlx::query(
            "SELECT * FROM file_metadata WHERE folder_id = ?1 AND relative_path = ?2",
        )
        .bind(folder.to_string())
        .bind(path.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Sqlx)?;

        Ok(row.as_ref().map(file_meta_from_row).transpose()?)
    }

    async fn list_file_metadata(&self, folder: FolderId) -> anyhow::Result<Vec<FileMetadata>> {
        let rows = sqlx::query(
            "SELECT * FROM file_metadata WHERE folder_id = ?1 ORDER BY relative_path",
        )
        .bind(folder.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Sqlx)?;

        rows.iter()
            .map(|r| file_meta_from_row(r).map_err(anyhow::Error::from))
            .collect()
    }

    async fn delete_file_metadata(
        &self,
        folder: FolderId,
        path: &RelativePath,
    ) -> anyhow::Result<()> {
        exec_delete_file(&self.pool, folder, path).await?;
        Ok(())
    }

    async fn list_changed_since(
        &self,
        folder: FolderId,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<FileMetadata>> {
        let rows = sqlx::query(
            "SELECT * FROM file_metadata
             WHERE folder_id = ?1 AND synced_at > ?2
             ORDER BY synced_at",
        )
        .bind(folder.to_string())
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Sqlx)?;

        rows.iter()
            .map(|r| file_meta_from_row(r).map_err(anyhow::Error::from))
            .collect()
    }

    async fn count_files(&self, folder: FolderId) -> anyhow::Result<u64> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM file_metadata WHERE folder_id = ?1")
            .bind(folder.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::Sqlx)?
            .get("n");
        Ok(count as u64)
    }

    async fn log_conflict(&self, conflict: &Conflict) -> anyhow::Result<()> {
        exec_log_conflict(&self.pool, conflict).await?;
        Ok(())
    }

    async fn get_conflict(&self, id: ConflictId) -> anyhow::Result<Option<Conflict>> {
        let row = sqlx::query("SELECT * FROM conflicts WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Sqlx)?;

        Ok(row.as_ref().map(conflict_from_row).transpose()?)
    }

    async fn list_pending_conflicts(
        &self,
        folder: Option<FolderId>,
    ) -> anyhow::Result<Vec<Conflict>> {
        let rows = match folder {
            Some(id) => {
                sqlx::query(
                    "SELECT * FROM conflicts
                     WHERE resolved = 0 AND folder_id = ?1
                     ORDER BY detected_at",
                )
                .bind(id.to_string())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query("SELECT * FROM conflicts WHERE resolved = 0 ORDER BY detected_at")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(StoreError::Sqlx)?;

        rows.iter()
            .map(|r| conflict_from_row(r).map_err(anyhow::Error::from))
            .collect()
    }

    async fn resolve_conflict(
        &self,
        id: ConflictId,
        resolution: ConflictResolution,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let result = sqlx::query(
            "UPDATE conflicts
             SET resolved = 1, resolution = ?2, resolved_at = ?3
             WHERE id = ?1 AND resolved = 0",
        )
        .bind(id.to_string())
        .bind(resolution.as_str())
        .bind(at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(StoreError::Sqlx)?;

        if result.rows_affected() == 0 {
            anyhow::bail!("conflict {} not found or already resolved", id);
        }

        tracing::debug!(conflict = %id, resolution = %resolution, "Conflict resolved");
        Ok(())
    }

    async fn get_sync_state(&self, folder: FolderId) -> anyhow::Result<Option<SyncState>> {
        let row = sqlx::query("SELECT * FROM sync_state WHERE folder_id = ?1")
            .bind(folder.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Sqlx)?;

        match row {
            Some(row) => {
                let folder_id: String = row.get("folder_id");
                let last_sync: String = row.get("last_sync");
                let last_reconcile: Option<String> = row.get("last_reconcile");
                Ok(Some(SyncState::from_parts(
                    decode::<FolderId>("folder id", &folder_id)?,
                    parse_datetime(&last_sync)?,
                    parse_optional_datetime(last_reconcile)?,
                )))
            }
            None => Ok(None),
        }
    }

    async fn set_sync_state(&self, state: &SyncState) -> anyhow::Result<()> {
        exec_set_sync_state(&self.pool, state).await?;
        Ok(())
    }

    async fn append_activity(&self, entry: &ActivityEntry) -> anyhow::Result<()> {
        exec_append_activity(&self.pool, entry).await?;
        Ok(())
    }

    async fn list_activity(
        &self,
        folder: FolderId,
        limit: u32,
    ) -> anyhow::Result<Vec<ActivityEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM activity_log
             WHERE folder_id = ?1
             ORDER BY at DESC
             LIMIT ?2",
        )
        .bind(folder.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Sqlx)?;

        rows.iter()
            .map(|r| activity_from_row(r).map_err(anyhow::Error::from))
            .collect()
    }

    async fn apply_batch(&self, batch: StoreBatch) -> anyhow::Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let count = batch.len();
        let mut tx = self.pool.begin().await.map_err(StoreError::Sqlx)?;

        // Any error path drops the transaction, which rolls it back.
        for mutation in batch.into_mutations() {
            match mutation {
                StoreMutation::UpsertFile(row) => exec_upsert_file(&mut *tx, &row).await?,
                StoreMutation::DeleteFile(folder, path) => {
                    exec_delete_file(&mut *tx, folder, &path).await?
                }
                StoreMutation::LogConflict(conflict) => {
                    exec_log_conflict(&mut *tx, &conflict).await?
                }
                StoreMutation::SetSyncState(state) => exec_set_sync_state(&mut *tx, &state).await?,
                StoreMutation::AppendActivity(entry) => {
                    exec_append_activity(&mut *tx, &entry).await?
                }
                StoreMutation::UpdateFolder(folder) => exec_upsert_folder(&mut *tx, &folder).await?,
            }
        }

        tx.commit().await.map_err(StoreError::Sqlx)?;

        tracing::debug!(mutations = count, "Batch committed");
        Ok(())
    }
}
