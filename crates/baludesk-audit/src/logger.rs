//! ActivityLogger - high-level activity logging service

use std::sync::Arc;

use chrono::{DateTime, Utc};

use baludesk_core::domain::{
    ActivityEntry, ActivityKind, ActivityStatus, ConflictKind, FolderId, RelativePath,
};
use baludesk_core::ports::StateStore;

/// Writes activity-log entries through the state store.
///
/// All methods silently swallow persistence errors (logging a warning) so
/// that audit failures never break sync operations.
pub struct ActivityLogger {
    store: Arc<dyn StateStore>,
}

impl ActivityLogger {
    /// Creates a new `ActivityLogger` backed by the given store.
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Persist an entry, swallowing errors with a tracing warning.
    async fn save(&self, entry: ActivityEntry) {
        if let Err(e) = self.store.append_activity(&entry).await {
            tracing::warn!(error = %e, "Failed to save activity entry");
        }
    }

    /// Log a completed transfer or delete operation.
    pub async fn log_op_success(
        &self,
        folder: FolderId,
        path: &RelativePath,
        kind: ActivityKind,
        size: Option<u64>,
        at: DateTime<Utc>,
    ) {
        self.save(ActivityEntry::new(
            folder,
            Some(path.clone()),
            kind,
            ActivityStatus::Success,
            size,
            format!("{} completed", kind.as_str()),
            at,
        ))
        .await;
    }

    /// Log one failed attempt of an operation.
    pub async fn log_op_failure(
        &self,
        folder: FolderId,
        path: &RelativePath,
        kind: ActivityKind,
        message: &str,
        at: DateTime<Utc>,
    ) {
        self.save(ActivityEntry::new(
            folder,
            Some(path.clone()),
            kind,
            ActivityStatus::Failure,
            None,
            message.to_string(),
            at,
        ))
        .await;
    }

    /// Log an operation abandoned after exhausting retries or hitting a
    /// fatal error.
    pub async fn log_op_skipped(
        &self,
        folder: FolderId,
        path: &RelativePath,
        kind: ActivityKind,
        message: &str,
        at: DateTime<Utc>,
    ) {
        self.save(ActivityEntry::new(
            folder,
            Some(path.clone()),
            kind,
            ActivityStatus::Skipped,
            None,
            message.to_string(),
            at,
        ))
        .await;
    }

    /// Log a recorded conflict.
    pub async fn log_conflict(
        &self,
        folder: FolderId,
        path: &RelativePath,
        kind: ConflictKind,
        at: DateTime<Utc>,
    ) {
        self.save(ActivityEntry::new(
            folder,
            Some(path.clone()),
            ActivityKind::Conflict,
            ActivityStatus::Success,
            None,
            format!("conflict recorded: {}", kind.as_str()),
            at,
        ))
        .await;
    }

    /// Log a folder-level error that is not tied to one operation.
    pub async fn log_folder_error(&self, folder: FolderId, message: &str, at: DateTime<Utc>) {
        self.save(ActivityEntry::new(
            folder,
            None,
            ActivityKind::Error,
            ActivityStatus::Failure,
            None,
            message.to_string(),
            at,
        ))
        .await;
    }
}
