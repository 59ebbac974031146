//! Conflict resolution executor
//!
//! Applies a user's (or a policy's) resolution to a recorded conflict by
//! performing the actual file operations:
//! - `kept_local`: upload the local version, or propagate the local
//!   deletion when the local side is gone
//! - `kept_remote`: download the remote version, or delete the local copy
//!   when the remote side is gone
//! - `kept_both_renamed`: rename the local copy with a conflict suffix and
//!   download the remote version to the original path; the renamed copy is
//!   picked up as a new file by the next reconcile pass
//! - `ignored`: mark resolved without touching any files
//!
//! The conflict row is only marked resolved after the file operations
//! succeed, so a failed resolution can simply be retried.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use baludesk_conflict::ConflictNamer;
use baludesk_core::domain::{ActivityKind, ConflictId, ConflictResolution, SyncFolder};
use baludesk_core::ports::{Clock, Hasher, Notifier, RemoteClient, StateStore};
use baludesk_audit::ActivityLogger;

use crate::executor::{OpOutcome, TransferExecutor};
use crate::plan::{OpKind, Operation, PlanBuilder};

/// Applies conflict resolutions with real file operations
pub struct ConflictResolver {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    activity: Arc<ActivityLogger>,
    executor: TransferExecutor,
}

impl ConflictResolver {
    pub fn new(
        store: Arc<dyn StateStore>,
        remote: Arc<dyn RemoteClient>,
        hasher: Arc<dyn Hasher>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        cancel: CancellationToken,
    ) -> Self {
        let activity = Arc::new(ActivityLogger::new(store.clone()));
        // Resolutions are one operation at a time.
        let executor = TransferExecutor::new(
            remote,
            hasher,
            clock.clone(),
            notifier,
            activity.clone(),
            1,
            cancel,
        );

        Self {
            store,
            clock,
            activity,
            executor,
        }
    }

    /// Applies `resolution` to the conflict and marks the row resolved
    pub async fn apply(&self, id: ConflictId, resolution: ConflictResolution) -> Result<()> {
        let conflict = self
            .store
            .get_conflict(id)
            .await?
            .with_context(|| format!("unknown conflict {id}"))?;

        if conflict.is_resolved() {
            anyhow::bail!("conflict {id} is already resolved");
        }

        let folder = self
            .store
            .get_folder(conflict.folder_id())
            .await?
            .with_context(|| format!("folder {} no longer exists", conflict.folder_id()))?;

        info!(
            conflict = %id,
            path = %conflict.relative_path(),
            resolution = %resolution,
            "Applying conflict resolution"
        );

        let local_exists = conflict.local().modified.is_some();
        let remote_exists = conflict.remote().modified.is_some();

        match resolution {
            ConflictResolution::KeptLocal => {
                let op = if local_exists {
                    Operation::new(OpKind::Upload, conflict.relative_path().clone())
                } else {
                    Operation::new(OpKind::RemoteDelete, conflict.relative_path().clone())
                };
                self.run_op(&folder, op).await?;
            }
            ConflictResolution::KeptRemote => {
                let op = if remote_exists {
                    Operation::new(OpKind::Download, conflict.relative_path().clone())
                        .with_remote_fingerprint(conflict.remote().fingerprint.clone())
                        .with_remote_modified(conflict.remote().modified)
                } else {
                    Operation::new(OpKind::LocalDelete, conflict.relative_path().clone())
                };
                self.run_op(&folder, op).await?;
            }
            ConflictResolution::KeptBothRenamed => {
                self.keep_both(&folder, &conflict).await?;
            }
            ConflictResolution::Ignored => {
                // The user dismissed the disagreement; files stay as-is.
            }
        }

        self.store
            .resolve_conflict(id, resolution, self.clock.now())
            .await?;

        self.activity
            .log_op_success(
                folder.id(),
                conflict.relative_path(),
                ActivityKind::Conflict,
                None,
                self.clock.now(),
            )
            .await;

        Ok(())
    }

    /// Runs one operation through the executor and applies its baseline
    /// effect directly (resolutions happen outside reconcile passes)
    async fn run_op(&self, folder: &SyncFolder, op: Operation) -> Result<()> {
        let mut builder = PlanBuilder::new();
        builder.push(op);
        let plan = builder.build();

        let report = self.executor.execute(folder, &plan).await;
        let op_report = report
            .reports
            .into_iter()
            .next()
            .context("resolution produced no result")?;

        match op_report.outcome {
            OpOutcome::Uploaded { row } | OpOutcome::Downloaded { row } => {
                self.store.upsert_file_metadata(&row).await?;
            }
            OpOutcome::RemoteDeleted | OpOutcome::LocalDeleted => {
                self.store
                    .delete_file_metadata(folder.id(), &op_report.op.path)
                    .await?;
            }
            OpOutcome::Failed { message } => {
                anyhow::bail!("resolution operation failed: {message}");
            }
            OpOutcome::Cancelled => {
                anyhow::bail!("resolution cancelled by shutdown");
            }
        }
        Ok(())
    }

    /// Renames the local copy out of the way, then pulls the remote version
    async fn keep_both(
        &self,
        folder: &SyncFolder,
        conflict: &baludesk_core::domain::Conflict,
    ) -> Result<()> {
        let path = conflict.relative_path();
        let abs = path.resolve(folder.local_path());

        if conflict.local().modified.is_some() {
            let dir = abs.parent().context("conflict path has no parent")?;
            let renamed = ConflictNamer::generate_unique(
                path.file_name(),
                self.clock.now().date_naive(),
                |candidate| dir.join(candidate).exists(),
            );
            let renamed_abs = dir.join(&renamed);

            tokio::fs::rename(&abs, &renamed_abs)
                .await
                .with_context(|| format!("could not rename {} aside", path))?;
            info!(original = %path, renamed = %renamed, "Kept local copy under conflict name");

            // The old baseline row no longer describes the renamed file.
            self.store.delete_file_metadata(folder.id(), path).await?;
        }

        if conflict.remote().modified.is_some() {
            let op = Operation::new(OpKind::Download, path.clone())
                .with_remote_fingerprint(conflict.remote().fingerprint.clone())
                .with_remote_modified(conflict.remote().modified);
            if let Err(e) = self.run_op(folder, op).await {
                // The rename already happened; surface the partial state
                // rather than pretending the resolution never started.
                warn!(error = %e, "Keep-both download failed after rename");
                return Err(e);
            }
        }

        Ok(())
    }
}
