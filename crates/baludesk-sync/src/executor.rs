//! Transfer executor
//!
//! Drains a reconcile plan with bounded concurrency. Deletions run first
//! and complete before any transfer begins (the plan's phase split), which
//! together with per-path deduplication guarantees no two workers ever
//! operate on the same relative path in one pass.
//!
//! Per operation the state machine is
//! `queued → in-flight → succeeded | failed(retryable) | failed(fatal)`:
//! retryable failures (network, 5xx, transient I/O, integrity mismatch)
//! re-queue with exponential backoff; fatal failures (validation, auth,
//! permission) skip the operation for this pass and the rest of the plan
//! continues. Every attempt leaves an activity-log entry.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use baludesk_core::domain::newtypes::RelativePath;
use baludesk_core::domain::{ActivityKind, FileMetadata, FolderId, SyncFolder};
use baludesk_core::ports::{
    Clock, EngineEvent, Hasher, Notifier, RemoteClient, RemoteError, TransferReceipt,
};
use baludesk_audit::ActivityLogger;

use crate::plan::{OpKind, Operation, Plan};
use crate::scanner::stat_entry;

/// Retry schedule: 1s, 2s, 4s, 8s, ... capped at 60s, at most 5 attempts
const MAX_ATTEMPTS: u32 = 5;
const BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(60);

/// Suffix for in-flight download staging files; ignored by the watcher
const PARTIAL_SUFFIX: &str = ".baludesk-part";

/// Terminal state of one executed operation
#[derive(Debug)]
pub enum OpOutcome {
    /// Upload finished; the new baseline row is ready to commit
    Uploaded { row: FileMetadata },
    /// Download finished; the new baseline row is ready to commit
    Downloaded { row: FileMetadata },
    /// The remote copy is gone
    RemoteDeleted,
    /// The local copy is gone
    LocalDeleted,
    /// The operation was skipped this pass (fatal error or retries
    /// exhausted); the path stays in its pre-pass state
    Failed { message: String },
    /// Shutdown interrupted the plan before this operation ran
    Cancelled,
}

/// One operation paired with how it ended
#[derive(Debug)]
pub struct OpReport {
    pub op: Operation,
    pub outcome: OpOutcome,
}

/// Everything the executor did for one plan
#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub reports: Vec<OpReport>,
}

/// Internal error carrying the retry classification
#[derive(Debug)]
struct OpError {
    message: String,
    retryable: bool,
}

impl OpError {
    fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    fn from_remote(err: RemoteError) -> Self {
        Self {
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }

    fn from_io(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        let retryable = !matches!(
            err.kind(),
            ErrorKind::NotFound | ErrorKind::PermissionDenied | ErrorKind::InvalidInput
        );
        Self {
            retryable,
            message: err.to_string(),
        }
    }
}

/// Folder context shared by all workers of one pass
struct FolderCtx {
    id: FolderId,
    root: PathBuf,
    remote_root: String,
}

/// Joins a folder's remote root with a relative path
pub fn join_remote(remote_root: &str, rel: &RelativePath) -> String {
    format!("{}/{}", remote_root.trim_end_matches('/'), rel)
}

/// Bounded-concurrency plan executor
#[derive(Clone)]
pub struct TransferExecutor {
    remote: Arc<dyn RemoteClient>,
    hasher: Arc<dyn Hasher>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    activity: Arc<ActivityLogger>,
    concurrency: usize,
    cancel: CancellationToken,
}

impl TransferExecutor {
    pub fn new(
        remote: Arc<dyn RemoteClient>,
        hasher: Arc<dyn Hasher>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        activity: Arc<ActivityLogger>,
        concurrency: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            remote,
            hasher,
            clock,
            notifier,
            activity,
            concurrency: concurrency.max(1),
            cancel,
        }
    }

    /// Executes the plan's delete phase, then its transfer phase
    pub async fn execute(&self, folder: &SyncFolder, plan: &Plan) -> ExecutionReport {
        let ctx = Arc::new(FolderCtx {
            id: folder.id(),
            root: folder.local_path().clone(),
            remote_root: folder.remote_path().to_string(),
        });

        let mut report = ExecutionReport::default();

        // Deletions complete before any creation at the same path can start.
        self.run_phase(&ctx, plan.deletes(), &mut report).await;
        self.run_phase(&ctx, plan.transfers(), &mut report).await;

        info!(
            folder = %ctx.id,
            ops = plan.len(),
            failed = report
                .reports
                .iter()
                .filter(|r| matches!(r.outcome, OpOutcome::Failed { .. }))
                .count(),
            "Plan drained"
        );

        report
    }

    async fn run_phase(&self, ctx: &Arc<FolderCtx>, ops: &[Operation], report: &mut ExecutionReport) {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for op in ops {
            let executor = self.clone();
            let ctx = ctx.clone();
            let semaphore = semaphore.clone();
            let op = op.clone();

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("executor semaphore closed");
                let outcome = executor.run_with_retry(&ctx, &op).await;
                OpReport { op, outcome }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(op_report) => report.reports.push(op_report),
                Err(e) => warn!(error = %e, "Executor worker panicked"),
            }
        }
    }

    /// Runs one operation through the retry state machine
    async fn run_with_retry(&self, ctx: &FolderCtx, op: &Operation) -> OpOutcome {
        let activity_kind = activity_kind_for(op.kind);

        for attempt in 1..=MAX_ATTEMPTS {
            if self.cancel.is_cancelled() {
                return OpOutcome::Cancelled;
            }

            debug!(path = %op.path, kind = op.kind.as_str(), attempt, "Operation in flight");

            match self.attempt(ctx, op).await {
                Ok(outcome) => {
                    let bytes = match &outcome {
                        OpOutcome::Uploaded { row } | OpOutcome::Downloaded { row } => {
                            Some(row.size())
                        }
                        _ => op.size,
                    };
                    self.activity
                        .log_op_success(ctx.id, &op.path, activity_kind, bytes, self.clock.now())
                        .await;
                    self.notifier.notify(EngineEvent::SyncProgress {
                        folder: ctx.id,
                        path: op.path.clone(),
                        op: activity_kind,
                        bytes,
                    });
                    if attempt > 1 {
                        info!(path = %op.path, attempt, "Operation succeeded after retry");
                    }
                    return outcome;
                }
                Err(err) if err.retryable && attempt < MAX_ATTEMPTS => {
                    let delay = backoff_delay(attempt);
                    warn!(
                        path = %op.path,
                        attempt,
                        delay_secs = delay.as_secs(),
                        error = %err.message,
                        "Transient failure, retrying"
                    );
                    self.activity
                        .log_op_failure(ctx.id, &op.path, activity_kind, &err.message, self.clock.now())
                        .await;

                    tokio::select! {
                        _ = self.cancel.cancelled() => return OpOutcome::Cancelled,
                        _ = self.clock.sleep(delay) => {}
                    }
                }
                Err(err) => {
                    let reason = if err.retryable {
                        format!("retries exhausted: {}", err.message)
                    } else {
                        err.message.clone()
                    };
                    warn!(path = %op.path, error = %reason, "Operation skipped this pass");
                    self.activity
                        .log_op_failure(ctx.id, &op.path, activity_kind, &err.message, self.clock.now())
                        .await;
                    self.activity
                        .log_op_skipped(ctx.id, &op.path, activity_kind, &reason, self.clock.now())
                        .await;
                    self.notifier.notify(EngineEvent::Error {
                        folder: Some(ctx.id),
                        path: Some(op.path.clone()),
                        message: short_error(op.kind, &reason),
                    });
                    return OpOutcome::Failed { message: reason };
                }
            }
        }

        // The loop always returns; retries exhausted is handled above.
        OpOutcome::Failed {
            message: "retries exhausted".to_string(),
        }
    }

    async fn attempt(&self, ctx: &FolderCtx, op: &Operation) -> Result<OpOutcome, OpError> {
        match op.kind {
            OpKind::Upload => self.attempt_upload(ctx, op).await,
            OpKind::Download => self.attempt_download(ctx, op).await,
            OpKind::RemoteDelete => self.attempt_remote_delete(ctx, op).await,
            OpKind::LocalDelete => self.attempt_local_delete(ctx, op).await,
        }
    }

    async fn attempt_upload(&self, ctx: &FolderCtx, op: &Operation) -> Result<OpOutcome, OpError> {
        let local = op.path.resolve(&ctx.root);
        let remote_path = join_remote(&ctx.remote_root, &op.path);

        // Fingerprint the bytes we are about to send; this is what the
        // baseline must record if the upload succeeds.
        let fingerprint = self
            .hasher
            .digest_file(&local)
            .await
            .map_err(OpError::from_io)?;

        let receipt: TransferReceipt = self
            .remote
            .upload(&local, &remote_path)
            .await
            .map_err(OpError::from_remote)?;

        if let Some(reported) = &receipt.fingerprint {
            if reported != &fingerprint {
                // The file changed while we were sending it; the next scan
                // will pick the new contents up.
                return Err(OpError::retryable(format!(
                    "server fingerprint mismatch after upload of {}",
                    op.path
                )));
            }
        }

        let (size, local_modified) = stat_entry(&ctx.root, &op.path)
            .await
            .map_err(|e| OpError::fatal(e.to_string()))?;

        let row = FileMetadata::new(
            ctx.id,
            op.path.clone(),
            fingerprint,
            size,
            local_modified,
            receipt.remote_modified,
            self.clock.now(),
        );
        Ok(OpOutcome::Uploaded { row })
    }

    async fn attempt_download(&self, ctx: &FolderCtx, op: &Operation) -> Result<OpOutcome, OpError> {
        let target = op.path.resolve(&ctx.root);
        let remote_path = join_remote(&ctx.remote_root, &op.path);

        match tokio::fs::metadata(&target).await {
            Ok(meta) if meta.is_dir() => {
                return Err(OpError::fatal(format!(
                    "download target {} is a directory",
                    op.path
                )));
            }
            _ => {}
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(OpError::from_io)?;
        }

        let temp = partial_path(&target);
        let receipt = match self.remote.download(&remote_path, &temp).await {
            Ok(receipt) => receipt,
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp).await;
                return Err(OpError::from_remote(e));
            }
        };

        // Verify the bytes on disk against the fingerprint the server
        // reported, preferring the one from the change feed.
        let actual = self
            .hasher
            .digest_file(&temp)
            .await
            .map_err(OpError::from_io)?;
        let expected = op.remote_fingerprint.as_ref().or(receipt.fingerprint.as_ref());
        if let Some(expected) = expected {
            if expected != &actual {
                let _ = tokio::fs::remove_file(&temp).await;
                return Err(OpError::retryable(format!(
                    "integrity check failed for {}",
                    op.path
                )));
            }
        }

        // Atomic within one filesystem: temp lives next to the target.
        tokio::fs::rename(&temp, &target)
            .await
            .map_err(OpError::from_io)?;

        let (size, local_modified) = stat_entry(&ctx.root, &op.path)
            .await
            .map_err(|e| OpError::fatal(e.to_string()))?;

        let row = FileMetadata::new(
            ctx.id,
            op.path.clone(),
            actual,
            size,
            local_modified,
            receipt.remote_modified,
            self.clock.now(),
        );
        Ok(OpOutcome::Downloaded { row })
    }

    async fn attempt_remote_delete(
        &self,
        ctx: &FolderCtx,
        op: &Operation,
    ) -> Result<OpOutcome, OpError> {
        let remote_path = join_remote(&ctx.remote_root, &op.path);
        match self.remote.delete(&remote_path).await {
            Ok(()) | Err(RemoteError::NotFound(_)) => Ok(OpOutcome::RemoteDeleted),
            Err(e) => Err(OpError::from_remote(e)),
        }
    }

    async fn attempt_local_delete(
        &self,
        ctx: &FolderCtx,
        op: &Operation,
    ) -> Result<OpOutcome, OpError> {
        let target = op.path.resolve(&ctx.root);
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(OpOutcome::LocalDeleted),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(OpOutcome::LocalDeleted),
            Err(e) => Err(OpError::from_io(e)),
        }
    }
}

/// Exponential backoff: 1s, 2s, 4s, 8s, ... capped at 60s
fn backoff_delay(attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    BASE_DELAY.saturating_mul(factor as u32).min(MAX_DELAY)
}

fn activity_kind_for(kind: OpKind) -> ActivityKind {
    match kind {
        OpKind::Upload => ActivityKind::Upload,
        OpKind::Download => ActivityKind::Download,
        OpKind::RemoteDelete => ActivityKind::RemoteDelete,
        OpKind::LocalDelete => ActivityKind::LocalDelete,
    }
}

/// Short, secret-free message for the UI
fn short_error(kind: OpKind, reason: &str) -> String {
    format!("{} failed: {}", kind.as_str(), reason)
}

/// Staging path for a download, in the same directory as the target
fn partial_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    name.push_str(PARTIAL_SUFFIX);
    target.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_schedule() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(3), Duration::from_secs(4));
        assert_eq!(backoff_delay(4), Duration::from_secs(8));
        // Deep attempts clamp to the cap.
        assert_eq!(backoff_delay(7), Duration::from_secs(60));
        assert_eq!(backoff_delay(30), Duration::from_secs(60));
    }

    #[test]
    fn partial_path_is_a_sibling() {
        let p = partial_path(Path::new("/root/docs/report.docx"));
        assert_eq!(p, PathBuf::from("/root/docs/report.docx.baludesk-part"));
    }

    #[test]
    fn join_remote_normalizes_slashes() {
        let rel = RelativePath::new("sub/b.bin").unwrap();
        assert_eq!(join_remote("/team/docs/", &rel), "/team/docs/sub/b.bin");
        assert_eq!(join_remote("/team/docs", &rel), "/team/docs/sub/b.bin");
    }

    #[test]
    fn io_error_classification() {
        let fatal = OpError::from_io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert!(!fatal.retryable);

        let transient = OpError::from_io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "slow disk",
        ));
        assert!(transient.retryable);
    }
}
