//! Bidirectional reconciliation engine
//!
//! One [`SyncEngine::reconcile`] call runs a full pass for a folder:
//!
//! 1. Snapshot the baseline from the store
//! 2. Compute the local diff (change detector)
//! 3. Fetch the remote diff (`changes_since`, or a listing diff when the
//!    server lacks the endpoint)
//! 4. Classify every touched path through the decision table, applying the
//!    folder's conflict policy where the sides disagree
//! 5. Execute the resulting plan with the transfer executor
//! 6. Commit the pass's baseline writes, conflicts, and cursor advance in
//!    one store transaction
//!
//! The cursor advances to a timestamp captured *before* the pass began, so
//! changes racing the pass are re-observed next time instead of lost.
//! Passes for one folder are serialized by a per-folder mutex; watcher
//! events arriving mid-pass collapse into a dirty flag that triggers one
//! follow-up pass on completion.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use baludesk_conflict::{apply_policy, classify, LocalSide, PathFacts, PolicyDecision, RemoteSide, Verdict};
use baludesk_core::config::Config;
use baludesk_core::domain::conflict::SideVersion;
use baludesk_core::domain::newtypes::{Fingerprint, RelativePath};
use baludesk_core::domain::{
    Conflict, ConflictKind, FileMetadata, FolderId, SyncFolder, SyncState,
};
use baludesk_core::ports::{
    Clock, EngineEvent, Hasher, Notifier, RemoteChange, RemoteChangeKind, RemoteClient,
    RemoteError, StateStore, StoreBatch, SyncCounts,
};
use baludesk_audit::ActivityLogger;

use crate::executor::{ExecutionReport, OpOutcome, TransferExecutor};
use crate::ignore::IgnoreRules;
use crate::plan::{OpKind, Operation, Plan, PlanBuilder};
use crate::scanner::{ChangeDetector, LocalDiff, LocalEntry};

/// Tolerance when deciding remote-side change from a listing diff
const REMOTE_MTIME_TOLERANCE_SECS: i64 = 2;

/// Per-folder serialization state
#[derive(Default)]
struct FolderGuard {
    lock: tokio::sync::Mutex<()>,
    /// Set when events arrive during a pass; drained on pass completion
    dirty: AtomicBool,
    paused: AtomicBool,
}

/// The reconciliation engine
///
/// Cheap to share: every dependency is behind an `Arc`.
pub struct SyncEngine {
    store: Arc<dyn StateStore>,
    remote: Arc<dyn RemoteClient>,
    hasher: Arc<dyn Hasher>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    activity: Arc<ActivityLogger>,
    detector: ChangeDetector,
    executor: TransferExecutor,
    guards: std::sync::Mutex<HashMap<FolderId, Arc<FolderGuard>>>,
    cancel: CancellationToken,
}

impl SyncEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn StateStore>,
        remote: Arc<dyn RemoteClient>,
        hasher: Arc<dyn Hasher>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        config: &Config,
        cancel: CancellationToken,
    ) -> Self {
        let activity = Arc::new(ActivityLogger::new(store.clone()));
        let detector = ChangeDetector::new(hasher.clone(), IgnoreRules::standard());
        let executor = TransferExecutor::new(
            remote.clone(),
            hasher.clone(),
            clock.clone(),
            notifier.clone(),
            activity.clone(),
            config.max_concurrent_transfers as usize,
            cancel.clone(),
        );

        Self {
            store,
            remote,
            hasher,
            clock,
            notifier,
            activity,
            detector,
            executor,
            guards: std::sync::Mutex::new(HashMap::new()),
            cancel,
        }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    fn guard(&self, folder: FolderId) -> Arc<FolderGuard> {
        self.guards
            .lock()
            .expect("guard registry poisoned")
            .entry(folder)
            .or_default()
            .clone()
    }

    /// Pauses or resumes reconciliation for one folder
    pub fn set_folder_paused(&self, folder: FolderId, paused: bool) {
        self.guard(folder).paused.store(paused, Ordering::Release);
        info!(folder = %folder, paused, "Folder pause state changed");
    }

    /// Whether a folder is paused
    pub fn is_folder_paused(&self, folder: FolderId) -> bool {
        self.guard(folder).paused.load(Ordering::Acquire)
    }

    /// Drops the serialization state for a removed folder
    pub fn forget_folder(&self, folder: FolderId) {
        self.guards
            .lock()
            .expect("guard registry poisoned")
            .remove(&folder);
    }

    /// Runs reconcile passes for `folder` until no dirty flag remains
    ///
    /// Returns `Ok(None)` when the folder is paused or a pass is already in
    /// flight (the in-flight pass inherits the work via the dirty flag).
    pub async fn reconcile(&self, folder: FolderId) -> Result<Option<SyncCounts>> {
        let guard = self.guard(folder);

        if guard.paused.load(Ordering::Acquire) || self.cancel.is_cancelled() {
            return Ok(None);
        }

        let Ok(_lock) = guard.lock.try_lock() else {
            guard.dirty.store(true, Ordering::Release);
            debug!(folder = %folder, "Reconcile already running, marked dirty");
            return Ok(None);
        };

        let mut last = None;
        loop {
            let counts = self.reconcile_pass(folder).await?;
            last = Some(counts);

            if self.cancel.is_cancelled() || !guard.dirty.swap(false, Ordering::AcqRel) {
                return Ok(last);
            }
            debug!(folder = %folder, "Dirty flag set during pass, reconciling again");
        }
    }

    /// One end-to-end pass for a folder
    #[instrument(skip(self), fields(folder = %folder_id))]
    async fn reconcile_pass(&self, folder_id: FolderId) -> Result<SyncCounts> {
        let mut folder = self
            .store
            .get_folder(folder_id)
            .await?
            .with_context(|| format!("unknown folder {folder_id}"))?;

        let mut counts = SyncCounts::default();
        if !folder.is_enabled() {
            debug!("Folder disabled, skipping pass");
            return Ok(counts);
        }

        // Captured before any observation; racing changes are re-observed
        // next pass rather than lost behind the cursor.
        let pass_start = self.clock.now();

        self.notifier.notify(EngineEvent::SyncStarted { folder: folder_id });
        info!(root = %folder.local_path().display(), "Reconcile pass started");

        // Snapshot semantics: this baseline serves the whole pass.
        let baseline = self.store.list_file_metadata(folder_id).await?;

        let local = self
            .detector
            .diff(folder.local_path(), &baseline)
            .await
            .context("local scan failed")?;

        for (path, reason) in &local.unreadable {
            self.notifier.notify(EngineEvent::Error {
                folder: Some(folder_id),
                path: Some(path.clone()),
                message: format!("file unreadable, skipped this pass: {reason}"),
            });
        }

        let state = self
            .store
            .get_sync_state(folder_id)
            .await?
            .unwrap_or_else(|| SyncState::initial(folder_id));

        let remote_changes = match self
            .fetch_remote_changes(&folder, &baseline, state.last_sync())
            .await
        {
            Ok(changes) => changes,
            Err(err) => {
                // Whole-pass failure before planning: cursor untouched,
                // retried on the next tick.
                let message = format!("remote changes unavailable: {err}");
                warn!(error = %err, "Reconcile pass aborted before planning");
                self.activity
                    .log_folder_error(folder_id, &message, self.clock.now())
                    .await;
                self.notifier.notify(EngineEvent::Error {
                    folder: Some(folder_id),
                    path: None,
                    message,
                });
                return Err(err);
            }
        };

        debug!(
            local_changes = local.change_count(),
            remote_changes = remote_changes.len(),
            baseline = baseline.len(),
            "Pass inputs gathered"
        );

        let mut batch = StoreBatch::new();
        let plan = self
            .classify_and_plan(&folder, &baseline, &local, &remote_changes, &mut batch, &mut counts)
            .await?;

        let report = if plan.is_empty() {
            ExecutionReport::default()
        } else {
            info!(ops = plan.len(), "Executing plan");
            self.executor.execute(&folder, &plan).await
        };

        self.apply_report(folder_id, report, &mut batch, &mut counts);

        // Cursor and folder bookkeeping ride in the same transaction.
        let now = self.clock.now();
        let mut new_state = state;
        new_state.advance(pass_start, now);
        batch.set_sync_state(new_state);
        folder.record_full_sync(now);
        batch.update_folder(folder);

        self.store
            .apply_batch(batch)
            .await
            .context("failed to commit reconcile batch")?;

        info!(
            uploaded = counts.uploaded,
            downloaded = counts.downloaded,
            deleted = counts.deleted,
            conflicts = counts.conflicts,
            errors = counts.errors,
            "Reconcile pass completed"
        );
        self.notifier.notify(EngineEvent::SyncCompleted {
            folder: folder_id,
            counts,
        });

        Ok(counts)
    }

    /// Fetches the remote diff, falling back to a listing diff when the
    /// server predates the changes endpoint
    async fn fetch_remote_changes(
        &self,
        folder: &SyncFolder,
        baseline: &[FileMetadata],
        since: DateTime<Utc>,
    ) -> Result<Vec<RemoteChange>> {
        match self.remote.changes_since(folder.remote_path(), since).await {
            Ok(changes) => Ok(changes),
            Err(RemoteError::Unsupported(_)) => {
                debug!("changes_since unsupported, falling back to listing diff");
                let listing = self
                    .remote
                    .list_files(folder.remote_path())
                    .await
                    .context("remote listing failed")?;
                Ok(remote_diff_from_listing(baseline, &listing))
            }
            Err(e) => Err(e).context("changes_since failed"),
        }
    }

    /// Classifies every touched path and builds the plan plus the pass's
    /// no-transfer mutations (adopts, baseline drops, conflicts)
    async fn classify_and_plan(
        &self,
        folder: &SyncFolder,
        baseline: &[FileMetadata],
        local: &LocalDiff,
        remote_changes: &[RemoteChange],
        batch: &mut StoreBatch,
        counts: &mut SyncCounts,
    ) -> Result<Plan> {
        let folder_id = folder.id();

        let baseline_by_path: HashMap<&RelativePath, &FileMetadata> =
            baseline.iter().map(|row| (row.relative_path(), row)).collect();

        let unreadable: HashSet<&RelativePath> =
            local.unreadable.iter().map(|(p, _)| p).collect();

        #[derive(Debug)]
        enum LocalState<'a> {
            Created(&'a LocalEntry),
            Modified(&'a LocalEntry),
            Deleted,
            Unchanged,
        }

        let mut local_by_path: HashMap<&RelativePath, LocalState<'_>> = HashMap::new();
        for entry in &local.created {
            local_by_path.insert(&entry.path, LocalState::Created(entry));
        }
        for entry in &local.modified {
            local_by_path.insert(&entry.path, LocalState::Modified(entry));
        }
        for row in &local.deleted {
            local_by_path.insert(row.relative_path(), LocalState::Deleted);
        }
        for path in &local.unchanged {
            local_by_path.insert(path, LocalState::Unchanged);
        }

        let remote_by_path: HashMap<&RelativePath, &RemoteChange> = remote_changes
            .iter()
            .map(|c| (&c.relative_path, c))
            .collect();

        let mut paths: Vec<&RelativePath> = local_by_path
            .keys()
            .chain(remote_by_path.keys())
            .copied()
            .collect();
        paths.sort();
        paths.dedup();

        let mut builder = PlanBuilder::new();

        for path in paths {
            if unreadable.contains(path) {
                debug!(path = %path, "Skipping unreadable path");
                continue;
            }

            let local_state = local_by_path.get(path);
            let remote_change = remote_by_path.get(path).copied();

            let (local_side, local_entry) = match local_state {
                Some(LocalState::Created(e)) => (LocalSide::Created, Some(*e)),
                Some(LocalState::Modified(e)) => (LocalSide::Modified, Some(*e)),
                Some(LocalState::Deleted) => (LocalSide::Deleted, None),
                Some(LocalState::Unchanged) => (LocalSide::Unchanged, None),
                None => (LocalSide::None, None),
            };
            let remote_side = match remote_change.map(|c| c.kind) {
                Some(RemoteChangeKind::Created) => RemoteSide::Created,
                Some(RemoteChangeKind::Modified) => RemoteSide::Modified,
                Some(RemoteChangeKind::Deleted) => RemoteSide::Deleted,
                None => RemoteSide::None,
            };
            let baseline_row = baseline_by_path.get(path).copied();

            // A remote file landing where the local side has a directory
            // cannot be reconciled by transfer.
            if matches!(remote_side, RemoteSide::Created | RemoteSide::Modified)
                && matches!(local_side, LocalSide::None | LocalSide::Unchanged)
            {
                let abs = path.resolve(folder.local_path());
                if tokio::fs::metadata(&abs).await.map(|m| m.is_dir()).unwrap_or(false) {
                    self.record_conflict(
                        folder_id,
                        baseline_row,
                        path,
                        ConflictKind::TypeMismatch,
                        SideVersion::default(),
                        remote_side_version(remote_change),
                        batch,
                        counts,
                    )
                    .await;
                    continue;
                }
            }

            // The adopt check needs the local fingerprint for freshly
            // created files; hash lazily, only when both sides created.
            let mut created_fingerprint: Option<Fingerprint> = None;
            if matches!(local_side, LocalSide::Created)
                && matches!(remote_side, RemoteSide::Created | RemoteSide::Modified)
            {
                let abs = path.resolve(folder.local_path());
                match self.hasher.digest_file(&abs).await {
                    Ok(fp) => created_fingerprint = Some(fp),
                    Err(e) => {
                        warn!(path = %path, error = %e, "Could not hash created file, skipping");
                        continue;
                    }
                }
            }

            let local_fingerprint = created_fingerprint
                .as_ref()
                .or(local_entry.and_then(|e| e.fingerprint.as_ref()));
            let remote_fingerprint = remote_change.and_then(|c| c.fingerprint.as_ref());

            let verdict = classify(&PathFacts {
                local: local_side,
                remote: remote_side,
                baseline_present: baseline_row.is_some(),
                local_fingerprint,
                remote_fingerprint,
            });

            debug!(path = %path, ?verdict, "Path classified");

            match verdict {
                Verdict::Upload => {
                    let mut op = Operation::new(OpKind::Upload, path.clone());
                    if let Some(entry) = local_entry {
                        op = op.with_size(entry.size);
                    }
                    builder.push(op);
                }
                Verdict::Download => {
                    builder.push(download_op(path, remote_change));
                }
                Verdict::RemoteDelete => {
                    builder.push(Operation::new(OpKind::RemoteDelete, path.clone()));
                }
                Verdict::LocalDelete => {
                    builder.push(Operation::new(OpKind::LocalDelete, path.clone()));
                }
                Verdict::DropBaseline => {
                    batch.delete_file(folder_id, path.clone());
                }
                Verdict::Adopt => {
                    if let Some(row) = self.adopt_row(
                        folder_id,
                        path,
                        local_entry,
                        local_fingerprint,
                        remote_change,
                    ) {
                        batch.upsert_file(row);
                    }
                }
                Verdict::NoOp => {}
                Verdict::Conflict(kind) => {
                    let local_version = local_side_version(local_entry, baseline_row, local_side);
                    let remote_version = remote_side_version(remote_change);

                    match apply_policy(folder.policy(), kind, &local_version, &remote_version) {
                        PolicyDecision::Upload => {
                            let mut op = Operation::new(OpKind::Upload, path.clone());
                            if let Some(entry) = local_entry {
                                op = op.with_size(entry.size);
                            }
                            builder.push(op);
                        }
                        PolicyDecision::Download => {
                            builder.push(download_op(path, remote_change));
                        }
                        PolicyDecision::RemoteDelete => {
                            builder.push(Operation::new(OpKind::RemoteDelete, path.clone()));
                        }
                        PolicyDecision::LocalDelete => {
                            builder.push(Operation::new(OpKind::LocalDelete, path.clone()));
                        }
                        PolicyDecision::Adopt => {
                            if let Some(row) = self.adopt_row(
                                folder_id,
                                path,
                                local_entry,
                                local_fingerprint,
                                remote_change,
                            ) {
                                batch.upsert_file(row);
                            }
                        }
                        PolicyDecision::Record => {
                            self.record_conflict(
                                folder_id,
                                baseline_row,
                                path,
                                kind,
                                local_version,
                                remote_version,
                                batch,
                                counts,
                            )
                            .await;
                        }
                    }
                }
            }
        }

        Ok(builder.build())
    }

    /// Builds the baseline row for an adopt (identical content on both sides)
    fn adopt_row(
        &self,
        folder_id: FolderId,
        path: &RelativePath,
        local_entry: Option<&LocalEntry>,
        local_fingerprint: Option<&Fingerprint>,
        remote_change: Option<&RemoteChange>,
    ) -> Option<FileMetadata> {
        let entry = local_entry?;
        let fingerprint = local_fingerprint?.clone();
        let now = self.clock.now();
        let remote_modified = remote_change
            .and_then(|c| c.remote_modified)
            .unwrap_or(entry.modified);

        Some(FileMetadata::new(
            folder_id,
            path.clone(),
            fingerprint,
            entry.size,
            entry.modified,
            remote_modified,
            now,
        ))
    }

    /// Persists a conflict record and tells the UI about it
    #[allow(clippy::too_many_arguments)]
    async fn record_conflict(
        &self,
        folder_id: FolderId,
        baseline_row: Option<&FileMetadata>,
        path: &RelativePath,
        kind: ConflictKind,
        local: SideVersion,
        remote: SideVersion,
        batch: &mut StoreBatch,
        counts: &mut SyncCounts,
    ) {
        let now = self.clock.now();
        let conflict = Conflict::new(
            folder_id,
            baseline_row.map(|row| row.id()),
            path.clone(),
            kind,
            local,
            remote,
            now,
        );

        info!(path = %path, kind = %kind, "Conflict recorded, awaiting resolution");
        batch.log_conflict(conflict);
        counts.conflicts += 1;

        self.activity.log_conflict(folder_id, path, kind, now).await;
        self.notifier.notify(EngineEvent::ConflictDetected {
            folder: folder_id,
            path: path.clone(),
            kind,
        });
    }

    /// Folds executor outcomes into the pass batch and counters
    fn apply_report(
        &self,
        folder_id: FolderId,
        report: ExecutionReport,
        batch: &mut StoreBatch,
        counts: &mut SyncCounts,
    ) {
        for op_report in report.reports {
            match op_report.outcome {
                OpOutcome::Uploaded { row } => {
                    counts.uploaded += 1;
                    batch.upsert_file(row);
                }
                OpOutcome::Downloaded { row } => {
                    counts.downloaded += 1;
                    batch.upsert_file(row);
                }
                OpOutcome::RemoteDeleted | OpOutcome::LocalDeleted => {
                    counts.deleted += 1;
                    batch.delete_file(folder_id, op_report.op.path);
                }
                OpOutcome::Failed { .. } => {
                    counts.errors += 1;
                }
                OpOutcome::Cancelled => {
                    debug!(path = %op_report.op.path, "Operation cancelled by shutdown");
                }
            }
        }
    }
}

/// Builds a download operation carrying the remote-reported metadata
fn download_op(path: &RelativePath, remote_change: Option<&RemoteChange>) -> Operation {
    let mut op = Operation::new(OpKind::Download, path.clone());
    if let Some(change) = remote_change {
        if let Some(size) = change.size {
            op = op.with_size(size);
        }
        op = op
            .with_remote_fingerprint(change.fingerprint.clone())
            .with_remote_modified(change.remote_modified);
    }
    op
}

fn local_side_version(
    entry: Option<&LocalEntry>,
    baseline: Option<&FileMetadata>,
    side: LocalSide,
) -> SideVersion {
    match (side, entry) {
        (LocalSide::Deleted, _) | (LocalSide::None, _) => SideVersion::default(),
        (_, Some(entry)) => SideVersion {
            modified: Some(entry.modified),
            size: Some(entry.size),
            fingerprint: entry.fingerprint.clone(),
        },
        // Unchanged paths fall back to the baseline's view.
        (_, None) => baseline
            .map(|row| SideVersion {
                modified: Some(row.local_modified()),
                size: Some(row.size()),
                fingerprint: Some(row.fingerprint().clone()),
            })
            .unwrap_or_default(),
    }
}

fn remote_side_version(change: Option<&RemoteChange>) -> SideVersion {
    change
        .map(|c| SideVersion {
            modified: c.remote_modified,
            size: c.size,
            fingerprint: c.fingerprint.clone(),
        })
        .unwrap_or_default()
}

/// Synthesizes a remote change set from a full listing, for servers
/// without a changes feed
pub(crate) fn remote_diff_from_listing(
    baseline: &[FileMetadata],
    listing: &[baludesk_core::ports::RemoteFile],
) -> Vec<RemoteChange> {
    let baseline_by_path: HashMap<&RelativePath, &FileMetadata> =
        baseline.iter().map(|row| (row.relative_path(), row)).collect();

    let mut changes = Vec::new();
    let mut seen: HashSet<&RelativePath> = HashSet::new();

    for file in listing {
        if file.is_dir {
            continue;
        }
        seen.insert(&file.relative_path);

        match baseline_by_path.get(&file.relative_path) {
            None => changes.push(RemoteChange {
                relative_path: file.relative_path.clone(),
                kind: RemoteChangeKind::Created,
                remote_modified: Some(file.remote_modified),
                size: Some(file.size),
                fingerprint: file.fingerprint.clone(),
            }),
            Some(row) => {
                let changed = match &file.fingerprint {
                    Some(fp) => fp != row.fingerprint(),
                    None => {
                        file.size != row.size()
                            || (file.remote_modified - row.remote_modified())
                                > Duration::seconds(REMOTE_MTIME_TOLERANCE_SECS)
                    }
                };
                if changed {
                    changes.push(RemoteChange {
                        relative_path: file.relative_path.clone(),
                        kind: RemoteChangeKind::Modified,
                        remote_modified: Some(file.remote_modified),
                        size: Some(file.size),
                        fingerprint: file.fingerprint.clone(),
                    });
                }
            }
        }
    }

    for row in baseline {
        if !seen.contains(row.relative_path()) {
            changes.push(RemoteChange {
                relative_path: row.relative_path().clone(),
                kind: RemoteChangeKind::Deleted,
                remote_modified: None,
                size: None,
                fingerprint: None,
            });
        }
    }

    changes
}
