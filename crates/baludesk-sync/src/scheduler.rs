//! Sync scheduler
//!
//! Drives reconciliation from three sources: the periodic tick
//! (`sync_interval`), settled watcher events, and explicit commands from
//! the IPC layer ("sync now", folder list changes, pause/resume).
//!
//! ## Flow
//!
//! ```text
//! WatcherFacade ──→ mpsc ──→ DebouncedEventQueue ──→ reconcile(folder)
//!                     interval tick ────────────────→ reconcile(all)
//!                     SchedulerHandle commands ─────→ reconcile / refresh
//! ```
//!
//! The scheduler owns the watcher facade: every tick it converges the set
//! of active watches onto the set of enabled folders, so a watch lost to a
//! backend error simply stays down until the folder's next successful
//! convergence, with the periodic rescan covering the gap.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use baludesk_core::domain::FolderId;
use baludesk_core::ports::{EngineEvent, Notifier, StateStore};

use crate::debounce::{DebouncedEventQueue, DEBOUNCE_WINDOW};
use crate::engine::SyncEngine;
use crate::watcher::{WatchMessage, WatcherFacade};

/// How often the debounce queue is polled for settled events
const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Commands the IPC layer sends to the scheduler
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Reconcile one folder now, or every enabled folder
    SyncNow(Option<FolderId>),
    /// The folder list changed; converge watches and roots
    Refresh,
}

/// Cloneable handle for controlling a running scheduler
#[derive(Clone)]
pub struct SchedulerHandle {
    paused: Arc<AtomicBool>,
    tx: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Stops automatic reconciliation; watches stay active and events keep
    /// accumulating for resume
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
        info!("Sync paused");
    }

    /// Resumes automatic reconciliation
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        info!("Sync resumed");
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Requests an immediate reconcile, bypassing pause and debounce
    pub async fn sync_now(&self, folder: Option<FolderId>) {
        if self.tx.send(SchedulerCommand::SyncNow(folder)).await.is_err() {
            warn!("Scheduler is gone, sync request dropped");
        }
    }

    /// Tells the scheduler the folder set changed
    pub async fn refresh(&self) {
        if self.tx.send(SchedulerCommand::Refresh).await.is_err() {
            warn!("Scheduler is gone, refresh dropped");
        }
    }
}

/// Schedules reconcile passes for all configured folders
pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    store: Arc<dyn StateStore>,
    notifier: Arc<dyn Notifier>,
    watcher: WatcherFacade,
    watch_rx: mpsc::Receiver<WatchMessage>,
    command_rx: mpsc::Receiver<SchedulerCommand>,
    queue: DebouncedEventQueue,
    sync_interval: Duration,
    paused: Arc<AtomicBool>,
    cancel: CancellationToken,
    /// (folder, root) pairs for mapping event paths back to folders
    roots: Vec<(FolderId, PathBuf)>,
}

impl SyncScheduler {
    pub fn new(
        engine: Arc<SyncEngine>,
        store: Arc<dyn StateStore>,
        notifier: Arc<dyn Notifier>,
        watcher: WatcherFacade,
        watch_rx: mpsc::Receiver<WatchMessage>,
        sync_interval: Duration,
        cancel: CancellationToken,
    ) -> (Self, SchedulerHandle) {
        let paused = Arc::new(AtomicBool::new(false));
        let (command_tx, command_rx) = mpsc::channel(64);

        let handle = SchedulerHandle {
            paused: paused.clone(),
            tx: command_tx,
        };

        let scheduler = Self {
            engine,
            store,
            notifier,
            watcher,
            watch_rx,
            command_rx,
            queue: DebouncedEventQueue::new(DEBOUNCE_WINDOW),
            sync_interval,
            paused,
            cancel,
            roots: Vec::new(),
        };

        (scheduler, handle)
    }

    /// Main scheduling loop; returns when the cancellation token fires
    pub async fn run(mut self) {
        info!(
            interval_secs = self.sync_interval.as_secs(),
            "Sync scheduler starting"
        );

        self.converge_watches().await;
        self.reconcile_all();

        let mut tick = tokio::time::interval(self.sync_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first interval tick fires immediately; the initial pass above
        // already covered it.
        tick.tick().await;

        let mut poll = tokio::time::interval(QUEUE_POLL_INTERVAL);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,

                message = self.watch_rx.recv() => match message {
                    Some(WatchMessage::Event(event)) => {
                        debug!(path = %event.path.display(), action = ?event.action, "Watcher event");
                        self.queue.push(event);
                    }
                    Some(WatchMessage::Lost { root, reason }) => {
                        self.handle_watch_lost(&root, &reason).await;
                    }
                    None => {
                        warn!("Watcher channel closed, scheduler stopping");
                        break;
                    }
                },

                _ = poll.tick() => {
                    let settled = self.queue.poll();
                    if !settled.is_empty() && !self.paused.load(Ordering::Acquire) {
                        let mut folders: Vec<FolderId> = settled
                            .iter()
                            .filter_map(|e| self.folder_for_path(&e.path))
                            .collect();
                        folders.sort();
                        folders.dedup();
                        for folder in folders {
                            self.spawn_reconcile(folder);
                        }
                    }
                }

                _ = tick.tick() => {
                    self.converge_watches().await;
                    if !self.paused.load(Ordering::Acquire) {
                        self.reconcile_all();
                    }
                }

                command = self.command_rx.recv() => match command {
                    Some(SchedulerCommand::SyncNow(Some(folder))) => {
                        self.spawn_reconcile(folder);
                    }
                    Some(SchedulerCommand::SyncNow(None)) => {
                        self.reconcile_all();
                    }
                    Some(SchedulerCommand::Refresh) => {
                        self.converge_watches().await;
                    }
                    None => break,
                },
            }
        }

        self.watcher.stop_all();
        info!("Sync scheduler stopped");
    }

    /// Starts and stops watches so they match the enabled folder set
    async fn converge_watches(&mut self) {
        let folders = match self.store.list_folders().await {
            Ok(folders) => folders,
            Err(e) => {
                warn!(error = %e, "Could not list folders, keeping previous watch set");
                return;
            }
        };

        let mut roots = Vec::with_capacity(folders.len());
        for folder in &folders {
            if folder.is_enabled() && !self.engine.is_folder_paused(folder.id()) {
                roots.push((folder.id(), folder.local_path().clone()));
                if !self.watcher.is_watching(folder.local_path()) {
                    if let Err(e) = self.watcher.start_watch(folder.local_path()) {
                        warn!(
                            folder = %folder.id(),
                            root = %folder.local_path().display(),
                            error = %e,
                            "Could not start watch; relying on periodic rescan"
                        );
                        self.notifier.notify(EngineEvent::Error {
                            folder: Some(folder.id()),
                            path: None,
                            message: "filesystem watch unavailable, changes sync on the periodic interval".to_string(),
                        });
                    }
                }
            }
        }

        // Tear down watches for roots no longer configured or disabled.
        for watched in self.watcher.watched_roots() {
            if !roots.iter().any(|(_, root)| root == &watched) {
                self.watcher.stop_watch(&watched);
            }
        }

        self.roots = roots;
    }

    async fn handle_watch_lost(&mut self, root: &Path, reason: &str) {
        warn!(root = %root.display(), reason, "Watch lost, baseline rescan will cover the gap");
        self.watcher.stop_watch(root);

        if let Some(folder) = self.folder_for_path(root) {
            self.notifier.notify(EngineEvent::Error {
                folder: Some(folder),
                path: None,
                message: "filesystem watch lost; rescanning folder".to_string(),
            });
            // The pass's full scan is the recovery mechanism.
            self.spawn_reconcile(folder);
        }
    }

    /// Maps an absolute path to the folder with the longest matching root
    fn folder_for_path(&self, path: &Path) -> Option<FolderId> {
        self.roots
            .iter()
            .filter(|(_, root)| path.starts_with(root))
            .max_by_key(|(_, root)| root.as_os_str().len())
            .map(|(id, _)| *id)
    }

    fn reconcile_all(&self) {
        for (folder, _) in &self.roots {
            self.spawn_reconcile(*folder);
        }
    }

    /// Fire-and-forget reconcile; the engine's per-folder mutex serializes
    /// overlapping requests
    fn spawn_reconcile(&self, folder: FolderId) {
        let engine = self.engine.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.reconcile(folder).await {
                warn!(folder = %folder, error = %e, "Reconcile failed, will retry on next tick");
            }
        });
    }
}
