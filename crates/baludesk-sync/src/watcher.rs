//! Filesystem watcher facade
//!
//! Wraps the `notify` crate's per-platform backends (inotify on Linux,
//! FSEvents/kqueue on macOS, ReadDirectoryChangesW on Windows) behind one
//! uniform surface: start and stop watches per root, a single event sink,
//! and ignore filtering before anything reaches the queue.
//!
//! ## Architecture
//!
//! ```text
//! inotify / FSEvents / RDCW
//!       │ (backend thread)
//!       ▼
//!  WatcherFacade callback ──→ mpsc::channel ──→ SyncScheduler (debounce)
//! ```
//!
//! Each watched root owns its own backend watcher, so tearing one down
//! never disturbs the others. Backend callbacks run on the backend's
//! thread and must not block; events are forwarded with `try_send` and a
//! full queue drops the event with a warning (the periodic rescan picks
//! the change up later).
//!
//! Watches are not self-healing: a backend error tears the watch down and
//! surfaces a [`WatchMessage::Lost`] so the engine can fall back to
//! scan-based detection for that folder.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Utc;
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use baludesk_core::domain::newtypes::RelativePath;

use crate::debounce::{FileAction, FileEvent};
use crate::ignore::IgnoreRules;

/// Channel capacity between backend callbacks and the scheduler
const EVENT_CHANNEL_CAPACITY: usize = 4096;

/// Messages delivered to the facade's single sink
#[derive(Debug)]
pub enum WatchMessage {
    /// A coalescible filesystem event under one of the watched roots
    Event(FileEvent),
    /// The backend for `root` failed; the watch has been torn down
    Lost { root: PathBuf, reason: String },
}

/// Multi-root watcher with uniform event semantics
pub struct WatcherFacade {
    watchers: Mutex<HashMap<PathBuf, RecommendedWatcher>>,
    tx: mpsc::Sender<WatchMessage>,
    ignore: IgnoreRules,
}

impl WatcherFacade {
    /// Creates the facade and the receiving end of its event sink
    #[must_use]
    pub fn new(ignore: IgnoreRules) -> (Self, mpsc::Receiver<WatchMessage>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        (
            Self {
                watchers: Mutex::new(HashMap::new()),
                tx,
                ignore,
            },
            rx,
        )
    }

    /// Begins watching `root` recursively
    ///
    /// # Errors
    /// Fails when the path does not exist, is not a directory, or the
    /// backend refuses the watch (inotify watch limit, permissions).
    pub fn start_watch(&self, root: &Path) -> Result<()> {
        let meta = std::fs::metadata(root)
            .with_context(|| format!("Cannot watch {}: path not accessible", root.display()))?;
        if !meta.is_dir() {
            anyhow::bail!("Cannot watch {}: not a directory", root.display());
        }

        let mut watchers = self.watchers.lock().expect("watcher registry poisoned");
        if watchers.contains_key(root) {
            debug!(root = %root.display(), "Already watching");
            return Ok(());
        }

        let tx = self.tx.clone();
        let ignore = self.ignore.clone();
        let callback_root = root.to_path_buf();

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    for file_event in map_notify_event(&event) {
                        if is_ignored(&ignore, &callback_root, &file_event.path) {
                            continue;
                        }
                        if let Err(e) = tx.try_send(WatchMessage::Event(file_event)) {
                            warn!(error = %e, "Event queue full, dropping watcher event");
                        }
                    }
                }
                Err(err) => {
                    warn!(root = %callback_root.display(), error = %err, "Watcher backend error");
                    let _ = tx.try_send(WatchMessage::Lost {
                        root: callback_root.clone(),
                        reason: err.to_string(),
                    });
                }
            },
            notify::Config::default(),
        )
        .context("Failed to create file watcher backend")?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch path: {}", root.display()))?;

        watchers.insert(root.to_path_buf(), watcher);
        info!(root = %root.display(), "Started recursive watch");
        Ok(())
    }

    /// Stops watching `root`; idempotent
    pub fn stop_watch(&self, root: &Path) {
        let mut watchers = self.watchers.lock().expect("watcher registry poisoned");
        if let Some(mut watcher) = watchers.remove(root) {
            if let Err(e) = watcher.unwatch(root) {
                // The backend may already have dropped the watch (e.g. the
                // directory was deleted); releasing the handle is enough.
                debug!(root = %root.display(), error = %e, "Unwatch failed during stop");
            }
            info!(root = %root.display(), "Stopped watch");
        }
    }

    /// Stops every watch and releases all backend handles
    ///
    /// Single teardown point, invoked from the shutdown path.
    pub fn stop_all(&self) {
        let mut watchers = self.watchers.lock().expect("watcher registry poisoned");
        let count = watchers.len();
        for (root, mut watcher) in watchers.drain() {
            if let Err(e) = watcher.unwatch(&root) {
                debug!(root = %root.display(), error = %e, "Unwatch failed during stop_all");
            }
        }
        if count > 0 {
            info!(count, "All watches stopped");
        }
    }

    /// Whether `root` is currently watched
    #[must_use]
    pub fn is_watching(&self, root: &Path) -> bool {
        self.watchers
            .lock()
            .expect("watcher registry poisoned")
            .contains_key(root)
    }

    /// Roots currently being watched
    #[must_use]
    pub fn watched_roots(&self) -> Vec<PathBuf> {
        self.watchers
            .lock()
            .expect("watcher registry poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

impl Drop for WatcherFacade {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// Whether an absolute event path falls under the facade's ignore rules
fn is_ignored(ignore: &IgnoreRules, root: &Path, path: &Path) -> bool {
    match RelativePath::from_root(root, path) {
        Ok(rel) => ignore.matches_path(&rel),
        // Events outside the root (or the root itself) are not ours to filter.
        Err(_) => false,
    }
}

/// Best-effort size for an event path; deleted paths yield `None`
fn stat_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().filter(|m| m.is_file()).map(|m| m.len())
}

fn file_event(path: &Path, action: FileAction) -> FileEvent {
    FileEvent {
        path: path.to_path_buf(),
        action,
        detected_at: Utc::now(),
        size: stat_size(path),
    }
}

/// Converts a raw `notify::Event` into zero or more [`FileEvent`]s
///
/// Renames become a `Deleted` on the source plus a `Created` on the
/// destination; access events are dropped.
fn map_notify_event(event: &notify::Event) -> Vec<FileEvent> {
    let paths = &event.paths;

    match &event.kind {
        EventKind::Create(_) => paths
            .first()
            .map(|p| vec![file_event(p, FileAction::Created)])
            .unwrap_or_default(),

        EventKind::Remove(_) => paths
            .first()
            .map(|p| vec![file_event(p, FileAction::Deleted)])
            .unwrap_or_default(),

        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if paths.len() >= 2 {
                vec![
                    file_event(&paths[0], FileAction::Deleted),
                    file_event(&paths[1], FileAction::Created),
                ]
            } else {
                paths
                    .first()
                    .map(|p| vec![file_event(p, FileAction::Modified)])
                    .unwrap_or_default()
            }
        }

        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => paths
            .first()
            .map(|p| vec![file_event(p, FileAction::Deleted)])
            .unwrap_or_default(),

        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => paths
            .first()
            .map(|p| vec![file_event(p, FileAction::Created)])
            .unwrap_or_default(),

        EventKind::Modify(_) => paths
            .first()
            .map(|p| vec![file_event(p, FileAction::Modified)])
            .unwrap_or_default(),

        // Access and other event kinds carry no sync-relevant information.
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_create_event() {
        let event = notify::Event {
            kind: EventKind::Create(notify::event::CreateKind::File),
            paths: vec![PathBuf::from("/r/a.txt")],
            attrs: Default::default(),
        };
        let mapped = map_notify_event(&event);
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0].action, FileAction::Created);
        assert_eq!(mapped[0].path, PathBuf::from("/r/a.txt"));
    }

    #[test]
    fn map_remove_event() {
        let event = notify::Event {
            kind: EventKind::Remove(notify::event::RemoveKind::File),
            paths: vec![PathBuf::from("/r/a.txt")],
            attrs: Default::default(),
        };
        let mapped = map_notify_event(&event);
        assert_eq!(mapped[0].action, FileAction::Deleted);
        assert_eq!(mapped[0].size, None);
    }

    #[test]
    fn map_rename_splits_into_delete_and_create() {
        let event = notify::Event {
            kind: EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            paths: vec![PathBuf::from("/r/old.txt"), PathBuf::from("/r/new.txt")],
            attrs: Default::default(),
        };
        let mapped = map_notify_event(&event);
        assert_eq!(mapped.len(), 2);
        assert_eq!(mapped[0].action, FileAction::Deleted);
        assert_eq!(mapped[0].path, PathBuf::from("/r/old.txt"));
        assert_eq!(mapped[1].action, FileAction::Created);
        assert_eq!(mapped[1].path, PathBuf::from("/r/new.txt"));
    }

    #[test]
    fn map_access_event_is_dropped() {
        let event = notify::Event {
            kind: EventKind::Access(notify::event::AccessKind::Read),
            paths: vec![PathBuf::from("/r/a.txt")],
            attrs: Default::default(),
        };
        assert!(map_notify_event(&event).is_empty());
    }

    #[test]
    fn map_metadata_modify_is_modified() {
        let event = notify::Event {
            kind: EventKind::Modify(ModifyKind::Metadata(
                notify::event::MetadataKind::Permissions,
            )),
            paths: vec![PathBuf::from("/r/a.txt")],
            attrs: Default::default(),
        };
        assert_eq!(map_notify_event(&event)[0].action, FileAction::Modified);
    }

    #[test]
    fn ignore_filter_uses_relative_path() {
        let rules = IgnoreRules::standard();
        let root = Path::new("/home/user/Sync");
        assert!(is_ignored(&rules, root, Path::new("/home/user/Sync/.DS_Store")));
        assert!(is_ignored(
            &rules,
            root,
            Path::new("/home/user/Sync/docs/report.docx.baludesk-part")
        ));
        assert!(!is_ignored(
            &rules,
            root,
            Path::new("/home/user/Sync/docs/report.docx")
        ));
    }

    #[tokio::test]
    async fn start_watch_rejects_missing_path() {
        let (facade, _rx) = WatcherFacade::new(IgnoreRules::standard());
        assert!(facade.start_watch(Path::new("/definitely/not/here")).is_err());
    }

    #[tokio::test]
    async fn start_watch_rejects_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, b"x").unwrap();

        let (facade, _rx) = WatcherFacade::new(IgnoreRules::standard());
        assert!(facade.start_watch(&file).is_err());
    }

    #[tokio::test]
    async fn watch_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let (facade, _rx) = WatcherFacade::new(IgnoreRules::standard());

        facade.start_watch(dir.path()).unwrap();
        assert!(facade.is_watching(dir.path()));

        // Starting twice is a no-op.
        facade.start_watch(dir.path()).unwrap();
        assert_eq!(facade.watched_roots().len(), 1);

        facade.stop_watch(dir.path());
        assert!(!facade.is_watching(dir.path()));

        // Stopping again is idempotent.
        facade.stop_watch(dir.path());
    }

    #[tokio::test]
    async fn stop_all_releases_everything() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let (facade, _rx) = WatcherFacade::new(IgnoreRules::standard());

        facade.start_watch(dir_a.path()).unwrap();
        facade.start_watch(dir_b.path()).unwrap();
        facade.stop_all();

        assert!(facade.watched_roots().is_empty());
    }

    #[tokio::test]
    async fn events_flow_to_the_sink() {
        let dir = tempfile::tempdir().unwrap();
        let (facade, mut rx) = WatcherFacade::new(IgnoreRules::standard());
        facade.start_watch(dir.path()).unwrap();

        std::fs::write(dir.path().join("fresh.txt"), b"hello").unwrap();

        // Backends deliver asynchronously; allow generous slack.
        let msg = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .expect("no event within timeout")
            .expect("channel closed");

        match msg {
            WatchMessage::Event(event) => {
                assert!(event.path.ends_with("fresh.txt"));
            }
            WatchMessage::Lost { reason, .. } => panic!("watch lost: {reason}"),
        }
    }
}
