//! Debounced event coalescing
//!
//! Raw watcher events arrive in bursts: an editor save produces a create,
//! several writes, and a rename within milliseconds. The
//! [`DebouncedEventQueue`] holds the latest merged event per path until the
//! path has been quiet for the debounce window, so downstream consumers see
//! one logical event carrying the final observed action.
//!
//! Merging follows the action algebra rather than last-writer-wins:
//! delete-then-create within the window is a `Modified` (the file was
//! replaced), create-then-delete is a `Deleted`, and a modification after a
//! create stays a `Created` (the file is still new to consumers).

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::debug;

/// Window after the last raw event before a path's event settles
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Best-effort classification of a filesystem change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    Created,
    Modified,
    Deleted,
}

/// A coalesced filesystem event for one absolute path
///
/// Actions are best-effort; consumers re-stat before acting on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    /// Absolute path the event refers to
    pub path: PathBuf,
    pub action: FileAction,
    /// When the (latest raw) event was observed
    pub detected_at: DateTime<Utc>,
    /// Size at detection time, when the path could be stat-ed
    pub size: Option<u64>,
}

/// Merges a new raw action into the pending action for the same path
fn merge_actions(pending: FileAction, incoming: FileAction) -> FileAction {
    use FileAction as A;
    match (pending, incoming) {
        (A::Deleted, A::Created) => A::Modified,
        (A::Deleted, A::Modified) => A::Modified,
        (A::Created, A::Deleted) => A::Deleted,
        (A::Created, A::Modified) => A::Created,
        (A::Modified, A::Deleted) => A::Deleted,
        (A::Modified, A::Created) => A::Modified,
        (same, _) => same,
    }
}

/// Queue that coalesces rapid filesystem changes into debounced events
///
/// Every push for a path resets its quiet timer, so a file being actively
/// written keeps extending its window until the writes stop.
pub struct DebouncedEventQueue {
    pending: HashMap<PathBuf, (FileEvent, Instant)>,
    window: Duration,
    /// Pending entries above this count evict the oldest entry on push;
    /// events are compressible, so dropping the stalest is safe
    capacity: usize,
}

impl DebouncedEventQueue {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self::with_capacity(window, 8192)
    }

    #[must_use]
    pub fn with_capacity(window: Duration, capacity: usize) -> Self {
        Self {
            pending: HashMap::new(),
            window,
            capacity,
        }
    }

    /// Inserts or merges an event for its path and resets the quiet timer
    pub fn push(&mut self, event: FileEvent) {
        self.push_at(event, Instant::now());
    }

    fn push_at(&mut self, mut event: FileEvent, now: Instant) {
        if self.pending.len() >= self.capacity && !self.pending.contains_key(&event.path) {
            if let Some(oldest) = self
                .pending
                .iter()
                .min_by_key(|(_, (_, at))| *at)
                .map(|(p, _)| p.clone())
            {
                debug!(dropped = %oldest.display(), "Event queue full, dropping oldest entry");
                self.pending.remove(&oldest);
            }
        }

        if let Some((prev, _)) = self.pending.get(&event.path) {
            event.action = merge_actions(prev.action, event.action);
        }
        self.pending.insert(event.path.clone(), (event, now));
    }

    /// Returns all events whose paths have been quiet for the full window
    ///
    /// Settled events are removed; order between distinct paths is not
    /// specified.
    pub fn poll(&mut self) -> Vec<FileEvent> {
        self.poll_at(Instant::now())
    }

    fn poll_at(&mut self, now: Instant) -> Vec<FileEvent> {
        let window = self.window;
        let settled_paths: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, (_, at))| now.duration_since(*at) >= window)
            .map(|(p, _)| p.clone())
            .collect();

        let mut settled = Vec::with_capacity(settled_paths.len());
        for path in settled_paths {
            if let Some((event, _)) = self.pending.remove(&path) {
                settled.push(event);
            }
        }

        if !settled.is_empty() {
            debug!(count = settled.len(), "Settled debounced events");
        }
        settled
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for DebouncedEventQueue {
    fn default() -> Self {
        Self::new(DEBOUNCE_WINDOW)
    }
}
