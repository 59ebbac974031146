//! Notifier port (driving/primary port)
//!
//! The engine reports progress and failures through this port; the IPC
//! layer implements it by broadcasting the events to connected UI clients.

use serde::{Deserialize, Serialize};

use crate::domain::{ActivityKind, ConflictKind, FolderId, RelativePath};

/// Per-pass operation counters included in `sync_completed`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounts {
    pub uploaded: u32,
    pub downloaded: u32,
    pub deleted: u32,
    pub conflicts: u32,
    pub errors: u32,
}

/// Events the core emits toward the UI
///
/// Serialized as the line-delimited JSON broadcast messages of the IPC
/// protocol; the `type` tag matches the wire names exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A reconcile pass began for a folder
    SyncStarted { folder: FolderId },
    /// One operation of the pass made progress
    SyncProgress {
        folder: FolderId,
        path: RelativePath,
        op: ActivityKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        bytes: Option<u64>,
    },
    /// A reconcile pass finished
    SyncCompleted { folder: FolderId, counts: SyncCounts },
    /// Reconciliation recorded a conflict for the user to resolve
    ConflictDetected {
        folder: FolderId,
        path: RelativePath,
        kind: ConflictKind,
    },
    /// A user-visible failure; `message` is short and free of secrets
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        folder: Option<FolderId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<RelativePath>,
        message: String,
    },
}

/// Port trait for emitting engine events
///
/// Implementations must not block: the engine calls this from hot paths
/// and from executor workers.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: EngineEvent);
}

/// Notifier that discards every event; used in tests and headless runs
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: EngineEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_wire_format() {
        let event = EngineEvent::ConflictDetected {
            folder: FolderId::new(),
            path: RelativePath::new("a.txt").unwrap(),
            kind: ConflictKind::BothModified,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "conflict_detected");
        assert_eq!(json["kind"], "both_modified");
        assert_eq!(json["path"], "a.txt");
    }

    #[test]
    fn error_event_omits_empty_fields() {
        let event = EngineEvent::Error {
            folder: None,
            path: None,
            message: "remote unreachable".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("folder").is_none());
        assert!(json.get("path").is_none());
    }
}
