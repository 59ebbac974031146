//! Reconciliation plan
//!
//! A [`Plan`] is the ordered list of file operations one reconcile pass
//! produces. Ordering rules:
//!
//! 1. Deletions run before creations, so a path that changed type is
//!    deleted on one side before the replacement lands.
//! 2. Within a phase, operations sort parents-first (path depth, then
//!    lexicographic), so directory creation implied by an upload happens
//!    before files beneath it.
//! 3. A (kind, path) pair is only ever emitted once, however many diff
//!    entries mentioned it.
//!
//! The executor relies on the phase split for same-path exclusion: delete
//! operations all complete before any transfer begins, and transfer paths
//! are unique, so no two workers ever touch the same relative path.

use chrono::{DateTime, Utc};

use baludesk_core::domain::newtypes::{Fingerprint, RelativePath};

/// What a single plan operation does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Upload,
    Download,
    RemoteDelete,
    LocalDelete,
}

impl OpKind {
    /// Deletions form the first execution phase
    #[must_use]
    pub fn is_delete(&self) -> bool {
        matches!(self, OpKind::RemoteDelete | OpKind::LocalDelete)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Upload => "upload",
            OpKind::Download => "download",
            OpKind::RemoteDelete => "remote_delete",
            OpKind::LocalDelete => "local_delete",
        }
    }
}

/// One scheduled file operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub kind: OpKind,
    pub path: RelativePath,
    /// Expected transfer size, when known (progress reporting)
    pub size: Option<u64>,
    /// Fingerprint the remote reported; downloads verify against it
    pub remote_fingerprint: Option<Fingerprint>,
    /// Remote mtime reported with the change, for the baseline row
    pub remote_modified: Option<DateTime<Utc>>,
}

impl Operation {
    #[must_use]
    pub fn new(kind: OpKind, path: RelativePath) -> Self {
        Self {
            kind,
            path,
            size: None,
            remote_fingerprint: None,
            remote_modified: None,
        }
    }

    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    #[must_use]
    pub fn with_remote_fingerprint(mut self, fingerprint: Option<Fingerprint>) -> Self {
        self.remote_fingerprint = fingerprint;
        self
    }

    #[must_use]
    pub fn with_remote_modified(mut self, modified: Option<DateTime<Utc>>) -> Self {
        self.remote_modified = modified;
        self
    }
}

/// Ordered operation list for one reconcile pass
#[derive(Debug, Default, Clone)]
pub struct Plan {
    deletes: Vec<Operation>,
    transfers: Vec<Operation>,
}

impl Plan {
    /// First phase: local and remote deletions
    #[must_use]
    pub fn deletes(&self) -> &[Operation] {
        &self.deletes
    }

    /// Second phase: uploads and downloads
    #[must_use]
    pub fn transfers(&self) -> &[Operation] {
        &self.transfers
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.deletes.len() + self.transfers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.transfers.is_empty()
    }

    /// All operations in execution order
    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.deletes.iter().chain(self.transfers.iter())
    }
}

/// Accumulates operations and produces an ordered, deduplicated [`Plan`]
#[derive(Debug, Default)]
pub struct PlanBuilder {
    ops: Vec<Operation>,
}

impl PlanBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: Operation) {
        self.ops.push(op);
    }

    #[must_use]
    pub fn build(mut self) -> Plan {
        // Stable sort by (phase, depth, path); duplicates collapse after.
        self.ops.sort_by(|a, b| {
            let phase_a = !a.kind.is_delete() as u8;
            let phase_b = !b.kind.is_delete() as u8;
            phase_a
                .cmp(&phase_b)
                .then_with(|| a.path.depth().cmp(&b.path.depth()))
                .then_with(|| a.path.as_str().len().cmp(&b.path.as_str().len()))
                .then_with(|| a.path.cmp(&b.path))
        });

        let mut seen = std::collections::HashSet::new();
        let mut plan = Plan::default();
        for op in self.ops {
            if !seen.insert((op.kind, op.path.clone())) {
                continue;
            }
            if op.kind.is_delete() {
                plan.deletes.push(op);
            } else {
                plan.transfers.push(op);
            }
        }
        plan
    }
}
