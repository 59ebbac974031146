//! Local change detection
//!
//! Walks a folder tree once and classifies every file against the baseline:
//! `created` (on disk, no baseline row), `modified` (differs from baseline),
//! `unchanged`, and `deleted` (baseline row without a file). The size+mtime
//! comparison is the hot path; SHA-256 is the authoritative tiebreaker and
//! is only computed when the cheap check is inconclusive.
//!
//! Paths that fail to stat or hash are classified `unreadable` and excluded
//! from the diff entirely; reconciliation proceeds with the rest.

use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, instrument, warn};

use baludesk_core::domain::newtypes::{Fingerprint, RelativePath};
use baludesk_core::domain::FileMetadata;
use baludesk_core::ports::Hasher;

use crate::ignore::IgnoreRules;

/// Mtime drift absorbed by the fast path, for filesystems with coarse
/// timestamp granularity (FAT: 2 s)
const MTIME_TOLERANCE_SECS: i64 = 2;

/// One file currently on disk beneath the folder root
#[derive(Debug, Clone)]
pub struct LocalEntry {
    pub path: RelativePath,
    pub size: u64,
    pub modified: DateTime<Utc>,
    /// Set when the detector hashed the file to reach its verdict
    pub fingerprint: Option<Fingerprint>,
}

/// The local diff for one folder
#[derive(Debug, Default)]
pub struct LocalDiff {
    /// On disk, no baseline row
    pub created: Vec<LocalEntry>,
    /// On disk, content differs from the baseline (fingerprint included)
    pub modified: Vec<LocalEntry>,
    /// On disk, identical to the baseline
    pub unchanged: Vec<RelativePath>,
    /// Baseline rows whose path no longer exists
    pub deleted: Vec<FileMetadata>,
    /// Paths that could not be read; excluded from the diff
    pub unreadable: Vec<(RelativePath, String)>,
}

impl LocalDiff {
    /// Total number of paths that need reconciliation attention
    #[must_use]
    pub fn change_count(&self) -> usize {
        self.created.len() + self.modified.len() + self.deleted.len()
    }
}

/// Computes local diffs against the persisted baseline
pub struct ChangeDetector {
    hasher: Arc<dyn Hasher>,
    ignore: IgnoreRules,
}

impl ChangeDetector {
    pub fn new(hasher: Arc<dyn Hasher>, ignore: IgnoreRules) -> Self {
        Self { hasher, ignore }
    }

    /// Walks `root` and classifies every file against `baseline`
    ///
    /// # Errors
    /// Fails only when the root itself cannot be read; per-file errors are
    /// collected into [`LocalDiff::unreadable`].
    #[instrument(skip(self, baseline), fields(root = %root.display()))]
    pub async fn diff(&self, root: &Path, baseline: &[FileMetadata]) -> Result<LocalDiff> {
        let root_meta = tokio::fs::metadata(root)
            .await
            .with_context(|| format!("Cannot scan {}", root.display()))?;
        if !root_meta.is_dir() {
            anyhow::bail!("Cannot scan {}: not a directory", root.display());
        }

        let mut diff = LocalDiff::default();

        let by_path: std::collections::HashMap<&RelativePath, &FileMetadata> =
            baseline.iter().map(|row| (row.relative_path(), row)).collect();
        let mut seen: std::collections::HashSet<RelativePath> = std::collections::HashSet::new();

        // Iterative walk; directories themselves are never synced.
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    self.record_unreadable(&mut diff, root, &dir, &e.to_string());
                    continue;
                }
            };

            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        self.record_unreadable(&mut diff, root, &dir, &e.to_string());
                        break;
                    }
                };

                let name = entry.file_name().to_string_lossy().into_owned();
                if self.ignore.matches_name(&name) {
                    continue;
                }

                let file_type = match entry.file_type().await {
                    Ok(t) => t,
                    Err(e) => {
                        self.record_unreadable(&mut diff, root, &entry.path(), &e.to_string());
                        continue;
                    }
                };

                if file_type.is_dir() {
                    stack.push(entry.path());
                    continue;
                }
                if !file_type.is_file() {
                    // Symlinks and special files are not synced.
                    continue;
                }

                let abs = entry.path();
                let rel = match RelativePath::from_root(root, &abs) {
                    Ok(rel) => rel,
                    Err(e) => {
                        warn!(path = %abs.display(), error = %e, "Skipping unmappable path");
                        continue;
                    }
                };

                let meta = match entry.metadata().await {
                    Ok(meta) => meta,
                    Err(e) => {
                        diff.unreadable.push((rel, e.to_string()));
                        continue;
                    }
                };

                let size = meta.len();
                let modified = meta
                    .modified()
                    .map(system_time_to_utc)
                    .unwrap_or_else(|_| Utc::now());

                seen.insert(rel.clone());

                match by_path.get(&rel) {
                    None => diff.created.push(LocalEntry {
                        path: rel,
                        size,
                        modified,
                        fingerprint: None,
                    }),
                    Some(row) => {
                        self.classify_known(&mut diff, root, row, rel, size, modified)
                            .await;
                    }
                }
            }
        }

        for row in baseline {
            if !seen.contains(row.relative_path()) {
                diff.deleted.push(row.clone());
            }
        }

        debug!(
            created = diff.created.len(),
            modified = diff.modified.len(),
            unchanged = diff.unchanged.len(),
            deleted = diff.deleted.len(),
            unreadable = diff.unreadable.len(),
            "Local diff computed"
        );

        Ok(diff)
    }

    /// Classifies a path that has a baseline row
    async fn classify_known(
        &self,
        diff: &mut LocalDiff,
        root: &Path,
        row: &FileMetadata,
        rel: RelativePath,
        size: u64,
        modified: DateTime<Utc>,
    ) {
        let mtime_close = (modified - row.local_modified()).abs()
            <= Duration::seconds(MTIME_TOLERANCE_SECS);

        if size == row.size() && mtime_close {
            diff.unchanged.push(rel);
            return;
        }

        // Cheap check inconclusive; hash to decide.
        let abs = rel.resolve(root);
        match self.hasher.digest_file(&abs).await {
            Ok(fingerprint) => {
                if &fingerprint == row.fingerprint() {
                    // Touch-only change: same bytes, different mtime.
                    diff.unchanged.push(rel);
                } else {
                    diff.modified.push(LocalEntry {
                        path: rel,
                        size,
                        modified,
                        fingerprint: Some(fingerprint),
                    });
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Raced a deletion between stat and hash.
                diff.deleted.push(row.clone());
            }
            Err(e) => {
                warn!(path = %rel, error = %e, "Could not hash file, excluding from diff");
                diff.unreadable.push((rel, e.to_string()));
            }
        }
    }

    fn record_unreadable(&self, diff: &mut LocalDiff, root: &Path, path: &Path, error: &str) {
        match RelativePath::from_root(root, path) {
            Ok(rel) => {
                warn!(path = %rel, error, "Unreadable path during scan");
                diff.unreadable.push((rel, error.to_string()));
            }
            Err(_) => {
                warn!(path = %path.display(), error, "Unreadable path during scan");
            }
        }
    }
}

fn system_time_to_utc(t: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(t)
}

/// Stat helper used by the engine when it needs a file's current size and
/// mtime outside a full scan (e.g. before an upload)
pub async fn stat_entry(root: &Path, rel: &RelativePath) -> Result<(u64, DateTime<Utc>)> {
    let abs = rel.resolve(root);
    let meta = tokio::fs::metadata(&abs)
        .await
        .with_context(|| format!("Cannot stat {}", abs.display()))?;
    let modified = meta
        .modified()
        .map(system_time_to_utc)
        .unwrap_or_else(|_| Utc::now());
    Ok((meta.len(), modified))
}

#[cfg(test)]
mod tests {
    use super::*;
    use baludesk_core::domain::FolderId;
    use baludesk_core::ports::Sha256Hasher;

    fn detector() -> ChangeDetector {
        ChangeDetector::new(Arc::new(Sha256Hasher), IgnoreRules::standard())
    }

    async fn baseline_row(root: &Path, folder: FolderId, rel: &str, contents: &[u8]) -> FileMetadata {
        let path = RelativePath::new(rel).unwrap();
        let abs = path.resolve(root);
        let meta = tokio::fs::metadata(&abs).await.unwrap();
        let modified = system_time_to_utc(meta.modified().unwrap());
        FileMetadata::new(
            folder,
            path,
            Fingerprint::of_bytes(contents),
            contents.len() as u64,
            modified,
            modified,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn fresh_tree_is_all_created() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), b"hello\n").await.unwrap();
        tokio::fs::create_dir(dir.path().join("sub")).await.unwrap();
        tokio::fs::write(dir.path().join("sub/b.bin"), vec![0u8; 1024])
            .await
            .unwrap();

        let diff = detector().diff(dir.path(), &[]).await.unwrap();

        assert_eq!(diff.created.len(), 2);
        assert!(diff.modified.is_empty());
        assert!(diff.deleted.is_empty());

        let mut paths: Vec<_> = diff.created.iter().map(|e| e.path.as_str()).collect();
        paths.sort();
        assert_eq!(paths, vec!["a.txt", "sub/b.bin"]);
    }

    #[tokio::test]
    async fn unchanged_files_take_the_fast_path() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), b"stable").await.unwrap();

        let folder = FolderId::new();
        let row = baseline_row(dir.path(), folder, "a.txt", b"stable").await;

        let diff = detector().diff(dir.path(), &[row]).await.unwrap();
        assert_eq!(diff.unchanged.len(), 1);
        assert_eq!(diff.change_count(), 0);
    }

    #[tokio::test]
    async fn content_change_is_modified_with_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), b"new contents, longer")
            .await
            .unwrap();

        let folder = FolderId::new();
        // Baseline describes the old contents: different size forces a hash.
        let path = RelativePath::new("a.txt").unwrap();
        let old_time = Utc::now() - Duration::hours(1);
        let row = FileMetadata::new(
            folder,
            path,
            Fingerprint::of_bytes(b"old"),
            3,
            old_time,
            old_time,
            old_time,
        );

        let diff = detector().diff(dir.path(), &[row]).await.unwrap();
        assert_eq!(diff.modified.len(), 1);
        assert_eq!(
            diff.modified[0].fingerprint,
            Some(Fingerprint::of_bytes(b"new contents, longer"))
        );
    }

    #[tokio::test]
    async fn touch_only_change_reconciles_to_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), b"same bytes").await.unwrap();

        let folder = FolderId::new();
        let path = RelativePath::new("a.txt").unwrap();
        // Same contents but an mtime far outside the tolerance.
        let old_time = Utc::now() - Duration::hours(2);
        let row = FileMetadata::new(
            folder,
            path,
            Fingerprint::of_bytes(b"same bytes"),
            10,
            old_time,
            old_time,
            old_time,
        );

        let diff = detector().diff(dir.path(), &[row]).await.unwrap();
        assert_eq!(diff.unchanged.len(), 1);
        assert!(diff.modified.is_empty());
    }

    #[tokio::test]
    async fn missing_baseline_paths_are_deleted() {
        let dir = tempfile::tempdir().unwrap();

        let folder = FolderId::new();
        let t = Utc::now();
        let row = FileMetadata::new(
            folder,
            RelativePath::new("gone.txt").unwrap(),
            Fingerprint::of_bytes(b"x"),
            1,
            t,
            t,
            t,
        );

        let diff = detector().diff(dir.path(), &[row]).await.unwrap();
        assert_eq!(diff.deleted.len(), 1);
        assert_eq!(diff.deleted[0].relative_path().as_str(), "gone.txt");
    }

    #[tokio::test]
    async fn ignored_files_are_invisible() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join(".DS_Store"), b"junk").await.unwrap();
        tokio::fs::write(dir.path().join("real.txt"), b"data").await.unwrap();
        tokio::fs::create_dir(dir.path().join(".baludesk-cache"))
            .await
            .unwrap();
        tokio::fs::write(dir.path().join(".baludesk-cache/blob"), b"cached")
            .await
            .unwrap();

        let diff = detector().diff(dir.path(), &[]).await.unwrap();
        assert_eq!(diff.created.len(), 1);
        assert_eq!(diff.created[0].path.as_str(), "real.txt");
    }

    #[tokio::test]
    async fn empty_file_is_tracked() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("empty"), b"").await.unwrap();

        let diff = detector().diff(dir.path(), &[]).await.unwrap();
        assert_eq!(diff.created.len(), 1);
        assert_eq!(diff.created[0].size, 0);
    }

    #[tokio::test]
    async fn missing_root_is_an_error() {
        assert!(detector().diff(Path::new("/no/such/root"), &[]).await.is_err());
    }
}
