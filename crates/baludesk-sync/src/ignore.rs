//! Ignore rules for watcher events and tree scans
//!
//! Filters out paths the engine must never sync or react to: the agent's
//! own bookkeeping files, partial-transfer temp files, OS metadata litter,
//! and editor droppings. Applied in two places with the same rule set: the
//! watcher facade (before events reach the queue) and the change detector
//! (during the tree walk), so both views of the filesystem agree.

use glob::Pattern;

use baludesk_core::domain::newtypes::RelativePath;

/// Name patterns ignored by default, matched against individual path segments
const DEFAULT_PATTERNS: &[&str] = &[
    // Our own files
    ".baludesk*",
    "*.baludesk-part",
    // Partial transfers by other tools
    "*.tmp",
    "*.part",
    "*.crdownload",
    // OS metadata
    ".DS_Store",
    "._*",
    "Thumbs.db",
    "desktop.ini",
    // Editor leftovers
    "*~",
    "*.swp",
    "*.swx",
];

/// Compiled ignore rules
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    patterns: Vec<Pattern>,
}

impl IgnoreRules {
    /// The built-in rule set
    #[must_use]
    pub fn standard() -> Self {
        Self::with_extra(&[])
    }

    /// The built-in rule set plus folder-specific additions
    ///
    /// Invalid patterns are logged and skipped rather than rejected.
    #[must_use]
    pub fn with_extra(extra: &[String]) -> Self {
        let patterns = DEFAULT_PATTERNS
            .iter()
            .copied()
            .map(String::from)
            .chain(extra.iter().cloned())
            .filter_map(|raw| match Pattern::new(&raw) {
                Ok(p) => Some(p),
                Err(e) => {
                    tracing::warn!(pattern = %raw, error = %e, "Skipping invalid ignore pattern");
                    None
                }
            })
            .collect();

        Self { patterns }
    }

    /// Whether a single path segment (file or directory name) is ignored
    #[must_use]
    pub fn matches_name(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(name))
    }

    /// Whether any segment of a relative path is ignored
    #[must_use]
    pub fn matches_path(&self, path: &RelativePath) -> bool {
        path.as_str().split('/').any(|seg| self.matches_name(seg))
    }
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self::standard()
    }
}
