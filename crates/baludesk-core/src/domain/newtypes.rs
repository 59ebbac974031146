//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for domain identifiers and values. Each newtype
//! ensures data validity at construction time so that the rest of the core
//! never has to re-check invariants.

use std::fmt::{self, Display, Formatter};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// UUID-based ID types
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID value
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| DomainError::InvalidId(format!(concat!("Invalid ", $label, ": {}"), e)))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_id!(
    /// Identifier for a configured [`SyncFolder`](super::folder::SyncFolder)
    FolderId,
    "FolderId"
);

uuid_id!(
    /// Identifier for a [`FileMetadata`](super::file_meta::FileMetadata) baseline row
    FileId,
    "FileId"
);

uuid_id!(
    /// Identifier for a [`Conflict`](super::conflict::Conflict) record
    ConflictId,
    "ConflictId"
);

uuid_id!(
    /// Identifier for an [`ActivityEntry`](super::activity::ActivityEntry)
    ActivityId,
    "ActivityId"
);

// ============================================================================
// RelativePath
// ============================================================================

/// A file path relative to a sync folder root, forward-slash normalized
///
/// Invariants enforced at construction:
/// - non-empty
/// - no leading slash (the path is always relative)
/// - no empty, `.` or `..` segments
/// - backslashes are normalized to forward slashes, so the same value
///   compares equal regardless of the platform that produced it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelativePath(String);

impl RelativePath {
    /// Creates a validated relative path from a string-like value
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidPath`] for empty, absolute, or
    /// traversing (`..`) paths.
    pub fn new(path: impl Into<String>) -> Result<Self, DomainError> {
        let normalized = path.into().replace('\\', "/");

        if normalized.is_empty() {
            return Err(DomainError::InvalidPath("empty relative path".to_string()));
        }
        if normalized.starts_with('/') {
            return Err(DomainError::InvalidPath(format!(
                "relative path must not be absolute: {normalized}"
            )));
        }
        for segment in normalized.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(DomainError::InvalidPath(format!(
                    "invalid path segment in: {normalized}"
                )));
            }
        }

        Ok(Self(normalized))
    }

    /// Derives the relative path of `path` beneath `root`
    ///
    /// # Errors
    /// Returns [`DomainError::PathNotInFolder`] when `path` does not live
    /// under `root`.
    pub fn from_root(root: &Path, path: &Path) -> Result<Self, DomainError> {
        let stripped = path.strip_prefix(root).map_err(|_| {
            DomainError::PathNotInFolder(format!(
                "{} is not under {}",
                path.display(),
                root.display()
            ))
        })?;

        let mut parts = Vec::new();
        for component in stripped.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => {
                    return Err(DomainError::InvalidPath(format!(
                        "unsupported component in {}",
                        stripped.display()
                    )))
                }
            }
        }

        Self::new(parts.join("/"))
    }

    /// Returns the path as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final path segment (the file or directory name)
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Parent path, if any
    #[must_use]
    pub fn parent(&self) -> Option<RelativePath> {
        self.0.rsplit_once('/').map(|(head, _)| Self(head.to_string()))
    }

    /// Joins this path onto an absolute folder root, using platform separators
    #[must_use]
    pub fn resolve(&self, root: &Path) -> PathBuf {
        let mut out = root.to_path_buf();
        for segment in self.0.split('/') {
            out.push(segment);
        }
        out
    }

    /// Number of `/`-separated segments
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.split('/').count()
    }
}

impl Display for RelativePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for RelativePath {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RelativePath> for String {
    fn from(value: RelativePath) -> Self {
        value.0
    }
}

impl FromStr for RelativePath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// ============================================================================
// Fingerprint
// ============================================================================

/// SHA-256 content fingerprint, stored as 64 lowercase hex characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Validates and wraps a hex digest string
    ///
    /// Uppercase input is accepted and normalized to lowercase.
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidFingerprint`] unless the input is
    /// exactly 64 hex characters.
    pub fn new(hex_digest: impl Into<String>) -> Result<Self, DomainError> {
        let digest = hex_digest.into().to_ascii_lowercase();
        if digest.len() != 64 || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(DomainError::InvalidFingerprint(format!(
                "expected 64 hex characters, got {:?}",
                digest
            )));
        }
        Ok(Self(digest))
    }

    /// Computes the fingerprint of a byte slice
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    /// Returns the hex digest as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.0
    }
}

impl FromStr for Fingerprint {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
