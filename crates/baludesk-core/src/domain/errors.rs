//! Domain error types

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Path is not inside the folder it was resolved against
    #[error("Path not within folder root: {0}")]
    PathNotInFolder(String),

    /// Invalid fingerprint format (expected SHA-256 hex)
    #[error("Invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// Unknown enum discriminant read back from storage or config
    #[error("Unknown value for {field}: {value}")]
    UnknownValue {
        /// Which field carried the value
        field: &'static str,
        /// The offending value
        value: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = DomainError::InvalidPath("/bad".to_string());
        assert_eq!(err.to_string(), "Invalid path: /bad");

        let err = DomainError::UnknownValue {
            field: "policy",
            value: "maybe".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown value for policy: maybe");
    }
}
