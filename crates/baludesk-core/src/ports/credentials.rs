//! Credential store port
//!
//! Tokens live in the platform secret service and nowhere else: never in
//! the config file, never in the database, never in logs. The port is
//! synchronous because every backing store (Secret Service, Keychain,
//! Windows Credential Manager) is.

/// Port trait for platform-native token storage, keyed by username
pub trait CredentialStore: Send + Sync {
    /// Stores or replaces the token for `username`
    fn save_token(&self, username: &str, token: &str) -> anyhow::Result<()>;

    /// Loads the token for `username`; `None` when no entry exists
    fn load_token(&self, username: &str) -> anyhow::Result<Option<String>>;

    /// Removes the token for `username`; missing entries are not an error
    fn delete_token(&self, username: &str) -> anyhow::Result<()>;

    /// Whether a token exists for `username`
    fn has_token(&self, username: &str) -> anyhow::Result<bool> {
        Ok(self.load_token(username)?.is_some())
    }
}
