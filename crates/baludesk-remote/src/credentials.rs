//! Token storage in the platform secret service
//!
//! Uses the `keyring` crate: GNOME Keyring / KWallet on Linux, Keychain on
//! macOS, Credential Manager on Windows. Tokens are stored under the
//! "baludesk" service keyed by username and never touch disk or logs.

use anyhow::Context;
use tracing::debug;

use baludesk_core::ports::CredentialStore;

/// Keyring service name shared by all BaluDesk entries
const KEYRING_SERVICE: &str = "baludesk";

/// [`CredentialStore`] backed by the OS secret service
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyringCredentialStore;

impl KeyringCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn entry(username: &str) -> anyhow::Result<keyring::Entry> {
        keyring::Entry::new(KEYRING_SERVICE, username).context("Failed to create keyring entry")
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn save_token(&self, username: &str, token: &str) -> anyhow::Result<()> {
        Self::entry(username)?
            .set_password(token)
            .context("Failed to store token in keyring")?;
        debug!(username, "Stored token in keyring");
        Ok(())
    }

    fn load_token(&self, username: &str) -> anyhow::Result<Option<String>> {
        match Self::entry(username)?.get_password() {
            Ok(token) => {
                debug!(username, "Loaded token from keyring");
                Ok(Some(token))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(anyhow::Error::new(e).context("Failed to read from keyring")),
        }
    }

    fn delete_token(&self, username: &str) -> anyhow::Result<()> {
        match Self::entry(username)?.delete_credential() {
            Ok(()) => {
                debug!(username, "Cleared token from keyring");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(anyhow::Error::new(e).context("Failed to delete from keyring")),
        }
    }
}
