//! Configuration module for BaluDesk.
//!
//! Typed configuration mapping to the JSON configuration file, with loading,
//! per-field defaults, and validation. Unknown keys are ignored so older
//! daemons tolerate config written by newer UIs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::folder::ConflictPolicy;
use crate::ports::remote_client::TransferHints;

/// Bounds applied to `max_concurrent_transfers`
const MIN_CONCURRENT_TRANSFERS: u32 = 1;
const MAX_CONCURRENT_TRANSFERS: u32 = 32;

/// Top-level configuration for the BaluDesk daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the BaluHost server.
    pub server_url: String,
    /// Metadata store location; relative paths resolve against the data dir.
    pub database_path: PathBuf,
    /// Seconds between periodic reconcile ticks.
    pub sync_interval: u64,
    /// Worker-pool size for plan execution (clamped to 1..=32 on load).
    pub max_concurrent_transfers: u32,
    /// Advisory chunk size hint forwarded to the server (MiB).
    pub chunk_size_mb: u32,
    /// Advisory bandwidth cap forwarded to the server (Mbit/s, 0 = unlimited).
    pub bandwidth_limit_mbps: u32,
    /// Default conflict policy applied to newly added folders.
    pub conflict_resolution: ConflictPolicy,
    /// Localhost TCP port the UI connects to.
    pub ipc_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            database_path: PathBuf::from("baludesk.db"),
            sync_interval: 60,
            max_concurrent_transfers: 4,
            chunk_size_mb: 10,
            bandwidth_limit_mbps: 0,
            conflict_resolution: ConflictPolicy::Ask,
            ipc_port: 7600,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file at `path` and validate it.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_json::from_str(&content)?;
        config.validate();
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "Could not load config, using defaults"
                );
                Self::default()
            }
        }
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/baludesk/config.json` on Linux,
    /// `~/Library/Application Support/baludesk/config.json` on macOS,
    /// `%APPDATA%\baludesk\config.json` on Windows.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("baludesk")
            .join("config.json")
    }

    /// Clamps out-of-range values instead of rejecting the file.
    fn validate(&mut self) {
        let clamped = self
            .max_concurrent_transfers
            .clamp(MIN_CONCURRENT_TRANSFERS, MAX_CONCURRENT_TRANSFERS);
        if clamped != self.max_concurrent_transfers {
            tracing::warn!(
                requested = self.max_concurrent_transfers,
                clamped,
                "max_concurrent_transfers out of range"
            );
            self.max_concurrent_transfers = clamped;
        }
        if self.sync_interval == 0 {
            tracing::warn!("sync_interval of 0 replaced with 1");
            self.sync_interval = 1;
        }
    }

    /// Advisory transfer hints handed to the remote client.
    #[must_use]
    pub fn transfer_hints(&self) -> TransferHints {
        TransferHints {
            chunk_size_mb: self.chunk_size_mb,
            bandwidth_limit_mbps: self.bandwidth_limit_mbps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.server_url, "http://localhost:8000");
        assert_eq!(c.database_path, PathBuf::from("baludesk.db"));
        assert_eq!(c.sync_interval, 60);
        assert_eq!(c.max_concurrent_transfers, 4);
        assert_eq!(c.conflict_resolution, ConflictPolicy::Ask);
        assert_eq!(c.ipc_port, 7600);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"sync_interval": 15, "conflict_resolution": "keep_newest"}}"#).unwrap();

        let c = Config::load(file.path()).unwrap();
        assert_eq!(c.sync_interval, 15);
        assert_eq!(c.conflict_resolution, ConflictPolicy::KeepNewest);
        assert_eq!(c.max_concurrent_transfers, 4);
    }

    #[test]
    fn clamps_transfer_concurrency() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_concurrent_transfers": 500}}"#).unwrap();

        let c = Config::load(file.path()).unwrap();
        assert_eq!(c.max_concurrent_transfers, 32);
    }

    #[test]
    fn load_or_default_on_missing_file() {
        let c = Config::load_or_default(Path::new("/nonexistent/config.json"));
        assert_eq!(c.sync_interval, 60);
    }
}
