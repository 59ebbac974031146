//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the sync core depends on; implementations live
//! in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`RemoteClient`] - remote file service (list/upload/download/delete/changes)
//! - [`StateStore`] - persistent folders, baseline, conflicts, sync state, activity
//! - [`Notifier`] - progress and error events toward the UI
//! - [`Clock`] - injected wall clock and backoff sleeps
//! - [`Hasher`] - SHA-256 content fingerprints
//! - [`CredentialStore`] - platform secret-service token storage

pub mod clock;
pub mod credentials;
pub mod hasher;
pub mod notifier;
pub mod remote_client;
pub mod state_store;

pub use clock::{Clock, SystemClock};
pub use credentials::CredentialStore;
pub use hasher::{Hasher, Sha256Hasher};
pub use notifier::{EngineEvent, Notifier, NullNotifier, SyncCounts};
pub use remote_client::{
    RemoteChange, RemoteChangeKind, RemoteClient, RemoteError, RemoteFile, TransferHints,
    TransferReceipt,
};
pub use state_store::{StateStore, StoreBatch, StoreMutation};
