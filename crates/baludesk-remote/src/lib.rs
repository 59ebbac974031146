//! BaluDesk Remote - BaluHost server adapter
//!
//! Provides:
//! - [`HttpRemoteClient`] - the [`RemoteClient`](baludesk_core::ports::RemoteClient)
//!   implementation over the BaluHost REST API
//! - [`KeyringCredentialStore`] - token storage in the platform secret service

pub mod client;
pub mod credentials;

pub use client::HttpRemoteClient;
pub use credentials::KeyringCredentialStore;
