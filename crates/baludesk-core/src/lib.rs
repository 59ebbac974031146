//! BaluDesk Core - Domain model and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `SyncFolder`, `FileMetadata`, `Conflict`, `SyncState`, `ActivityEntry`
//! - **Port definitions** - Traits for adapters: `RemoteClient`, `StateStore`, `Notifier`,
//!   `Clock`, `Hasher`, `CredentialStore`
//! - **Configuration** - Typed JSON configuration with defaults and validation
//!
//! # Architecture
//!
//! The domain module contains pure business logic with no I/O. Ports define
//! trait interfaces that adapter crates implement (`baludesk-store`,
//! `baludesk-remote`, `baludesk-ipc`). The sync engine in `baludesk-sync`
//! orchestrates domain entities exclusively through these ports.

pub mod config;
pub mod domain;
pub mod ports;
