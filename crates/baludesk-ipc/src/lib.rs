//! BaluDesk IPC - the desktop UI's wire protocol
//!
//! The UI talks to the daemon over a localhost TCP connection carrying
//! line-delimited JSON: each line is either a request
//! (`{"type", "payload", "requestId"?}`), a response to one, or an event
//! broadcast by the core (`{"type": "sync_progress", ...}`).
//!
//! Provides:
//! - [`message`] - request, response, and event wire types
//! - [`service`] - the listener, per-connection dispatch loop, and the
//!   broadcast-backed [`Notifier`](baludesk_core::ports::Notifier)

pub mod message;
pub mod service;

pub use message::{Request, RequestPayload, Response};
pub use service::{BroadcastNotifier, IpcServer};
