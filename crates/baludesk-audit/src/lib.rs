//! BaluDesk Audit - activity-log writing
//!
//! Wraps `StateStore::append_activity` with convenience methods for each
//! auditable operation. All methods are non-fatal: activity persistence
//! failures are logged via `tracing::warn!` but never propagated, so audit
//! trouble can never break a sync pass. Entries are written outside the
//! pass's batch transaction on purpose: a rolled-back pass still leaves its
//! failure entries behind.

pub mod logger;

pub use logger::ActivityLogger;
