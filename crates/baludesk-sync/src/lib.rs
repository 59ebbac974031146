//! BaluDesk Sync - watcher, change detection, and reconciliation
//!
//! Provides:
//! - [`WatcherFacade`](watcher::WatcherFacade) - uniform multi-root watching
//!   over the platform backends
//! - [`DebouncedEventQueue`](debounce::DebouncedEventQueue) - 500 ms event
//!   coalescing with action merging
//! - [`ChangeDetector`](scanner::ChangeDetector) - baseline diffing with the
//!   size+mtime fast path and SHA-256 tiebreak
//! - [`SyncEngine`](engine::SyncEngine) - the bidirectional reconcile pass
//! - [`TransferExecutor`](executor::TransferExecutor) - bounded-concurrency
//!   plan execution with retry and integrity checks
//! - [`SyncScheduler`](scheduler::SyncScheduler) - periodic + event-driven
//!   pass scheduling
//! - [`ConflictResolver`](resolver::ConflictResolver) - user-driven conflict
//!   resolution

pub mod debounce;
pub mod engine;
pub mod executor;
pub mod ignore;
pub mod plan;
pub mod resolver;
pub mod scanner;
pub mod scheduler;
pub mod watcher;

pub use debounce::{DebouncedEventQueue, FileAction, FileEvent, DEBOUNCE_WINDOW};
pub use engine::SyncEngine;
pub use executor::TransferExecutor;
pub use ignore::IgnoreRules;
pub use plan::{OpKind, Operation, Plan, PlanBuilder};
pub use resolver::ConflictResolver;
pub use scanner::{ChangeDetector, LocalDiff, LocalEntry};
pub use scheduler::{SchedulerCommand, SchedulerHandle, SyncScheduler};
pub use watcher::{WatchMessage, WatcherFacade};
