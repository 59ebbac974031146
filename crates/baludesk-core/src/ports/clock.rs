//! Clock port
//!
//! The engine needs a wall clock for timestamps embedded in records and a
//! sleep primitive for retry backoff. Both are injected so tests can drive
//! them deterministically instead of waiting out real backoff schedules.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Injected time source
#[async_trait::async_trait]
pub trait Clock: Send + Sync {
    /// Current wall-clock time
    fn now(&self) -> DateTime<Utc>;

    /// Suspends the caller for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Production clock backed by the OS and the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait::async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
