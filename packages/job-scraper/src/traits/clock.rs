//! Time source used for rate budgets, backoff and record timestamps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Injectable clock.
///
/// Production code uses [`SystemClock`]; tests use
/// [`MockClock`](crate::testing::MockClock) to run retry and rate-limit
/// logic on virtual time.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Suspend the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Real time backed by tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}
