//! Per-host request spacing shared by every worker.
//!
//! Spacing is a keyed governor limiter (one cell per `spacing`, burst of one)
//! driven by the injectable [`Clock`]. Throttle cooldowns sit on top of it:
//! while a host is cooling down no cell is handed out at all.

use chrono::{DateTime, Utc};
use governor::clock::Clock as GovernorClock;
use governor::middleware::NoOpMiddleware;
use governor::nanos::Nanos;
use governor::state::keyed::HashMapStateStore;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::traits::clock::Clock;

type HostLimiter = RateLimiter<String, HashMapStateStore<String>, BudgetClock, NoOpMiddleware<Nanos>>;

/// Governor clock reading nanoseconds elapsed on our [`Clock`].
#[derive(Clone)]
struct BudgetClock {
    clock: Arc<dyn Clock>,
    origin: DateTime<Utc>,
}

impl GovernorClock for BudgetClock {
    type Instant = Nanos;

    fn now(&self) -> Nanos {
        let elapsed = (self.clock.now() - self.origin).to_std().unwrap_or_default();
        Nanos::from(elapsed)
    }
}

/// Rate budget keyed by upstream host.
///
/// Callers loop on [`acquire`](Self::acquire) until it returns zero, sleeping
/// for the returned duration in between. A zero result means a slot was
/// claimed and the request may go out immediately.
pub struct RateBudget {
    spacing: Duration,
    clock: Arc<dyn Clock>,
    limiter: HostLimiter,
    limiter_clock: BudgetClock,
    cooldowns: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl RateBudget {
    pub fn new(spacing: Duration, clock: Arc<dyn Clock>) -> Self {
        let limiter_clock = BudgetClock {
            clock: clock.clone(),
            origin: clock.now(),
        };
        // Zero spacing: effectively unlimited
        let quota = Quota::with_period(spacing).unwrap_or_else(|| Quota::per_second(nonzero!(1_000_000u32)));

        Self {
            spacing,
            clock,
            limiter: RateLimiter::hashmap_with_clock(quota, limiter_clock.clone()),
            limiter_clock,
            cooldowns: Mutex::new(HashMap::new()),
        }
    }

    pub fn spacing(&self) -> Duration {
        self.spacing
    }

    /// Try to claim a slot for `host`.
    ///
    /// Returns `Duration::ZERO` when the slot was claimed, otherwise how long
    /// to wait before asking again. A cooldown set by [`defer`](Self::defer)
    /// is checked on every call, so it also holds back workers that were
    /// already waiting when it was set.
    pub async fn acquire(&self, host: &str) -> Duration {
        let mut cooldowns = self.cooldowns.lock().await;
        let now = self.clock.now();

        if let Some(until) = cooldowns.get(host).copied() {
            if until > now {
                return (until - now).to_std().unwrap_or_default();
            }
            cooldowns.remove(host);
        }

        match self.limiter.check_key(&host.to_string()) {
            Ok(()) => Duration::ZERO,
            Err(not_until) => not_until.wait_time_from(self.limiter_clock.now()),
        }
    }

    /// Hold every request to `host` back until at least `now + cooldown`.
    ///
    /// Used on throttle signals so every worker slows down, not only the one
    /// that was throttled. An existing longer cooldown is kept.
    pub async fn defer(&self, host: &str, cooldown: Duration) {
        let mut cooldowns = self.cooldowns.lock().await;
        let until = self.clock.now() + to_chrono(cooldown);

        let entry = cooldowns.entry(host.to_string()).or_insert(until);
        if *entry < until {
            *entry = until;
        }
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockClock;

    const HOST: &str = "example.com";

    fn budget(clock: &Arc<MockClock>) -> RateBudget {
        RateBudget::new(Duration::from_secs(5), clock.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_acquire_is_immediate() {
        let clock = Arc::new(MockClock::new());
        let budget = budget(&clock);

        assert_eq!(budget.acquire(HOST).await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquires_are_spaced() {
        let clock = Arc::new(MockClock::new());
        let budget = budget(&clock);

        budget.acquire(HOST).await;
        let wait = budget.acquire(HOST).await;
        assert_eq!(wait, Duration::from_secs(5));

        // Asking again without waiting claims nothing
        assert_eq!(budget.acquire(HOST).await, Duration::from_secs(5));

        clock.sleep(wait).await;
        assert_eq!(budget.acquire(HOST).await, Duration::ZERO);
        assert_eq!(budget.acquire(HOST).await, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hosts_are_independent() {
        let clock = Arc::new(MockClock::new());
        let budget = budget(&clock);

        budget.acquire("a.example").await;
        assert_eq!(budget.acquire("b.example").await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_spacing_never_waits() {
        let clock = Arc::new(MockClock::new());
        let budget = RateBudget::new(Duration::ZERO, clock);

        for _ in 0..10 {
            assert_eq!(budget.acquire(HOST).await, Duration::ZERO);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_defer_holds_host_until_cooldown_ends() {
        let clock = Arc::new(MockClock::new());
        let budget = budget(&clock);

        budget.acquire(HOST).await;
        budget.defer(HOST, Duration::from_secs(30)).await;
        assert_eq!(budget.acquire(HOST).await, Duration::from_secs(30));

        clock.advance(Duration::from_secs(30));
        assert_eq!(budget.acquire(HOST).await, Duration::ZERO);
        // Spacing applies again after the cooldown
        assert_eq!(budget.acquire(HOST).await, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_defer_never_shortens() {
        let clock = Arc::new(MockClock::new());
        let budget = budget(&clock);

        budget.defer(HOST, Duration::from_secs(60)).await;
        budget.defer(HOST, Duration::from_secs(10)).await;
        assert_eq!(budget.acquire(HOST).await, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_reaches_workers_already_waiting() {
        let clock = Arc::new(MockClock::new());
        let budget = budget(&clock);

        budget.acquire(HOST).await;
        // A second worker is told to come back in 5s
        assert_eq!(budget.acquire(HOST).await, Duration::from_secs(5));

        // The first worker gets throttled meanwhile
        budget.defer(HOST, Duration::from_secs(15)).await;

        clock.advance(Duration::from_secs(5));
        assert_eq!(budget.acquire(HOST).await, Duration::from_secs(10));

        clock.advance(Duration::from_secs(10));
        assert_eq!(budget.acquire(HOST).await, Duration::ZERO);
    }
}
