//! Keyed minimum-interval rate limiting.
//!
//! Each key may pass once per interval. A rejected call reports how long
//! the caller has to wait. Backed by governor's GCRA with a burst of one,
//! which admits exactly one cell per period.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::middleware::NoOpMiddleware;
use governor::state::keyed::HashMapStateStore;
use governor::Quota;

type KeyedLimiter<C> =
    governor::RateLimiter<String, HashMapStateStore<String>, C, NoOpMiddleware<<C as Clock>::Instant>>;

/// A per-key gate enforcing a minimum interval between passing calls.
pub struct RateLimiter<C: Clock = DefaultClock> {
    interval: Duration,
    clock: C,
    /// `None` when the interval is zero; every call passes.
    limiter: Option<KeyedLimiter<C>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self::with_clock(interval, DefaultClock::default())
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Build a limiter driven by `clock`. Tests pass a
    /// [`governor::clock::FakeRelativeClock`].
    pub fn with_clock(interval: Duration, clock: C) -> Self {
        let limiter = Quota::with_period(interval)
            .map(|quota| KeyedLimiter::hashmap_with_clock(quota.allow_burst(NonZeroU32::MIN), &clock));
        Self {
            interval,
            clock,
            limiter,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Let `key` through, or return the time left until it may pass again.
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        let Some(limiter) = &self.limiter else {
            return Ok(());
        };
        limiter
            .check_key(&key.to_string())
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }

    /// Drop state for keys whose interval has elapsed.
    pub fn prune(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.retain_recent();
        }
    }
}

impl<C: Clock> std::fmt::Debug for RateLimiter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

/// Whole seconds to advertise in a `Retry-After` header (rounded up, at least 1).
pub fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}
