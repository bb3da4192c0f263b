use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use governor::clock::{Clock as _, DefaultClock};
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

pub const TWELVEDATA_FREE_TIER_PER_MINUTE: u32 = 8;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Shared request quota for one provider account.
///
/// Callers wait for budget up to `max_wait`; beyond that the request is
/// refused with the delay after which budget frees up.
#[derive(Clone)]
pub struct RequestBudget {
    limiter: Arc<DirectRateLimiter>,
    clock: DefaultClock,
    max_wait: Duration,
}

impl RequestBudget {
    pub fn new(quota_window: Duration, quota_limit: u32, max_wait: Duration) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::direct(quota_from_window(
                quota_window,
                quota_limit,
            ))),
            clock: DefaultClock::default(),
            max_wait,
        }
    }

    pub fn per_minute(requests: u32, max_wait: Duration) -> Self {
        Self::new(Duration::from_secs(60), requests, max_wait)
    }

    /// Twelve Data account quota, waiting at most 30 seconds for budget.
    pub fn twelvedata(requests_per_minute: u32) -> Self {
        Self::per_minute(requests_per_minute, Duration::from_secs(30))
    }

    /// Twelve Data free tier: 8 requests per minute.
    pub fn twelvedata_free_tier() -> Self {
        Self::twelvedata(TWELVEDATA_FREE_TIER_PER_MINUTE)
    }

    pub async fn acquire(&self) -> Result<(), Duration> {
        let deadline = Instant::now() + self.max_wait;
        loop {
            let wait = match self.limiter.check() {
                Ok(()) => return Ok(()),
                Err(not_until) => not_until.wait_time_from(self.clock.now()),
            };

            if Instant::now() + wait > deadline {
                return Err(wait);
            }
            tokio::time::sleep(wait).await;
        }
    }
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let safe_limit = NonZeroU32::new(quota_limit).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(safe_limit.get())).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(safe_limit))
        .allow_burst(safe_limit)
}
