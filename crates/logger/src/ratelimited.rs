use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

/// Lets a message through at most `burst` times per `period`, counts
/// what it holds back.
pub struct RateLimited {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>,
    withheld: usize,
}

impl std::fmt::Debug for RateLimited {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimited")
            .field("withheld", &self.withheld)
            .finish_non_exhaustive()
    }
}

impl RateLimited {
    /// # Panics
    /// If `period` is zero
    #[must_use]
    pub fn new(period: Duration, burst: NonZeroU32) -> Self {
        let quota = Quota::with_period(period)
            .expect("period may not be zero")
            .allow_burst(burst);
        Self {
            limiter: RateLimiter::direct(quota),
            withheld: 0,
        }
    }

    /// `Some(n)` if the message may be logged, `n` is the number of
    /// messages withheld since the last one that got through.
    pub fn check(&mut self) -> Option<usize> {
        if self.limiter.check().is_err() {
            self.withheld += 1;
            None
        } else {
            Some(std::mem::take(&mut self.withheld))
        }
    }

    #[must_use]
    pub fn withheld(&self) -> usize {
        self.withheld
    }
}

/// Warn through a [`RateLimited`], mentions how many warnings were
/// dropped before this one.
#[macro_export]
macro_rules! warn {
    ($limiter:expr; $($arg:tt)*) => {
        if let Some(withheld) = $limiter.check() {
            if withheld > 0 {
                tracing::warn!("withheld {withheld} similar warnings");
            }
            tracing::warn!($($arg)*);
        }
    };
}
