//! Drops log events once one callsite, or the program as a whole, logs
//! more than its quota. Keeps a sensor stuck in an error loop from
//! flooding the journal.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, DefaultKeyedRateLimiter, Quota, RateLimiter};
use tracing::{Event, Metadata, Subscriber};
use tracing_core::callsite;
use tracing_core::Interest;
use tracing_subscriber::layer::{Context, Filter};

pub struct Limiter {
    global: DefaultDirectRateLimiter,
    per_callsite: DefaultKeyedRateLimiter<callsite::Identifier>,
    withheld: AtomicUsize,
}

impl std::fmt::Debug for Limiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Limiter")
            .field("withheld", &self.withheld)
            .finish_non_exhaustive()
    }
}

fn quota(period: Duration, burst: NonZeroU32) -> Quota {
    Quota::with_period(period)
        .expect("period may not be zero")
        .allow_burst(burst)
}

impl Default for Limiter {
    /// At most 20 events a second, a single callsite may burst 10 then
    /// gets one every 5 seconds.
    fn default() -> Self {
        const TWENTY: NonZeroU32 = NonZeroU32::new(20).unwrap();
        const TEN: NonZeroU32 = NonZeroU32::new(10).unwrap();
        Self {
            global: RateLimiter::direct(quota(Duration::from_millis(50), TWENTY)),
            per_callsite: RateLimiter::keyed(quota(Duration::from_secs(5), TEN)),
            withheld: AtomicUsize::new(0),
        }
    }
}

impl Limiter {
    /// # Panics
    /// If `period` is zero
    #[must_use]
    pub fn with_global(mut self, period: Duration, burst: NonZeroU32) -> Self {
        self.global = RateLimiter::direct(quota(period, burst));
        self
    }

    /// # Panics
    /// If `period` is zero
    #[must_use]
    pub fn with_callsite(mut self, period: Duration, burst: NonZeroU32) -> Self {
        self.per_callsite = RateLimiter::keyed(quota(period, burst));
        self
    }
}

impl<S: Subscriber> Filter<S> for Limiter {
    fn enabled(&self, _: &Metadata<'_>, _: &Context<'_, S>) -> bool {
        // spans always pass, only events are limited
        true
    }

    fn event_enabled(&self, event: &Event<'_>, _: &Context<'_, S>) -> bool {
        let callsite = event.metadata().callsite();
        if self.per_callsite.check_key(&callsite).is_err() || self.global.check().is_err() {
            self.withheld.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let withheld = self.withheld.swap(0, Ordering::Relaxed);
        if withheld > 0 {
            // not through tracing, that would recurse into this filter
            eprintln!("logging is rate limited, withheld {withheld} messages");
        }
        true
    }

    fn callsite_enabled(&self, _: &'static Metadata<'static>) -> Interest {
        Interest::sometimes()
    }
}
