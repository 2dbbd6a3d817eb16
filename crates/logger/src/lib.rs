pub mod limiter;
pub mod ratelimited;
pub mod tracing;

pub use limiter::Limiter;
pub use ratelimited::RateLimited;
