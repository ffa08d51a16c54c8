//! Rate limiting logic and state management.

mod backend;
mod clock;
mod keyed;
mod rate_limiter;

pub use backend::{Limiter, Permit};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use keyed::{KeyedPermit, KeyedRateLimiter};
pub use rate_limiter::RateLimiter;
