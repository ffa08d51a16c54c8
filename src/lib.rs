//! Ratelimit - simple, thread-safe rate limiting
//!
//! This crate implements a leaky-allowance rate limiter: every elapsed
//! nanosecond refills the budget by `rate`, and every admitted event costs
//! one unit length in nanoseconds. The limiter is meant to sit on hot paths
//! of servers, clients and schedulers.
//!
//! ```
//! use std::time::Duration;
//! use ratelimit::RateLimiter;
//!
//! // Allow up to 10 calls per second
//! let rl = RateLimiter::new(10, Duration::from_secs(1));
//!
//! for _ in 0..10 {
//!     assert!(!rl.limit());
//! }
//! assert!(rl.limit());
//! ```

pub mod config;
pub mod error;
pub mod limiter;

pub use limiter::{
    Clock, KeyedPermit, KeyedRateLimiter, Limiter, ManualClock, MonotonicClock, Permit,
    RateLimiter,
};
