//! Limiter trait and checked permits.

use super::clock::Clock;
use super::rate_limiter::RateLimiter;

/// Trait for rate limiter implementations.
///
/// This abstracts over anything that makes allow/deny decisions with the
/// `limit`/`undo` protocol, so callers can accept any limiter and use
/// [`try_acquire`](Limiter::try_acquire) for undo pairing checked by the
/// type system.
pub trait Limiter: Send + Sync {
    /// Check and consume one event. Returns `true` when throttled.
    fn limit(&self) -> bool;

    /// Return one unit of allowance for an earlier successful `limit`.
    fn undo(&self);

    /// Change the allowed rate for future decisions.
    fn update_rate(&self, rate: u64);

    /// Consume one event and hand back a [`Permit`] if it was allowed.
    fn try_acquire(&self) -> Option<Permit<'_, Self>>
    where
        Self: Sized,
    {
        if self.limit() {
            None
        } else {
            Some(Permit { limiter: self })
        }
    }
}

impl<C: Clock> Limiter for RateLimiter<C> {
    fn limit(&self) -> bool {
        RateLimiter::limit(self)
    }

    fn undo(&self) {
        RateLimiter::undo(self)
    }

    fn update_rate(&self, rate: u64) {
        RateLimiter::update_rate(self, rate)
    }
}

/// Proof of one allowed event.
///
/// Dropping the permit keeps the event charged. Calling
/// [`cancel`](Permit::cancel) gives the allowance back; since it consumes
/// the permit, each grant can be undone at most once.
#[must_use = "dropping a permit keeps the event charged; call `cancel` to return it"]
#[derive(Debug)]
pub struct Permit<'a, L> {
    limiter: &'a L,
}

impl<'a, L: Limiter> Permit<'a, L> {
    /// Abort the permitted action and return its allowance.
    pub fn cancel(self) {
        self.limiter.undo();
    }

    /// The limiter that granted this permit.
    pub fn limiter(&self) -> &'a L {
        self.limiter
    }
}
