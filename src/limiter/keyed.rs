//! Per-key rate limiting.

use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

use super::clock::{Clock, MonotonicClock};
use super::rate_limiter::RateLimiter;

/// A set of independent rate limiters, one per key.
///
/// Every key gets the same rate and unit. A key's limiter is created with its
/// full burst on first use, so an unknown key behaves like a fresh
/// [`RateLimiter`]. Keys are not evicted automatically; call
/// [`retain_active`](Self::retain_active) periodically when key cardinality
/// is unbounded.
pub struct KeyedRateLimiter<K, C = MonotonicClock> {
    limiters: DashMap<K, RateLimiter<C>>,
    /// Rate applied to newly created limiters
    rate: AtomicU64,
    per: Duration,
    clock: C,
}

impl<K: Eq + Hash + Clone> KeyedRateLimiter<K> {
    /// Create a keyed limiter allowing `rate` calls per `per` for each key.
    pub fn new(rate: u64, per: Duration) -> Self {
        Self::with_clock(rate, per, MonotonicClock::new())
    }
}

impl<K: Eq + Hash + Clone, C: Clock + Clone> KeyedRateLimiter<K, C> {
    /// Create a keyed limiter whose per-key limiters share `clock`.
    pub fn with_clock(rate: u64, per: Duration, clock: C) -> Self {
        Self {
            limiters: DashMap::new(),
            rate: AtomicU64::new(rate),
            per,
            clock,
        }
    }

    /// Check and consume one event for `key`. Returns `true` when throttled.
    pub fn limit(&self, key: &K) -> bool {
        if let Some(limiter) = self.limiters.get(key) {
            return limiter.limit();
        }

        self.limiters
            .entry(key.clone())
            .or_insert_with(|| self.new_limiter())
            .limit()
    }

    /// Return one unit of allowance to `key`.
    ///
    /// The same pairing contract as [`RateLimiter::undo`] applies. Unknown
    /// keys are ignored.
    pub fn undo(&self, key: &K) {
        if let Some(limiter) = self.limiters.get(key) {
            limiter.undo();
        }
    }

    /// Consume one event for `key` and return a permit if it was allowed.
    pub fn try_acquire(&self, key: &K) -> Option<KeyedPermit<'_, K, C>> {
        if self.limit(key) {
            None
        } else {
            Some(KeyedPermit {
                limiter: self,
                key: key.clone(),
            })
        }
    }

    /// Change the rate for every existing and future key.
    pub fn update_rate(&self, rate: u64) {
        self.rate.store(rate, Ordering::SeqCst);
        for limiter in self.limiters.iter() {
            limiter.value().update_rate(rate);
        }
    }

    /// Forget the limiter for `key`. Returns whether it existed.
    pub fn remove(&self, key: &K) -> bool {
        self.limiters.remove(key).is_some()
    }

    /// Drop limiters that have been idle for at least `idle` and are back at
    /// full burst. Dropping them changes nothing observable, since a
    /// recreated limiter starts full as well.
    pub fn retain_active(&self, idle: Duration) -> usize {
        let before = self.limiters.len();
        self.limiters.retain(|_, limiter| !limiter.is_idle(idle));
        let removed = before.saturating_sub(self.limiters.len());
        if removed > 0 {
            debug!(removed = removed, "Evicted idle rate limiters");
        }
        removed
    }

    /// Forget all keys.
    pub fn clear(&self) {
        self.limiters.clear();
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    /// Whether no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }

    fn new_limiter(&self) -> RateLimiter<C> {
        debug!("Creating rate limiter for new key");
        RateLimiter::with_clock(
            self.rate.load(Ordering::SeqCst),
            self.per,
            self.clock.clone(),
        )
    }
}

impl<K: Eq + Hash, C> fmt::Debug for KeyedRateLimiter<K, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedRateLimiter")
            .field("keys", &self.limiters.len())
            .field("rate", &self.rate.load(Ordering::SeqCst))
            .field("per", &self.per)
            .finish()
    }
}

/// Proof of one allowed event for a key.
///
/// Works like [`Permit`](super::Permit): dropping keeps the charge,
/// [`cancel`](KeyedPermit::cancel) returns it.
#[must_use = "dropping a permit keeps the event charged; call `cancel` to return it"]
pub struct KeyedPermit<'a, K, C> {
    limiter: &'a KeyedRateLimiter<K, C>,
    key: K,
}

impl<K: Eq + Hash + fmt::Debug, C> fmt::Debug for KeyedPermit<'_, K, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedPermit")
            .field("limiter", &self.limiter)
            .field("key", &self.key)
            .finish()
    }
}

impl<'a, K: Eq + Hash + Clone, C: Clock + Clone> KeyedPermit<'a, K, C> {
    /// Abort the permitted action and return its allowance.
    pub fn cancel(self) {
        self.limiter.undo(&self.key);
    }

    /// The key this permit was granted for.
    pub fn key(&self) -> &K {
        &self.key
    }
}
