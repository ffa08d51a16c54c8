//! Core rate limiter implementation.

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::clock::{duration_to_nanos, Clock, MonotonicClock};

/// Unit used when a zero duration is requested.
const DEFAULT_UNIT: Duration = Duration::from_secs(1);

/// Mutable limiter state, always accessed under one lock.
#[derive(Debug)]
struct State {
    /// Events permitted per unit
    rate: u64,
    /// Spendable budget, in nanosecond-scaled units
    allowance: u64,
    /// Ceiling on `allowance`, always `rate * unit`
    max: u64,
    /// Timestamp of the last refill
    last_check: u64,
}

/// A thread-safe leaky-allowance rate limiter.
///
/// Every elapsed nanosecond adds `rate` to the allowance and every admitted
/// event costs one unit length in nanoseconds, so the burst capacity is
/// exactly `rate` events and the sustained throughput is `rate` events per
/// unit. A new limiter starts with its full burst available.
///
/// All operations take a single short-lived lock and never block otherwise,
/// so the limiter can be shared freely (e.g. behind an `Arc`) and called from
/// hot paths.
///
/// # Undo contract
///
/// [`undo`](Self::undo) returns one unit of allowance unconditionally. Callers
/// must pair each `undo` with exactly one earlier `limit` call that returned
/// `false`. Calling it after a denial, without a prior call, or twice for the
/// same grant over-credits the limiter (bounded only by the burst ceiling) and
/// is not detected. [`Limiter::try_acquire`](super::Limiter::try_acquire)
/// offers a checked alternative.
pub struct RateLimiter<C = MonotonicClock> {
    /// Cost of one event: the unit length in nanoseconds, never zero
    unit: u64,
    state: Mutex<State>,
    clock: C,
}

impl RateLimiter {
    /// Create a limiter allowing up to `rate` calls per `per`.
    ///
    /// A `rate` of zero is raised to one and a zero `per` becomes one second.
    pub fn new(rate: u64, per: Duration) -> Self {
        Self::with_clock(rate, per, MonotonicClock::new())
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a limiter that reads time from `clock`.
    pub fn with_clock(rate: u64, per: Duration, clock: C) -> Self {
        let rate = normalize_rate(rate);
        let unit = normalize_unit(per);
        let max = rate.saturating_mul(unit);

        debug!(rate = rate, unit_nanos = unit, "Creating rate limiter");

        let last_check = clock.now_nanos();
        Self {
            unit,
            state: Mutex::new(State {
                rate,
                allowance: max,
                max,
                last_check,
            }),
            clock,
        }
    }

    /// Change the allowed rate.
    ///
    /// The current allowance is left alone; if it exceeds the new ceiling it
    /// is clamped on the next [`limit`](Self::limit) call.
    pub fn update_rate(&self, rate: u64) {
        let rate = normalize_rate(rate);
        let mut state = self.state.lock();
        debug!(old_rate = state.rate, new_rate = rate, "Updating rate");
        state.rate = rate;
        state.max = rate.saturating_mul(self.unit);
    }

    /// Check and consume one event.
    ///
    /// Returns `true` if the rate was exceeded and the call should be
    /// throttled; nothing is charged in that case. Returns `false` if the
    /// call is allowed, after charging it against the allowance.
    pub fn limit(&self) -> bool {
        let mut state = self.state.lock();

        // Read time under the lock so `last_check` only moves forward.
        let now = self.clock.now_nanos();
        let passed = now.saturating_sub(state.last_check);
        state.last_check = state.last_check.max(now);

        state.allowance = state
            .allowance
            .saturating_add(passed.saturating_mul(state.rate))
            .min(state.max);

        if state.allowance < self.unit {
            trace!(rate = state.rate, "Rate limit exceeded");
            return true;
        }

        state.allowance -= self.unit;
        false
    }

    /// Return the allowance consumed by the last successful
    /// [`limit`](Self::limit) call.
    ///
    /// See the [undo contract](Self#undo-contract).
    pub fn undo(&self) {
        let mut state = self.state.lock();
        state.allowance = state.allowance.saturating_add(self.unit).min(state.max);
        trace!(allowance = state.allowance, "Returned one unit of allowance");
    }

    /// The configured number of events per unit.
    pub fn rate(&self) -> u64 {
        self.state.lock().rate
    }

    /// The unit length the rate applies to.
    pub fn per(&self) -> Duration {
        Duration::from_nanos(self.unit)
    }

    /// Whether the limiter has been untouched for at least `idle` and would
    /// be back at full burst if refilled now.
    pub(crate) fn is_idle(&self, idle: Duration) -> bool {
        let state = self.state.lock();
        let passed = self.clock.now_nanos().saturating_sub(state.last_check);
        let refilled = state
            .allowance
            .saturating_add(passed.saturating_mul(state.rate));
        passed >= duration_to_nanos(idle) && refilled >= state.max
    }
}

impl<C> fmt::Debug for RateLimiter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RateLimiter")
            .field("rate", &state.rate)
            .field("unit_nanos", &self.unit)
            .field("allowance", &state.allowance)
            .field("max", &state.max)
            .finish()
    }
}

fn normalize_rate(rate: u64) -> u64 {
    rate.max(1)
}

fn normalize_unit(per: Duration) -> u64 {
    let per = if per.is_zero() { DEFAULT_UNIT } else { per };
    duration_to_nanos(per).max(1)
}
