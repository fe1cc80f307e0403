//! Virtual clock, sleeper and random source.

use crate::pacing::{Clock, RandomSource, Sleeper};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct TimeState {
    now: Duration,
    sleeps: Vec<Duration>,
}

/// A clock that only moves when told to.
///
/// Clones share the same time. [`ManualClock::sleeper`] returns a sleeper
/// whose sleeps advance this clock.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    state: Arc<Mutex<TimeState>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.lock().now += by;
    }

    /// A sleeper bound to this clock.
    pub fn sleeper(&self) -> ManualSleeper {
        ManualSleeper {
            state: Arc::clone(&self.state),
        }
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    /// Sum of all requested sleeps.
    pub fn total_slept(&self) -> Duration {
        self.lock().sleeps.iter().sum()
    }

    fn lock(&self) -> MutexGuard<'_, TimeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.lock().now
    }
}

/// Records sleeps and advances the shared [`ManualClock`] instead of blocking.
#[derive(Debug, Clone)]
pub struct ManualSleeper {
    state: Arc<Mutex<TimeState>>,
}

impl Sleeper for ManualSleeper {
    fn sleep(&self, duration: Duration) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.now += duration;
        state.sleeps.push(duration);
    }
}

/// Always returns the same value (clamped into the requested range by callers).
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom {
    value: f64,
}

impl FixedRandom {
    pub fn new(value: f64) -> Self {
        Self { value }
    }

    /// Always samples the low end of the range.
    pub fn low() -> Self {
        Self::new(f64::NEG_INFINITY)
    }

    /// Always samples the high end of the range.
    pub fn high() -> Self {
        Self::new(f64::INFINITY)
    }
}

impl RandomSource for FixedRandom {
    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        self.value.clamp(low, high.max(low))
    }
}
