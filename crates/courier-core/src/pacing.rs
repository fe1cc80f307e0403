//! Time, sleeping, and randomness behind injectable seams.
//!
//! The dispatcher never reads the system clock or the thread RNG directly.
//! Production code uses [`Pacing::system`]; tests plug in the virtual-time
//! doubles from [`crate::testing`].

use crate::budget::{BudgetStatus, MAX_DELAY_SECS};
use rand::Rng;
use std::time::{Duration, Instant};

/// Monotonic time source.
pub trait Clock: Send {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;
}

/// Blocking pause between attempts.
pub trait Sleeper: Send {
    fn sleep(&self, duration: Duration);
}

/// Source of uniformly distributed delays.
pub trait RandomSource: Send {
    /// Samples a value in `[low, high]`.
    fn uniform(&mut self, low: f64, high: f64) -> f64;
}

/// Wall clock measured from process start.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Sleeps the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Samples from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        if !(low.is_finite() && high.is_finite()) || high <= low {
            return low;
        }
        rand::rng().random_range(low..=high)
    }
}

/// The clock, sleeper and random source used by one session.
///
/// Also tracks the run timer: [`Pacing::rebase`] makes `time_running`
/// continue from a previously persisted value.
pub struct Pacing {
    clock: Box<dyn Clock>,
    sleeper: Box<dyn Sleeper>,
    random: Box<dyn RandomSource>,
    started_at: Duration,
    carried_secs: f64,
}

impl Pacing {
    pub fn new(
        clock: impl Clock + 'static,
        sleeper: impl Sleeper + 'static,
        random: impl RandomSource + 'static,
    ) -> Self {
        let started_at = clock.now();
        Self {
            clock: Box::new(clock),
            sleeper: Box::new(sleeper),
            random: Box::new(random),
            started_at,
            carried_secs: 0.0,
        }
    }

    /// Real clock, real sleeps, thread RNG.
    pub fn system() -> Self {
        Self::new(SystemClock::new(), ThreadSleeper, ThreadRandom)
    }

    /// Restarts the run timer so it continues from `time_running` seconds.
    pub fn rebase(&mut self, time_running: f64) {
        self.started_at = self.clock.now();
        self.carried_secs = time_running;
    }

    /// Seconds spent running, including time carried over by [`Pacing::rebase`].
    pub fn time_running(&self) -> f64 {
        self.carried_secs + self.clock.now().saturating_sub(self.started_at).as_secs_f64()
    }

    /// Current reading of the underlying clock.
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Samples a delay in `[min_delay, min_delay + random_delay]`.
    pub fn sample_delay(&mut self, min_delay: f64, random_delay: f64) -> f64 {
        let high = min_delay + random_delay;
        self.random.uniform(min_delay, high).clamp(min_delay, high)
    }

    /// Blocks for `secs` seconds, at most [`MAX_DELAY_SECS`]. Non-positive
    /// and NaN values return immediately.
    pub fn sleep(&self, secs: f64) {
        if secs > 0.0 {
            self.sleeper
                .sleep(Duration::from_secs_f64(secs.min(MAX_DELAY_SECS)));
        }
    }
}

impl std::fmt::Debug for Pacing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pacing")
            .field("started_at", &self.started_at)
            .field("carried_secs", &self.carried_secs)
            .finish_non_exhaustive()
    }
}

/// Computes how long to wait after an attempt.
///
/// `sampled` is the raw delay drawn for this attempt; the time the attempt
/// itself took is deducted from it. The wait is skipped entirely when there
/// is nothing left to pace: a success with no further records or message
/// budget, or an exhausted time budget.
pub fn next_delay(sampled: f64, attempt_secs: f64, success: bool, status: BudgetStatus) -> f64 {
    let nothing_left = (success && !status.has_more_records)
        || !status.has_more_time
        || (success && !status.has_more_messages);
    if nothing_left {
        return 0.0;
    }
    (sampled - attempt_secs).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixedRandom, ManualClock};

    fn open() -> BudgetStatus {
        BudgetStatus {
            has_more_records: true,
            has_more_time: true,
            has_more_messages: true,
        }
    }

    #[test]
    fn test_delay_deducts_attempt_time() {
        assert!((next_delay(10.0, 3.0, true, open()) - 7.0).abs() < 1e-9);
        assert_eq!(next_delay(2.0, 3.0, false, open()), 0.0);
    }

    #[test]
    fn test_delay_skipped_when_nothing_left() {
        let last_record = BudgetStatus {
            has_more_records: false,
            ..open()
        };
        assert_eq!(next_delay(10.0, 1.0, true, last_record), 0.0);
        // A failure on the last record still waits before its retry.
        assert!(next_delay(10.0, 1.0, false, last_record) > 0.0);

        let out_of_time = BudgetStatus {
            has_more_time: false,
            ..open()
        };
        assert_eq!(next_delay(10.0, 1.0, false, out_of_time), 0.0);

        let out_of_messages = BudgetStatus {
            has_more_messages: false,
            ..open()
        };
        assert_eq!(next_delay(10.0, 1.0, true, out_of_messages), 0.0);
    }

    #[test]
    fn test_rebase_carries_time_forward() {
        let clock = ManualClock::new();
        let mut pacing = Pacing::new(clock.clone(), clock.sleeper(), FixedRandom::new(0.0));
        clock.advance(Duration::from_secs(5));
        assert!((pacing.time_running() - 5.0).abs() < 1e-9);

        pacing.rebase(100.0);
        assert!((pacing.time_running() - 100.0).abs() < 1e-9);
        clock.advance(Duration::from_secs(2));
        assert!((pacing.time_running() - 102.0).abs() < 1e-9);
    }

    #[test]
    fn test_sleep_advances_manual_clock() {
        let clock = ManualClock::new();
        let pacing = Pacing::new(clock.clone(), clock.sleeper(), FixedRandom::new(0.0));
        pacing.sleep(1.5);
        pacing.sleep(-1.0);
        assert_eq!(clock.now(), Duration::from_millis(1500));
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(1500)]);
    }

    #[test]
    fn test_sleep_caps_huge_delays() {
        let clock = ManualClock::new();
        let pacing = Pacing::new(clock.clone(), clock.sleeper(), FixedRandom::new(0.0));
        pacing.sleep(1e20);
        pacing.sleep(f64::INFINITY);
        pacing.sleep(f64::NAN);
        let cap = Duration::from_secs_f64(MAX_DELAY_SECS);
        assert_eq!(clock.sleeps(), vec![cap, cap]);
    }

    #[test]
    fn test_sample_delay_is_clamped() {
        let clock = ManualClock::new();
        let mut pacing = Pacing::new(clock.clone(), clock.sleeper(), FixedRandom::new(99.0));
        assert!((pacing.sample_delay(1.0, 2.0) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_thread_random_stays_in_bounds() {
        let mut random = ThreadRandom;
        for _ in 0..200 {
            let value = random.uniform(2.0, 5.0);
            assert!((2.0..=5.0).contains(&value));
        }
        assert_eq!(random.uniform(3.0, 3.0), 3.0);
        assert_eq!(random.uniform(1.0, f64::INFINITY), 1.0);
    }
}
