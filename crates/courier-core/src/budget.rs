//! Session budgets and stop-condition checks.

use crate::config::ConfigError;
use crate::stats::RunStatistics;

/// Longest inter-attempt delay a budget accepts: one day.
pub const MAX_DELAY_SECS: f64 = 86_400.0;

/// Immutable limits for one send session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SendBudget {
    max_time: Option<f64>,
    max_messages: Option<u64>,
    max_retries: u32,
    min_delay: f64,
    random_delay: f64,
}

impl SendBudget {
    /// Creates a budget, rejecting negative or non-finite values and delays
    /// whose upper bound exceeds [`MAX_DELAY_SECS`].
    ///
    /// `None` for `max_time` or `max_messages` means unbounded.
    pub fn new(
        max_time: Option<f64>,
        max_messages: Option<u64>,
        max_retries: u32,
        min_delay: f64,
        random_delay: f64,
    ) -> Result<Self, ConfigError> {
        if let Some(secs) = max_time {
            check_seconds("max_time", secs)?;
        }
        check_seconds("min_delay", min_delay)?;
        check_seconds("random_delay", random_delay)?;
        let max_delay = min_delay + random_delay;
        if max_delay > MAX_DELAY_SECS {
            return Err(ConfigError::InvalidValue {
                field: "random_delay".to_string(),
                message: format!(
                    "min_delay + random_delay is {max_delay}s, at most {MAX_DELAY_SECS}s is allowed"
                ),
            });
        }
        Ok(Self {
            max_time,
            max_messages,
            max_retries,
            min_delay,
            random_delay,
        })
    }

    /// An unbounded budget with no pacing, mostly useful in tests.
    pub fn unpaced(max_retries: u32) -> Self {
        Self {
            max_time: None,
            max_messages: None,
            max_retries,
            min_delay: 0.0,
            random_delay: 0.0,
        }
    }

    pub fn max_time(&self) -> Option<f64> {
        self.max_time
    }

    pub fn max_messages(&self) -> Option<u64> {
        self.max_messages
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn min_delay(&self) -> f64 {
        self.min_delay
    }

    pub fn random_delay(&self) -> f64 {
        self.random_delay
    }

    /// Upper bound of the sampled inter-attempt delay.
    pub fn max_delay(&self) -> f64 {
        self.min_delay + self.random_delay
    }

    /// True while the time budget is not exhausted.
    pub fn has_more_time(&self, time_running: f64) -> bool {
        self.max_time.is_none_or(|max| time_running < max)
    }

    /// True while the message budget is not exhausted.
    pub fn has_more_messages(&self, messages_sent: u64) -> bool {
        self.max_messages.is_none_or(|max| messages_sent < max)
    }

    /// Evaluates every budget against the current statistics.
    pub fn status(&self, stats: &RunStatistics, has_more_records: bool) -> BudgetStatus {
        BudgetStatus {
            has_more_records,
            has_more_time: self.has_more_time(stats.time_running),
            has_more_messages: self.has_more_messages(stats.messages_sent),
        }
    }

    /// Seconds left in the time budget, if bounded.
    pub fn remaining_time(&self, time_running: f64) -> Option<f64> {
        self.max_time.map(|max| (max - time_running).max(0.0))
    }

    /// Messages left in the message budget, if bounded.
    pub fn remaining_messages(&self, messages_sent: u64) -> Option<u64> {
        self.max_messages
            .map(|max| max.saturating_sub(messages_sent))
    }
}

fn check_seconds(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("expected a non-negative number of seconds, got {value}"),
        })
    }
}

/// Snapshot of which budgets still have room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetStatus {
    pub has_more_records: bool,
    pub has_more_time: bool,
    pub has_more_messages: bool,
}
