//! Stop causes and the end-of-session summary.

use crate::stats::{DerivedRates, RunStatistics};
use serde::Serialize;
use std::fmt;

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopCause {
    /// The roster has no further records.
    RosterExhausted,
    /// The time budget ran out.
    MaxTime { limit_secs: f64 },
    /// The message budget ran out.
    MaxMessages { limit: u64 },
    /// The interrupt flag was raised.
    Interrupted,
}

impl StopCause {
    /// Machine-readable name, used in events and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            StopCause::RosterExhausted => "roster_exhausted",
            StopCause::MaxTime { .. } => "max_time",
            StopCause::MaxMessages { .. } => "max_messages",
            StopCause::Interrupted => "interrupted",
        }
    }

    /// Process exit code for this cause.
    ///
    /// Budgets running out is a normal end of a session; only an interrupt
    /// is reported as 130 (128 + SIGINT).
    pub fn exit_code(&self) -> i32 {
        match self {
            StopCause::Interrupted => 130,
            _ => 0,
        }
    }
}

impl fmt::Display for StopCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopCause::RosterExhausted => write!(f, "No more records to message"),
            StopCause::MaxTime { limit_secs } => {
                write!(f, "Max time reached ({})", format_seconds(*limit_secs))
            }
            StopCause::MaxMessages { limit } => write!(f, "Max messages sent ({limit})"),
            StopCause::Interrupted => write!(f, "Interrupted"),
        }
    }
}

/// What a finished session reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub cause: StopCause,
    pub statistics: RunStatistics,
    pub rates: DerivedRates,
    /// Records dispatched during this session (not across resumes).
    pub records_processed: u64,
    /// Seconds left in the time budget; `None` when unbounded.
    pub remaining_time: Option<f64>,
    /// Messages left in the message budget; `None` when unbounded.
    pub remaining_messages: Option<u64>,
}

/// Formats seconds as `12.5s`, `3m 4.25s` or `1h 2m 3s`.
pub fn format_seconds(secs: f64) -> String {
    let secs = secs.max(0.0);
    if secs < 60.0 {
        return format!("{}s", round2(secs));
    }
    if secs < 3600.0 {
        let minutes = (secs / 60.0).floor();
        return format!("{minutes}m {}s", round2(secs - minutes * 60.0));
    }
    let hours = (secs / 3600.0).floor();
    let rest = secs - hours * 3600.0;
    let minutes = (rest / 60.0).floor();
    format!("{hours}h {minutes}m {}s", round2(rest - minutes * 60.0))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
