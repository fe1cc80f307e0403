//! # courier-core
//!
//! The send-session core for Courier.
//!
//! This crate provides:
//! - Message templating with `{field}` placeholders
//! - The retry dispatcher with randomized pacing between attempts
//! - The session controller and its stop conditions
//! - The persisted run-statistics snapshot used to resume sessions
//! - CSV roster ingestion with id repair
//! - Configuration loading and validation
//! - Event sinks for tracing and JSONL recordings

mod budget;
mod config;
mod dispatcher;
mod event_sink;
mod pacing;
mod roster;
mod session;
mod stats;
mod summary;
pub mod template;
pub mod testing;

pub use budget::{BudgetStatus, MAX_DELAY_SECS, SendBudget};
pub use config::{
    ConfigError, ConfigWarning, CourierConfig, SessionSettings, SubmitterConfig, TimeLimit,
    parse_time_limit,
};
pub use dispatcher::{Outcome, RetryDispatcher};
pub use event_sink::{EventRecord, FanoutSink, SessionRecorder, TracingSink};
pub use pacing::{
    Clock, Pacing, RandomSource, Sleeper, SystemClock, ThreadRandom, ThreadSleeper, next_delay,
};
pub use roster::{CsvRoster, RosterError, validate_id};
pub use session::{DEFAULT_RESET_INTERVAL, SessionController, SessionError, SessionState};
pub use stats::{DerivedRates, RunStatistics, StatsError, StatsStore};
pub use summary::{SessionSummary, StopCause, format_seconds};
pub use template::{Template, render};
