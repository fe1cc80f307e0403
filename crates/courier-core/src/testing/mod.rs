//! Test doubles for deterministic session tests.
//!
//! Everything here runs on virtual time: sleeping advances a shared
//! [`ManualClock`] instead of blocking, so whole sessions with realistic
//! delays finish instantly.

pub mod memory;
pub mod mock_submitter;
pub mod virtual_time;

pub use memory::{MemorySink, VecRoster};
pub use mock_submitter::{MockOutcome, MockSubmitter, SubmitCall};
pub use virtual_time::{FixedRandom, ManualClock, ManualSleeper};
