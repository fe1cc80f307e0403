//! # courier-proto
//!
//! Shared types, error definitions, and traits for the Courier workspace.
//!
//! This crate provides the boundaries the send-session core talks through:
//! - `Record` and `RecordId` for roster entries
//! - The `Roster` and `Submitter` collaborator traits
//! - `SessionEvent` and the `EventSink` trait for structured diagnostics
//! - Common error types

mod error;
mod event;
mod record;
mod roster;
mod submitter;

pub use error::{Error, Result};
pub use event::{EventSink, SessionEvent};
pub use record::{MAX_RECORD_ID, Record, RecordId};
pub use roster::{RepairAction, RepairKind, Roster, RosterRepair};
pub use submitter::{SubmissionError, Submitter};
