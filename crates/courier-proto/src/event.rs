//! Structured session events.
//!
//! Components never log through ambient global state for anything that
//! describes session progress. They emit `SessionEvent`s into an
//! [`EventSink`] handed to them at construction, and the sink decides where
//! the events go (tracing, a JSONL recording, a test buffer).

use crate::RecordId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// An event emitted while a send session runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SessionEvent {
    /// The controller loaded its snapshot and entered the running state.
    #[serde(rename = "session.started")]
    SessionStarted {
        resumed_from: u64,
        time_running: f64,
        messages_sent: u64,
    },

    /// A template referenced a field the record does not have.
    #[serde(rename = "template.field_missing")]
    FieldMissing { record: RecordId, field: String },

    /// A submission attempt is about to run.
    #[serde(rename = "attempt.started")]
    AttemptStarted { record: RecordId, attempt: u32 },

    /// A submission attempt succeeded.
    #[serde(rename = "attempt.succeeded")]
    AttemptSucceeded {
        record: RecordId,
        attempt: u32,
        elapsed_secs: f64,
        messages_sent: u64,
    },

    /// A submission attempt failed.
    #[serde(rename = "attempt.failed")]
    AttemptFailed {
        record: RecordId,
        attempt: u32,
        remaining_retries: u32,
        elapsed_secs: f64,
        error: String,
    },

    /// The dispatcher is pausing before the next attempt or record.
    #[serde(rename = "attempt.waiting")]
    Waiting {
        record: RecordId,
        delay_secs: f64,
        retrying: bool,
    },

    /// A record exhausted its retries without a successful submission.
    #[serde(rename = "record.failed")]
    RecordFailed { record: RecordId, attempts: u32 },

    /// The controller finished with a record and checkpointed its position.
    #[serde(rename = "record.finished")]
    RecordFinished {
        record: RecordId,
        position: u64,
        success: bool,
        time_running: f64,
    },

    /// Periodic snapshot-and-reset step.
    #[serde(rename = "session.housekeeping")]
    Housekeeping { iteration: u64 },

    /// The submitter's session handle could not be reset.
    #[serde(rename = "session.reset_failed")]
    ResetFailed { error: String },

    /// The persisted snapshot could not be read; zero statistics are used.
    #[serde(rename = "stats.corrupt")]
    SnapshotCorrupt { path: String, error: String },

    /// A snapshot write failed.
    #[serde(rename = "stats.save_failed")]
    SnapshotSaveFailed { path: String, error: String },

    /// The session loop terminated.
    #[serde(rename = "session.stopped")]
    SessionStopped {
        cause: String,
        time_running: f64,
        messages_sent: u64,
        messages_failed: u64,
    },
}

impl SessionEvent {
    /// Returns the wire name of this event (the serde tag).
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::SessionStarted { .. } => "session.started",
            SessionEvent::FieldMissing { .. } => "template.field_missing",
            SessionEvent::AttemptStarted { .. } => "attempt.started",
            SessionEvent::AttemptSucceeded { .. } => "attempt.succeeded",
            SessionEvent::AttemptFailed { .. } => "attempt.failed",
            SessionEvent::Waiting { .. } => "attempt.waiting",
            SessionEvent::RecordFailed { .. } => "record.failed",
            SessionEvent::RecordFinished { .. } => "record.finished",
            SessionEvent::Housekeeping { .. } => "session.housekeeping",
            SessionEvent::ResetFailed { .. } => "session.reset_failed",
            SessionEvent::SnapshotCorrupt { .. } => "stats.corrupt",
            SessionEvent::SnapshotSaveFailed { .. } => "stats.save_failed",
            SessionEvent::SessionStopped { .. } => "session.stopped",
        }
    }
}

/// Receives structured session events.
pub trait EventSink: Send + Sync {
    /// Handles one event. Must not fail or panic.
    fn emit(&self, event: &SessionEvent);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: &SessionEvent) {
        (**self).emit(event);
    }
}

impl<T: EventSink + ?Sized> EventSink for &T {
    fn emit(&self, event: &SessionEvent) {
        (**self).emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_tag_and_data() {
        let event = SessionEvent::FieldMissing {
            record: RecordId::new(5).unwrap(),
            field: "name".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "template.field_missing");
        assert_eq!(json["data"]["record"], 5);
        assert_eq!(json["data"]["field"], "name");
    }

    #[test]
    fn test_name_matches_serde_tag() {
        let events = vec![
            SessionEvent::Housekeeping { iteration: 10 },
            SessionEvent::ResetFailed {
                error: "boom".to_string(),
            },
            SessionEvent::SessionStopped {
                cause: "max_messages".to_string(),
                time_running: 1.0,
                messages_sent: 1,
                messages_failed: 0,
            },
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["event"], event.name());
        }
    }
}
