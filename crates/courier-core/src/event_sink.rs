//! Event sinks: tracing output, JSONL recording, and fan-out.

use courier_proto::{EventSink, SessionEvent};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Forwards session events to `tracing` at a level matching their severity.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &SessionEvent) {
        match event {
            SessionEvent::SessionStarted {
                resumed_from,
                time_running,
                messages_sent,
            } => info!(
                resumed_from,
                time_running, messages_sent, "Session started"
            ),
            SessionEvent::FieldMissing { record, field } => {
                warn!(record = %record, field = %field, "Template field missing from record");
            }
            SessionEvent::AttemptStarted { record, attempt } => {
                debug!(record = %record, attempt, "Attempt started");
            }
            SessionEvent::AttemptSucceeded {
                record,
                attempt,
                elapsed_secs,
                messages_sent,
            } => debug!(
                record = %record,
                attempt,
                elapsed_secs,
                messages_sent,
                "Attempt succeeded"
            ),
            SessionEvent::AttemptFailed {
                record,
                attempt,
                remaining_retries,
                error,
                ..
            } => debug!(
                record = %record,
                attempt,
                remaining_retries,
                error = %error,
                "Attempt failed"
            ),
            SessionEvent::Waiting {
                record,
                delay_secs,
                retrying,
            } => debug!(record = %record, delay_secs, retrying, "Waiting"),
            SessionEvent::RecordFailed { record, attempts } => {
                warn!(record = %record, attempts, "Record failed");
            }
            SessionEvent::RecordFinished {
                record,
                position,
                success,
                time_running,
            } => info!(
                record = %record,
                position,
                success,
                time_running,
                "Record finished"
            ),
            SessionEvent::Housekeeping { iteration } => {
                info!(iteration, "Housekeeping: snapshot saved, resetting submitter");
            }
            SessionEvent::ResetFailed { error } => {
                warn!(error = %error, "Submitter reset failed");
            }
            SessionEvent::SnapshotCorrupt { path, error } => {
                warn!(path = %path, error = %error, "Statistics snapshot corrupt");
            }
            SessionEvent::SnapshotSaveFailed { path, error } => {
                warn!(path = %path, error = %error, "Statistics snapshot not saved");
            }
            SessionEvent::SessionStopped {
                cause,
                time_running,
                messages_sent,
                messages_failed,
            } => info!(
                cause = %cause,
                time_running,
                messages_sent,
                messages_failed,
                "Session stopped"
            ),
        }
    }
}

/// A timestamped line in a JSONL event recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unix timestamp in milliseconds.
    pub ts: u64,

    /// Event name, e.g. `attempt.failed`.
    pub event: String,

    /// Event payload.
    pub data: serde_json::Value,
}

impl EventRecord {
    /// Creates a record stamped with the current time.
    pub fn new(event: impl Into<String>, data: impl Serialize) -> Self {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        Self {
            ts,
            event: event.into(),
            data: serde_json::to_value(data).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Creates a record for a session event.
    pub fn from_event(event: &SessionEvent) -> Self {
        let data = serde_json::to_value(event)
            .ok()
            .and_then(|mut value| value.get_mut("data").map(serde_json::Value::take))
            .unwrap_or(serde_json::Value::Null);
        Self::new(event.name(), data)
    }
}

/// Writes every event as one JSON line.
///
/// Each line is written and flushed immediately, so a buffered writer loses
/// at most the event in flight on a crash. Write errors are ignored.
pub struct SessionRecorder<W> {
    writer: Mutex<W>,
}

impl<W: Write> SessionRecorder<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Records a session event.
    pub fn record_event(&self, event: &SessionEvent) {
        self.write_record(&EventRecord::from_event(event));
    }

    /// Records a metadata line such as `_meta.session`.
    pub fn record_meta(&self, record: EventRecord) {
        self.write_record(&record);
    }

    fn write_record(&self, record: &EventRecord) {
        if let Ok(mut writer) = self.writer.lock()
            && let Ok(json) = serde_json::to_string(record)
        {
            let _ = writeln!(writer, "{json}");
            let _ = writer.flush();
        }
    }

    /// Flushes the underlying writer.
    pub fn flush(&self) -> io::Result<()> {
        self.writer
            .lock()
            .map_err(|_| io::Error::other("Failed to acquire writer lock"))?
            .flush()
    }
}

impl<W: Write + Send> EventSink for SessionRecorder<W> {
    fn emit(&self, event: &SessionEvent) {
        self.record_event(event);
    }
}

/// Delivers each event to several sinks in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.add(sink);
        self
    }

    pub fn add(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &SessionEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}
