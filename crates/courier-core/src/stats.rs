//! Run statistics and their persisted snapshot.
//!
//! A single JSON document holds the counters for a campaign. It is loaded
//! when a session starts, rewritten after every record, and is the only
//! checkpoint a resumed session needs.

use courier_proto::{EventSink, SessionEvent};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Aggregate counters for a campaign, persisted across restarts.
///
/// Every field is required when loading a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Wall-clock seconds spent running, summed across sessions.
    pub time_running: f64,
    /// Records whose message was submitted successfully.
    pub messages_sent: u64,
    /// Records that exhausted their retries.
    pub messages_failed: u64,
    /// Individual failed attempts.
    pub times_failed: u64,
    /// Seconds spent in successful submissions.
    pub time_sending: f64,
    /// Seconds spent in failed submissions.
    pub time_retrying: f64,
    /// Roster rows consumed so far; the resumption checkpoint.
    pub current_position: u64,
}

impl RunStatistics {
    /// Records that reached a final outcome.
    pub fn records_completed(&self) -> u64 {
        self.messages_sent + self.messages_failed
    }

    /// Advances the resumption checkpoint; never moves it backwards.
    pub fn advance_position(&mut self, position: u64) {
        self.current_position = self.current_position.max(position);
    }

    /// Computes the derived rates reported at the end of a session.
    pub fn rates(&self) -> DerivedRates {
        let completed = self.records_completed();
        let time_waited = self.time_running - self.time_sending - self.time_retrying;
        DerivedRates {
            time_waited,
            average_send_time: ratio(self.time_sending, self.messages_sent),
            average_wait_time: ratio(time_waited, completed),
            average_retry_time: ratio(self.time_retrying, self.times_failed),
            success_rate: ratio(self.messages_sent as f64, completed) * 100.0,
        }
    }
}

fn ratio(numerator: f64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator / denominator as f64
    }
}

/// Rates derived from [`RunStatistics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedRates {
    /// Seconds not spent submitting (pacing delays and overhead).
    pub time_waited: f64,
    /// Mean seconds per successful submission.
    pub average_send_time: f64,
    /// Mean waiting seconds per completed record.
    pub average_wait_time: f64,
    /// Mean seconds per failed attempt.
    pub average_retry_time: f64,
    /// Percentage of completed records that were sent.
    pub success_rate: f64,
}

/// Errors from reading or writing the statistics snapshot.
#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no statistics snapshot at {0}")]
    Missing(PathBuf),
}

/// Owns the single statistics snapshot file.
#[derive(Debug, Clone)]
pub struct StatsStore {
    path: PathBuf,
}

impl StatsStore {
    /// Creates a store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path of the live snapshot.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the snapshot, returning `None` if it does not exist.
    pub fn try_load(&self) -> Result<Option<RunStatistics>, StatsError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)?;
        let stats: RunStatistics = serde_json::from_str(&contents)?;
        Ok(Some(stats))
    }

    /// Loads the snapshot, falling back to zeroed statistics.
    ///
    /// A missing file is normal for a first run. A malformed one is reported
    /// to `sink` and logged, and never stops the session.
    pub fn load(&self, sink: &dyn EventSink) -> RunStatistics {
        match self.try_load() {
            Ok(Some(stats)) => {
                info!(
                    path = %self.path.display(),
                    position = stats.current_position,
                    messages_sent = stats.messages_sent,
                    "Statistics loaded"
                );
                stats
            }
            Ok(None) => {
                debug!(path = %self.path.display(), "No statistics snapshot, starting from zero");
                RunStatistics::default()
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Statistics snapshot is unreadable, starting from zero"
                );
                sink.emit(&SessionEvent::SnapshotCorrupt {
                    path: self.path.display().to_string(),
                    error: e.to_string(),
                });
                RunStatistics::default()
            }
        }
    }

    /// Saves the snapshot using atomic write (temp file + rename).
    pub fn save(&self, stats: &RunStatistics) -> Result<(), StatsError> {
        let json = serde_json::to_string_pretty(stats)?;
        let tmp_path = self.path.with_extension("json.tmp");

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&tmp_path, &json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Copies the live snapshot to `stats_backup_<position>.json` beside it.
    ///
    /// The live snapshot is left in place.
    pub fn backup(&self) -> Result<PathBuf, StatsError> {
        let stats = self
            .try_load()?
            .ok_or_else(|| StatsError::Missing(self.path.clone()))?;
        let backup_path = self.backup_path(stats.current_position);
        std::fs::copy(&self.path, &backup_path)?;
        info!(path = %backup_path.display(), "Statistics backed up");
        Ok(backup_path)
    }

    /// Returns the archival path for a snapshot at `position`.
    pub fn backup_path(&self, position: u64) -> PathBuf {
        let name = format!("stats_backup_{position}.json");
        match self.path.parent() {
            Some(parent) => parent.join(name),
            None => PathBuf::from(name),
        }
    }
}
