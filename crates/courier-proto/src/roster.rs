//! The roster collaborator boundary.
//!
//! Ingestion and repair happen before this boundary. The session core only
//! sees "next record or end of roster", a cursor, and the list of rows that
//! were repaired or skipped on the way in.

use crate::Record;
use serde::{Deserialize, Serialize};

/// Source of records for a send session.
pub trait Roster {
    /// Returns the next valid record, skipping rows that failed validation.
    ///
    /// Returns `None` once the roster is exhausted.
    fn next_record(&mut self) -> Option<Record>;

    /// Returns true while unconsumed rows remain.
    fn has_next(&self) -> bool;

    /// Number of rows consumed so far, including skipped rows.
    fn position(&self) -> u64;

    /// Moves the cursor so that the next pull starts at `position`.
    ///
    /// Positions past the end leave the roster exhausted.
    fn seek(&mut self, position: u64);

    /// Rows that were repaired or skipped during ingestion.
    fn repairs(&self) -> &[RosterRepair] {
        &[]
    }
}

/// Why a roster row needed attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairKind {
    /// The id cell was empty.
    Missing,
    /// The id cell was not an integer.
    NotInteger,
    /// The id was negative.
    Negative,
    /// The id exceeded the allowed magnitude.
    TooLarge,
}

/// What ingestion did about a problem row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairAction {
    /// The row is never offered to the session.
    Skip,
    /// The id was replaced by its absolute value.
    Abs,
}

/// A roster row that was repaired or skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterRepair {
    /// Zero-based data row index (header excluded).
    pub row: u64,
    /// The id cell as it appeared in the input.
    pub raw_id: String,
    /// What was wrong with it.
    pub kind: RepairKind,
    /// What was done about it.
    pub action: RepairAction,
}
