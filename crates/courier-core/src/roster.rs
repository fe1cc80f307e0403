//! CSV roster ingestion.
//!
//! Rows are validated when the file is loaded. A row whose id cannot be
//! used is skipped; a negative id is replaced by its absolute value. Either
//! way the row is recorded as a [`RosterRepair`] so it can be reviewed later.
//! Skipped rows still occupy a position, which keeps resumption positions
//! stable across runs over the same file.

use courier_proto::{MAX_RECORD_ID, Record, RecordId, RepairAction, RepairKind, Roster, RosterRepair};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// Errors from loading a roster or writing its repair report.
#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("roster has no '{0}' column")]
    MissingColumn(String),
}

/// A roster loaded from a CSV file with a header row.
#[derive(Debug, Clone)]
pub struct CsvRoster {
    rows: Vec<Option<Record>>,
    cursor: usize,
    repairs: Vec<RosterRepair>,
}

impl CsvRoster {
    /// Loads and validates the roster at `path`.
    pub fn from_path(path: impl AsRef<Path>, id_column: &str) -> Result<Self, RosterError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading roster");
        let file = std::fs::File::open(path)?;
        let roster = Self::from_reader(file, id_column)?;
        info!(
            path = %path.display(),
            rows = roster.len(),
            valid = roster.valid_count(),
            repaired = roster.repairs.len(),
            "Roster loaded"
        );
        Ok(roster)
    }

    /// Loads and validates a roster from any CSV source.
    pub fn from_reader<R: Read>(reader: R, id_column: &str) -> Result<Self, RosterError> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let headers = csv.headers()?.clone();
        let id_index = headers
            .iter()
            .position(|h| h.trim() == id_column)
            .ok_or_else(|| RosterError::MissingColumn(id_column.to_string()))?;

        let mut rows = Vec::new();
        let mut repairs = Vec::new();
        for (index, result) in csv.records().enumerate() {
            let row = result?;
            let row_number = index as u64;
            let raw_id = row.get(id_index).unwrap_or_default();

            let id = match validate_id(raw_id) {
                Ok((id, repaired)) => {
                    if let Some(kind) = repaired {
                        repairs.push(RosterRepair {
                            row: row_number,
                            raw_id: raw_id.to_string(),
                            kind,
                            action: RepairAction::Abs,
                        });
                    }
                    id
                }
                Err(kind) => {
                    warn!(row = row_number, raw_id, ?kind, "Skipping roster row");
                    repairs.push(RosterRepair {
                        row: row_number,
                        raw_id: raw_id.to_string(),
                        kind,
                        action: RepairAction::Skip,
                    });
                    rows.push(None);
                    continue;
                }
            };

            let fields = headers.iter().enumerate().map(|(column, name)| {
                let value = if column == id_index {
                    id.to_string()
                } else {
                    row.get(column).unwrap_or_default().to_string()
                };
                (name.trim().to_string(), value)
            });
            rows.push(Some(Record::new(id, fields)));
        }

        Ok(Self {
            rows,
            cursor: 0,
            repairs,
        })
    }

    /// Total rows, including skipped ones.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows that will be offered to the session.
    pub fn valid_count(&self) -> usize {
        self.rows.iter().filter(|row| row.is_some()).count()
    }

    /// Writes the repair report as a JSON array.
    pub fn save_repairs(&self, path: impl AsRef<Path>) -> Result<(), RosterError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.repairs)?;
        std::fs::write(path, json)?;
        if !self.repairs.is_empty() {
            info!(
                path = %path.display(),
                count = self.repairs.len(),
                "Roster repairs saved"
            );
        }
        Ok(())
    }
}

impl Roster for CsvRoster {
    fn next_record(&mut self) -> Option<Record> {
        while let Some(row) = self.rows.get(self.cursor) {
            self.cursor += 1;
            if let Some(record) = row {
                return Some(record.clone());
            }
        }
        None
    }

    fn has_next(&self) -> bool {
        self.cursor < self.rows.len()
    }

    fn position(&self) -> u64 {
        self.cursor as u64
    }

    fn seek(&mut self, position: u64) {
        self.cursor = usize::try_from(position)
            .unwrap_or(usize::MAX)
            .min(self.rows.len());
    }

    fn repairs(&self) -> &[RosterRepair] {
        &self.repairs
    }
}

/// Validates a raw id cell.
///
/// Returns the usable id and, if it had to be fixed, what was wrong with it.
/// Returns `Err` with the problem when the row must be skipped.
pub fn validate_id(raw: &str) -> Result<(RecordId, Option<RepairKind>), RepairKind> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RepairKind::Missing);
    }
    let value: i64 = trimmed.parse().map_err(|_| RepairKind::NotInteger)?;
    let magnitude = value.unsigned_abs();
    if magnitude > MAX_RECORD_ID {
        return Err(RepairKind::TooLarge);
    }
    let id = RecordId::new(magnitude).map_err(|_| RepairKind::TooLarge)?;
    let repaired = (value < 0).then_some(RepairKind::Negative);
    Ok((id, repaired))
}
