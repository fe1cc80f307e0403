//! In-memory event sink and roster.

use courier_proto::{EventSink, Record, RecordId, Roster, RosterRepair, SessionEvent};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Collects every emitted event for later assertions.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<SessionEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the events emitted so far.
    pub fn events(&self) -> Vec<SessionEvent> {
        self.lock().clone()
    }

    /// Wire names of the events emitted so far.
    pub fn names(&self) -> Vec<&'static str> {
        self.lock().iter().map(SessionEvent::name).collect()
    }

    /// Number of emitted events with the given wire name.
    pub fn count(&self, name: &str) -> usize {
        self.lock().iter().filter(|e| e.name() == name).count()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SessionEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &SessionEvent) {
        self.lock().push(event.clone());
    }
}

/// A roster backed by a vector of pre-validated records.
#[derive(Debug, Clone, Default)]
pub struct VecRoster {
    records: Vec<Record>,
    cursor: usize,
    repairs: Vec<RosterRepair>,
}

impl VecRoster {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            cursor: 0,
            repairs: Vec::new(),
        }
    }

    /// Records with ids `1..=count`, each with a `name` field.
    pub fn numbered(count: u64) -> Self {
        let records = (1..=count)
            .filter_map(|n| RecordId::new(n).ok())
            .map(|id| Record::new(id, [("name", format!("Recipient {id}"))]))
            .collect();
        Self::new(records)
    }

    /// Attaches repairs to report through [`Roster::repairs`].
    pub fn with_repairs(mut self, repairs: Vec<RosterRepair>) -> Self {
        self.repairs = repairs;
        self
    }
}

impl Roster for VecRoster {
    fn next_record(&mut self) -> Option<Record> {
        let record = self.records.get(self.cursor).cloned()?;
        self.cursor += 1;
        Some(record)
    }

    fn has_next(&self) -> bool {
        self.cursor < self.records.len()
    }

    fn position(&self) -> u64 {
        self.cursor as u64
    }

    fn seek(&mut self, position: u64) {
        self.cursor = usize::try_from(position)
            .unwrap_or(usize::MAX)
            .min(self.records.len());
    }

    fn repairs(&self) -> &[RosterRepair] {
        &self.repairs
    }
}
