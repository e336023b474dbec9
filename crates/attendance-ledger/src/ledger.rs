//! In-memory attendance display log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// One accepted attendance marking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceLedgerEntry {
    pub student_id: String,
    pub name: String,
    /// Always within [0, 1]
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub attendance_id: String,
}

/// Write-once log of this kiosk's accepted outcomes, most recent first.
///
/// Repeat markings of the same student are kept; the server decides whether
/// a student was already marked today.
#[derive(Debug, Clone, Default)]
pub struct AttendanceLedger {
    entries: VecDeque<AttendanceLedgerEntry>,
}

impl AttendanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend an entry
    pub fn record(&mut self, entry: AttendanceLedgerEntry) {
        self.entries.push_front(entry);
    }

    /// Entries, most recent first
    pub fn entries(&self) -> impl Iterator<Item = &AttendanceLedgerEntry> {
        self.entries.iter()
    }

    /// Most recent entry for a student
    pub fn latest_for(&self, student_id: &str) -> Option<&AttendanceLedgerEntry> {
        self.entries.iter().find(|e| e.student_id == student_id)
    }

    /// Number of distinct students in the ledger
    pub fn student_count(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.student_id.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Explicit user clear
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
