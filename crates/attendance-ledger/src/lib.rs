//! Attendance Ledger
//!
//! Merges recognition outcomes into the session's display ledger with
//! confidence gating and confidence bucketing.

mod ledger;
mod reconciler;

pub use ledger::{AttendanceLedger, AttendanceLedgerEntry};
pub use reconciler::{ConfidenceBucket, LedgerEvent, NoMatchReason, Reconciler, ReconcilerConfig};
