//! Recognition result reconciliation

use recognition_client::RecognitionOutcome;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::ledger::{AttendanceLedger, AttendanceLedgerEntry};

/// Reconciler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Minimum confidence for a ledger write (default: 0.6, inclusive)
    pub acceptance_threshold: f64,
    /// Confidence at which a match is shown as high (default: 0.8)
    pub high_confidence_threshold: f64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 0.6,
            high_confidence_threshold: 0.8,
        }
    }
}

/// Presentation bucket for a confidence value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceBucket {
    High,
    Medium,
    Rejected,
}

/// Why an outcome produced no ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoMatchReason {
    /// Server found no matching student
    NotMatched,
    /// Match below the acceptance threshold
    LowConfidence,
    /// Server claimed a match without a student id
    MissingIdentity,
}

/// Result of reconciling one outcome
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEvent {
    /// A ledger entry was prepended
    Appended {
        entry: AttendanceLedgerEntry,
        bucket: ConfidenceBucket,
    },
    /// Transient feedback only
    NoMatch {
        reason: NoMatchReason,
        closest: Option<String>,
        confidence: f64,
    },
}

/// Merges recognition outcomes into the attendance ledger
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    config: ReconcilerConfig,
    ledger: AttendanceLedger,
}

impl Reconciler {
    pub fn new(config: ReconcilerConfig) -> Self {
        info!(
            "Reconciler accepting matches at confidence >= {}",
            config.acceptance_threshold
        );
        Self {
            config,
            ledger: AttendanceLedger::new(),
        }
    }

    /// Classify a confidence value for display
    pub fn bucket(&self, confidence: f64) -> ConfidenceBucket {
        let confidence = sanitize(confidence);
        if confidence >= self.config.high_confidence_threshold {
            ConfidenceBucket::High
        } else if confidence >= self.config.acceptance_threshold {
            ConfidenceBucket::Medium
        } else {
            ConfidenceBucket::Rejected
        }
    }

    /// Apply outcomes in the order received
    pub fn reconcile(&mut self, outcomes: &[RecognitionOutcome]) -> Vec<LedgerEvent> {
        outcomes.iter().map(|o| self.reconcile_one(o)).collect()
    }

    /// Apply a single outcome
    pub fn reconcile_one(&mut self, outcome: &RecognitionOutcome) -> LedgerEvent {
        let confidence = sanitize(outcome.confidence);

        if !outcome.matched {
            debug!("No match (confidence {:.2})", confidence);
            return LedgerEvent::NoMatch {
                reason: NoMatchReason::NotMatched,
                closest: outcome.name.clone(),
                confidence,
            };
        }

        let bucket = self.bucket(confidence);
        if bucket == ConfidenceBucket::Rejected {
            debug!(
                "Match for {:?} rejected: confidence {:.2} < {}",
                outcome.student_id, confidence, self.config.acceptance_threshold
            );
            return LedgerEvent::NoMatch {
                reason: NoMatchReason::LowConfidence,
                closest: outcome.name.clone(),
                confidence,
            };
        }

        let Some(student_id) = outcome.student_id.clone() else {
            debug!("Match without student id ignored");
            return LedgerEvent::NoMatch {
                reason: NoMatchReason::MissingIdentity,
                closest: outcome.name.clone(),
                confidence,
            };
        };

        let entry = AttendanceLedgerEntry {
            name: outcome.name.clone().unwrap_or_else(|| student_id.clone()),
            student_id,
            confidence,
            timestamp: outcome.occurred_at,
            attendance_id: outcome
                .attendance_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        };
        info!(
            "Attendance recorded for {} ({:.0}%)",
            entry.name,
            entry.confidence * 100.0
        );
        self.ledger.record(entry.clone());

        LedgerEvent::Appended { entry, bucket }
    }

    pub fn ledger(&self) -> &AttendanceLedger {
        &self.ledger
    }

    /// Explicit user clear of the display ledger
    pub fn clear_ledger(&mut self) {
        self.ledger.clear();
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }
}

/// Clamp into [0, 1]; NaN counts as zero confidence
fn sanitize(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_acceptance_boundary_is_inclusive() {
        let mut reconciler = Reconciler::default();

        let below = reconciler.reconcile_one(&RecognitionOutcome::matched("s1", "Ada", 0.59));
        assert!(matches!(
            below,
            LedgerEvent::NoMatch {
                reason: NoMatchReason::LowConfidence,
                ..
            }
        ));
        assert!(reconciler.ledger().is_empty());

        let at = reconciler.reconcile_one(&RecognitionOutcome::matched("s1", "Ada", 0.60));
        assert!(matches!(
            at,
            LedgerEvent::Appended {
                bucket: ConfidenceBucket::Medium,
                ..
            }
        ));
        assert_eq!(reconciler.ledger().len(), 1);
    }

    #[test]
    fn test_buckets() {
        let reconciler = Reconciler::default();
        assert_eq!(reconciler.bucket(0.95), ConfidenceBucket::High);
        assert_eq!(reconciler.bucket(0.8), ConfidenceBucket::High);
        assert_eq!(reconciler.bucket(0.79), ConfidenceBucket::Medium);
        assert_eq!(reconciler.bucket(0.6), ConfidenceBucket::Medium);
        assert_eq!(reconciler.bucket(0.3), ConfidenceBucket::Rejected);
        assert_eq!(reconciler.bucket(f64::NAN), ConfidenceBucket::Rejected);
    }

    #[test]
    fn test_unmatched_never_written() {
        let mut reconciler = Reconciler::default();
        let event = reconciler.reconcile_one(&RecognitionOutcome::no_match(0.95));
        assert!(matches!(
            event,
            LedgerEvent::NoMatch {
                reason: NoMatchReason::NotMatched,
                ..
            }
        ));
        assert!(reconciler.ledger().is_empty());
    }

    #[test]
    fn test_batch_in_order_without_dedup() {
        let mut reconciler = Reconciler::default();
        let events = reconciler.reconcile(&[
            RecognitionOutcome::matched("a", "A", 0.9).with_attendance_id("1"),
            RecognitionOutcome::matched("b", "B", 0.4),
            RecognitionOutcome::matched("a", "A", 0.7).with_attendance_id("2"),
        ]);

        assert_eq!(events.len(), 3);
        let ids: Vec<_> = reconciler
            .ledger()
            .entries()
            .map(|e| e.attendance_id.clone())
            .collect();
        assert_eq!(ids, vec!["2".to_string(), "1".to_string()]);
    }

    #[test]
    fn test_local_attendance_id_and_name_fallback() {
        let mut reconciler = Reconciler::default();
        let mut outcome = RecognitionOutcome::matched("s7", "x", 0.9);
        outcome.name = None;

        let LedgerEvent::Appended { entry, bucket } = reconciler.reconcile_one(&outcome) else {
            panic!("expected ledger write");
        };
        assert_eq!(bucket, ConfidenceBucket::High);
        assert_eq!(entry.name, "s7");
        assert!(Uuid::parse_str(&entry.attendance_id).is_ok());
    }

    #[test]
    fn test_missing_identity() {
        let mut reconciler = Reconciler::default();
        let mut outcome = RecognitionOutcome::matched("s7", "x", 0.9);
        outcome.student_id = None;
        assert!(matches!(
            reconciler.reconcile_one(&outcome),
            LedgerEvent::NoMatch {
                reason: NoMatchReason::MissingIdentity,
                ..
            }
        ));
    }

    #[test]
    fn test_clear_ledger() {
        let mut reconciler = Reconciler::default();
        reconciler.reconcile_one(&RecognitionOutcome::matched("s1", "Ada", 0.9));
        reconciler.clear_ledger();
        assert!(reconciler.ledger().is_empty());
    }

    proptest! {
        #[test]
        fn prop_ledger_confidence_in_range(raw in -5.0f64..5.0) {
            let mut reconciler = Reconciler::default();
            reconciler.reconcile_one(&RecognitionOutcome::matched("s", "S", raw));
            for entry in reconciler.ledger().entries() {
                prop_assert!((0.6..=1.0).contains(&entry.confidence));
            }
        }
    }
}
