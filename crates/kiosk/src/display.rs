//! Console rendering of session events

use attendance_ledger::{
    AttendanceLedger, AttendanceLedgerEntry, ConfidenceBucket, LedgerEvent, NoMatchReason,
};
use capture_session::{
    DropReason, ImprovementReport, RegistrationReport, SessionEvent, SessionState,
};
use recognition_client::{AttendanceDay, HealthStatus, StudentRoster, SystemStats};

/// One console line for an event, or `None` for events the console skips
pub fn describe(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::StateChanged { to, .. } => state_line(*to),
        SessionEvent::Instruction { step, text } => Some(format!("[{:>2}] {}", step + 1, text)),
        SessionEvent::Progress { captured, target } => {
            Some(format!("     captured {}/{}", captured, target))
        }
        SessionEvent::CaptureFailed { step, reason } => {
            Some(format!("     capture {} failed: {}", step + 1, reason))
        }
        SessionEvent::TriggerDropped(DropReason::InFlight) => None,
        SessionEvent::TriggerDropped(DropReason::Throttled { remaining }) => Some(format!(
            "Waiting {:.1}s before the next capture",
            remaining.as_secs_f64()
        )),
        SessionEvent::Ledger(event) => Some(ledger_line(event)),
        SessionEvent::Completed { message } => Some(format!("OK: {}", message)),
        SessionEvent::Failed { message } => Some(format!("FAILED: {}", message)),
    }
}

fn state_line(state: SessionState) -> Option<String> {
    let text = match state {
        SessionState::PermissionPending => "Waiting for camera permission",
        SessionState::Active => "Camera ready",
        SessionState::CapturingSequence => "Capturing face images",
        SessionState::AwaitingServerResult => "Processing...",
        SessionState::Cancelled => "Cancelled",
        SessionState::Idle | SessionState::Success | SessionState::Error => return None,
    };
    Some(text.to_string())
}

fn ledger_line(event: &LedgerEvent) -> String {
    match event {
        LedgerEvent::Appended { entry, bucket } => {
            format!("{} {}", bucket_marker(*bucket), entry_line(entry))
        }
        LedgerEvent::NoMatch {
            reason: NoMatchReason::LowConfidence,
            closest,
            confidence,
        } => format!(
            "No match (closest: {}, {:.0}%)",
            closest.as_deref().unwrap_or("unknown"),
            confidence * 100.0
        ),
        LedgerEvent::NoMatch { .. } => "No matching student found".to_string(),
    }
}

fn bucket_marker(bucket: ConfidenceBucket) -> &'static str {
    match bucket {
        ConfidenceBucket::High => "[high]",
        ConfidenceBucket::Medium => "[medium]",
        ConfidenceBucket::Rejected => "[low]",
    }
}

/// One ledger row
pub fn entry_line(entry: &AttendanceLedgerEntry) -> String {
    format!(
        "{} ({}) {:.0}% at {}",
        entry.name,
        entry.student_id,
        entry.confidence * 100.0,
        entry.timestamp.format("%H:%M:%S")
    )
}

/// Ledger rows, most recent first
pub fn ledger_lines(ledger: &AttendanceLedger) -> Vec<String> {
    ledger.entries().map(entry_line).collect()
}

pub fn report_lines(report: &RegistrationReport) -> Vec<String> {
    let mut lines = vec![
        format!("Registered {} ({})", report.name, report.student_id),
        format!(
            "Images: {}/{} captured, {} embeddings stored",
            report.successful, report.requested, report.embeddings_stored
        ),
    ];
    if let Some(line) = shortfall_line(report.short_by(), &report.failed_steps) {
        lines.push(line);
    }
    lines
}

pub fn improvement_lines(report: &ImprovementReport) -> Vec<String> {
    let mut lines = vec![
        format!("Improved recognition for {}", report.student_id),
        format!(
            "Images: {}/{} captured, {} embeddings added",
            report.successful, report.requested, report.embeddings_added
        ),
    ];
    if let Some(line) = shortfall_line(report.short_by(), &report.failed_steps) {
        lines.push(line);
    }
    if report.rejected_images > 0 {
        lines.push(format!("Server rejected {} images", report.rejected_images));
    }
    lines
}

fn shortfall_line(short_by: u32, failed_steps: &[u32]) -> Option<String> {
    if short_by == 0 {
        return None;
    }
    let steps: Vec<String> = failed_steps.iter().map(|s| (s + 1).to_string()).collect();
    Some(format!(
        "Short by {} (failed captures: {})",
        short_by,
        steps.join(", ")
    ))
}

pub fn health_line(health: &HealthStatus) -> String {
    match health.total_students {
        Some(total) => format!("Server {} ({} students enrolled)", health.status, total),
        None => format!("Server {}", health.status),
    }
}

/// Enrolled students, one per line
pub fn roster_lines(roster: &StudentRoster) -> Vec<String> {
    let mut lines = vec![format!("{} students enrolled", roster.count)];
    lines.extend(roster.students.iter().map(|student| {
        format!(
            "  {} {} ({} images{})",
            student.student_id,
            student.name,
            student.image_count,
            if student.is_active { "" } else { ", inactive" }
        )
    }));
    lines
}

pub fn stats_line(stats: &SystemStats) -> String {
    format!(
        "{} students, {} embeddings ({:.1} per student), model {}, threshold {:.2}",
        stats.total_students,
        stats.total_embeddings,
        stats.average_embeddings_per_student,
        stats.model_name.as_deref().unwrap_or("unknown"),
        stats.confidence_threshold
    )
}

pub fn history_lines(day: &AttendanceDay) -> Vec<String> {
    let mut lines = vec![format!("{}: {} present", day.date, day.count)];
    lines.extend(day.attendance.iter().map(|record| {
        format!(
            "  {} {}",
            record.student_id,
            record.check_in.as_deref().unwrap_or("-")
        )
    }));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn entry() -> AttendanceLedgerEntry {
        AttendanceLedgerEntry {
            student_id: "s-001".to_string(),
            name: "Ada".to_string(),
            confidence: 0.914,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 8, 15, 0).unwrap(),
            attendance_id: "att-1".to_string(),
        }
    }

    #[test]
    fn test_entry_line() {
        assert_eq!(entry_line(&entry()), "Ada (s-001) 91% at 08:15:00");
    }

    #[test]
    fn test_ledger_event_lines() {
        let appended = SessionEvent::Ledger(LedgerEvent::Appended {
            entry: entry(),
            bucket: ConfidenceBucket::High,
        });
        assert_eq!(
            describe(&appended).unwrap(),
            "[high] Ada (s-001) 91% at 08:15:00"
        );

        let low = SessionEvent::Ledger(LedgerEvent::NoMatch {
            reason: NoMatchReason::LowConfidence,
            closest: Some("Ada".to_string()),
            confidence: 0.55,
        });
        assert_eq!(describe(&low).unwrap(), "No match (closest: Ada, 55%)");
    }

    #[test]
    fn test_skipped_events() {
        assert!(describe(&SessionEvent::TriggerDropped(DropReason::InFlight)).is_none());
        assert!(describe(&SessionEvent::StateChanged {
            from: SessionState::AwaitingServerResult,
            to: SessionState::Success,
        })
        .is_none());

        let throttled = SessionEvent::TriggerDropped(DropReason::Throttled {
            remaining: Duration::from_millis(1500),
        });
        assert_eq!(
            describe(&throttled).unwrap(),
            "Waiting 1.5s before the next capture"
        );
    }

    #[test]
    fn test_short_report_lists_failed_steps() {
        let report = RegistrationReport {
            student_id: "s-001".to_string(),
            name: "Ada".to_string(),
            requested: 20,
            successful: 18,
            failed_steps: vec![2, 9],
            embeddings_stored: 18,
            message: "ok".to_string(),
        };
        let lines = report_lines(&report);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], "Short by 2 (failed captures: 3, 10)");
    }

    #[test]
    fn test_improvement_lines() {
        let report = ImprovementReport {
            student_id: "s-001".to_string(),
            requested: 20,
            successful: 19,
            failed_steps: vec![0],
            embeddings_added: 17,
            rejected_images: 2,
            message: "ok".to_string(),
        };
        assert_eq!(
            improvement_lines(&report),
            vec![
                "Improved recognition for s-001",
                "Images: 19/20 captured, 17 embeddings added",
                "Short by 1 (failed captures: 1)",
                "Server rejected 2 images",
            ]
        );
    }

    #[test]
    fn test_roster_and_stats() {
        let roster = StudentRoster {
            count: 1,
            students: vec![recognition_client::StudentSummary {
                id: "65f0a1".to_string(),
                name: "Ada".to_string(),
                student_id: "s-001".to_string(),
                image_count: 20,
                is_active: true,
            }],
        };
        assert_eq!(
            roster_lines(&roster),
            vec!["1 students enrolled", "  s-001 Ada (20 images)"]
        );

        let stats = SystemStats {
            total_students: 12,
            total_embeddings: 231,
            model_name: Some("Facenet512".to_string()),
            confidence_threshold: 0.6,
            average_embeddings_per_student: 19.5,
        };
        assert_eq!(
            stats_line(&stats),
            "12 students, 231 embeddings (19.5 per student), model Facenet512, threshold 0.60"
        );
    }
}
