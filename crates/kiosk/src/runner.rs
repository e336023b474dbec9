//! Registration, improvement and attendance run loops

use attendance_ledger::LedgerEvent;
use capture_scheduler::CancelToken;
use capture_session::{
    DropReason, ImprovementReport, RegistrationReport, SessionError, SessionMode,
    SessionOrchestrator, TriggerOutcome,
};
use recognition_client::ServiceError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::KioskError;

/// Forward a kiosk-wide shutdown to the current session's token
fn link_cancel(shutdown: &CancelToken, session: Option<CancelToken>) -> Option<JoinHandle<()>> {
    let session = session?;
    let shutdown = shutdown.clone();
    Some(tokio::spawn(async move {
        shutdown.cancelled().await;
        session.cancel();
    }))
}

/// Register one student, retrying server failures up to `retries` times.
///
/// The session is reset before returning, whatever the outcome.
pub async fn register(
    orchestrator: &mut SessionOrchestrator,
    name: &str,
    student_id: &str,
    retries: u32,
    shutdown: &CancelToken,
) -> Result<RegistrationReport, KioskError> {
    let result = register_session(orchestrator, name, student_id, retries, shutdown).await;
    orchestrator.reset();
    Ok(result?)
}

async fn register_session(
    orchestrator: &mut SessionOrchestrator,
    name: &str,
    student_id: &str,
    retries: u32,
    shutdown: &CancelToken,
) -> Result<RegistrationReport, SessionError> {
    orchestrator.start(SessionMode::Registration).await?;
    let link = link_cancel(shutdown, orchestrator.cancel_handle());

    let mut attempt = 0;
    let result = loop {
        match orchestrator.run_registration(name, student_id).await {
            Err(SessionError::Network(e)) if attempt < retries => {
                attempt += 1;
                warn!("Registration attempt {} failed: {}; retrying", attempt, e);
                if let Err(e) = orchestrator.retry().await {
                    break Err(e);
                }
            }
            other => break other,
        }
    };

    if let Some(link) = link {
        link.abort();
    }
    result
}

/// Capture extra frames for an enrolled student, retrying server failures up
/// to `retries` times. The session is reset before returning.
pub async fn improve(
    orchestrator: &mut SessionOrchestrator,
    student_id: &str,
    retries: u32,
    shutdown: &CancelToken,
) -> Result<ImprovementReport, KioskError> {
    let result = improve_session(orchestrator, student_id, retries, shutdown).await;
    orchestrator.reset();
    Ok(result?)
}

async fn improve_session(
    orchestrator: &mut SessionOrchestrator,
    student_id: &str,
    retries: u32,
    shutdown: &CancelToken,
) -> Result<ImprovementReport, SessionError> {
    orchestrator.start(SessionMode::Improvement).await?;
    let link = link_cancel(shutdown, orchestrator.cancel_handle());

    let mut attempt = 0;
    let result = loop {
        match orchestrator.run_improvement(student_id).await {
            // 4xx means the server will not take these frames
            Err(SessionError::Network(e)) if attempt < retries && !is_client_error(&e) => {
                attempt += 1;
                warn!("Improvement attempt {} failed: {}; retrying", attempt, e);
                if let Err(e) = orchestrator.retry().await {
                    break Err(e);
                }
            }
            other => break other,
        }
    };

    if let Some(link) = link {
        link.abort();
    }
    result
}

fn is_client_error(err: &ServiceError) -> bool {
    matches!(err, ServiceError::Http { status, .. } if (400..500).contains(status))
}

/// Result of an attendance run
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AttendanceSummary {
    /// Probes answered by the server
    pub probes: u32,
    /// Probes that added a ledger entry
    pub marked: u32,
    /// Probes with no accepted match
    pub unmatched: u32,
    /// Shutter or server failures
    pub failures: u32,
}

/// Run `rounds` attendance probes.
///
/// Throttled triggers wait out the detection interval; failed rounds are
/// counted and the next round gets a fresh session.
pub async fn attend(
    orchestrator: &mut SessionOrchestrator,
    rounds: u32,
    shutdown: &CancelToken,
) -> Result<AttendanceSummary, KioskError> {
    let result = attend_rounds(orchestrator, rounds, shutdown).await;
    orchestrator.reset();
    let summary = result?;
    info!(
        "Attendance run finished: {} probes, {} marked, {} failures",
        summary.probes, summary.marked, summary.failures
    );
    Ok(summary)
}

async fn attend_rounds(
    orchestrator: &mut SessionOrchestrator,
    rounds: u32,
    shutdown: &CancelToken,
) -> Result<AttendanceSummary, SessionError> {
    let mut summary = AttendanceSummary::default();
    orchestrator.start(SessionMode::Attendance).await?;

    while summary.probes + summary.failures < rounds {
        if shutdown.is_cancelled() {
            info!("Attendance run interrupted");
            break;
        }

        let link = link_cancel(shutdown, orchestrator.cancel_handle());
        let result = orchestrator.trigger_attendance().await;
        if let Some(link) = link {
            link.abort();
        }

        match result {
            Ok(TriggerOutcome::Dropped(DropReason::Throttled { remaining })) => {
                if shutdown.run_until_cancelled(tokio::time::sleep(remaining)).await.is_none() {
                    break;
                }
                continue;
            }
            Ok(TriggerOutcome::Dropped(DropReason::InFlight)) => continue,
            Ok(TriggerOutcome::Recognized(events)) => {
                summary.probes += 1;
                let marked = events
                    .iter()
                    .filter(|e| matches!(e, LedgerEvent::Appended { .. }))
                    .count() as u32;
                if marked == 0 {
                    summary.unmatched += 1;
                }
                summary.marked += marked;
            }
            Err(SessionError::Cancelled) => break,
            Err(SessionError::Capture(e)) => {
                // Session stays active; the next round captures again
                warn!("Attendance capture failed: {}", e);
                summary.failures += 1;
                continue;
            }
            Err(e @ SessionError::Network(_)) => {
                warn!("Attendance probe failed: {}", e);
                summary.failures += 1;
            }
            Err(e) => return Err(e),
        }

        if summary.probes + summary.failures < rounds {
            orchestrator.next_attendance().await?;
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_capture::MockCamera;
    use capture_session::{SessionConfig, SessionState};
    use recognition_client::{MockRecognitionService, RecognitionOutcome};
    use std::sync::Arc;
    use std::time::Duration;

    fn orchestrator(
        camera: MockCamera,
        service: Arc<MockRecognitionService>,
    ) -> SessionOrchestrator {
        SessionOrchestrator::new(SessionConfig::rapid(), Arc::new(camera), service).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_resets_session() {
        let service = Arc::new(MockRecognitionService::new());
        let mut orch = orchestrator(MockCamera::new(), service.clone());

        let report = register(&mut orch, "Ada", "s-001", 0, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(report.requested, 5);
        assert_eq!(report.successful, 5);
        assert_eq!(orch.state(), SessionState::Idle);
        assert_eq!(service.registration_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_retries_server_failures() {
        let service = Arc::new(MockRecognitionService::new());
        service.fail_registrations(Some(ServiceError::Timeout(30_000)));
        let mut orch = orchestrator(MockCamera::new(), service.clone());

        let err = register(&mut orch, "Ada", "s-001", 2, &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            KioskError::Session(SessionError::Network(ServiceError::Timeout(_)))
        ));
        assert_eq!(service.registration_calls(), 3);
        assert_eq!(orch.state(), SessionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_shutdown_cancels_sequence() {
        let service = Arc::new(MockRecognitionService::new());
        let mut orch = orchestrator(MockCamera::new(), service.clone());
        let shutdown = CancelToken::new();

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(700)).await;
            trigger.cancel();
        });

        let err = register(&mut orch, "Ada", "s-001", 0, &shutdown)
            .await
            .unwrap_err();
        assert!(matches!(err, KioskError::Session(SessionError::Cancelled)));
        assert_eq!(service.registration_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attend_waits_out_throttle() {
        let service = Arc::new(MockRecognitionService::new());
        service.push_probe_reply(Ok(vec![RecognitionOutcome::matched("s-001", "Ada", 0.92)]));
        service.push_probe_reply(Ok(vec![RecognitionOutcome::no_match(0.2)]));
        service.push_probe_reply(Ok(vec![RecognitionOutcome::matched("s-002", "Bo", 0.7)]));
        let mut orch = orchestrator(MockCamera::new(), service.clone());

        let started = tokio::time::Instant::now();
        let summary = attend(&mut orch, 3, &CancelToken::new()).await.unwrap();

        assert_eq!(
            summary,
            AttendanceSummary {
                probes: 3,
                marked: 2,
                unmatched: 1,
                failures: 0,
            }
        );
        assert_eq!(orch.ledger().len(), 2);
        assert_eq!(orch.ledger().entries().next().unwrap().student_id, "s-002");
        // Two throttled waits at the 500ms detection interval
        assert!(started.elapsed() >= Duration::from_millis(1000));
        assert_eq!(orch.state(), SessionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attend_counts_failures() {
        let service = Arc::new(MockRecognitionService::new());
        service.push_probe_reply(Err(ServiceError::Network("unreachable".into())));
        let mut orch = orchestrator(MockCamera::new().failing_on(&[0]), service.clone());

        let summary = attend(&mut orch, 3, &CancelToken::new()).await.unwrap();
        assert_eq!(summary.failures, 2);
        assert_eq!(summary.probes, 1);
        assert_eq!(service.probe_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_after_permission_denied() {
        let service = Arc::new(MockRecognitionService::new());
        let mut orch = orchestrator(MockCamera::new().denying_permission(), service.clone());

        for _ in 0..2 {
            let err = register(&mut orch, "Ada", "s-001", 0, &CancelToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, KioskError::Session(SessionError::PermissionDenied)));
            assert_eq!(orch.state(), SessionState::Idle);
        }
        assert_eq!(service.registration_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attend_after_permission_denied() {
        let service = Arc::new(MockRecognitionService::new());
        let mut orch = orchestrator(MockCamera::new().denying_permission(), service.clone());

        for _ in 0..2 {
            let err = attend(&mut orch, 2, &CancelToken::new()).await.unwrap_err();
            assert!(matches!(err, KioskError::Session(SessionError::PermissionDenied)));
            assert_eq!(orch.state(), SessionState::Idle);
        }
        assert!(orch.ledger().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_improve_resets_session() {
        let service = Arc::new(MockRecognitionService::new());
        let mut orch = orchestrator(MockCamera::new().failing_on(&[4]), service.clone());

        let report = improve(&mut orch, "s-001", 0, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(report.requested, 5);
        assert_eq!(report.successful, 4);
        assert_eq!(report.embeddings_added, 4);
        assert_eq!(orch.state(), SessionState::Idle);
        assert_eq!(service.improvement_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_improve_unknown_student_not_retried() {
        let service = Arc::new(MockRecognitionService::new());
        service.forget_student("s-404");
        let mut orch = orchestrator(MockCamera::new(), service.clone());

        let err = improve(&mut orch, "s-404", 3, &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            KioskError::Session(SessionError::Network(ServiceError::Http { status: 404, .. }))
        ));
        assert_eq!(service.improvement_calls(), 1);
        assert_eq!(orch.state(), SessionState::Idle);
    }
}
