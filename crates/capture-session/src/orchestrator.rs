//! Session orchestrator
//!
//! Owns the single active capture session and drives it through the state
//! table in [`crate::state`]. All session mutation happens through `&mut self`,
//! so there is one logical thread of control; callers that need to interrupt
//! a running registration or probe use the token from
//! [`SessionOrchestrator::cancel_handle`].

use attendance_ledger::{AttendanceLedger, Reconciler};
use camera_capture::{Camera, CameraError, CameraLease, CapturedFrame};
use capture_scheduler::{
    CancelToken, RegistrationScheduler, SequenceOutcome, ThrottleGate, Timer, TokioTimer,
};
use recognition_client::{RecognitionOutcome, RecognitionService, ServiceError};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::events::{capture_failed, DropReason, ProbeArm, SessionEvent, TriggerOutcome};
use crate::session::CaptureSession;
use crate::state::{SessionMode, SessionState};
use crate::{ConfigError, ImprovementReport, RegistrationReport, SessionError, ValidationError};

const EVENT_CAPACITY: usize = 256;

/// Counts for a captured sequence awaiting upload
struct CapturedBatch {
    requested: u32,
    successful: u32,
    failed_steps: Vec<u32>,
}

impl CapturedBatch {
    /// Append the shortfall to a server message
    fn annotate(&self, message: &str) -> String {
        if self.successful < self.requested {
            format!(
                "{} ({} of {} images captured)",
                message, self.successful, self.requested
            )
        } else {
            message.to_string()
        }
    }
}

/// Capture session orchestrator
pub struct SessionOrchestrator {
    config: SessionConfig,
    camera: Arc<dyn Camera>,
    service: Arc<dyn RecognitionService>,
    scheduler: RegistrationScheduler,
    throttle: ThrottleGate,
    reconciler: Reconciler,
    session: Option<CaptureSession>,
    events: broadcast::Sender<SessionEvent>,
    probes_sent: u32,
}

impl SessionOrchestrator {
    /// Create an orchestrator on the tokio clock
    pub fn new(
        config: SessionConfig,
        camera: Arc<dyn Camera>,
        service: Arc<dyn RecognitionService>,
    ) -> Result<Self, SessionError> {
        Self::with_timer(config, camera, service, Arc::new(TokioTimer))
    }

    /// Create an orchestrator on a caller-supplied clock
    pub fn with_timer(
        config: SessionConfig,
        camera: Arc<dyn Camera>,
        service: Arc<dyn RecognitionService>,
        timer: Arc<dyn Timer>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let sequencer = config.sequencer().map_err(ConfigError::from)?;
        let scheduler =
            RegistrationScheduler::with_timer(config.scheduler.clone(), sequencer, timer)
                .map_err(ConfigError::from)?;
        let throttle = ThrottleGate::new(config.scheduler.detection_interval());
        let reconciler = Reconciler::new(config.reconciler.clone());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            config,
            camera,
            service,
            scheduler,
            throttle,
            reconciler,
            session: None,
            events,
            probes_sent: 0,
        })
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Current state; `Idle` when no session exists
    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(SessionState::Idle)
    }

    pub fn session(&self) -> Option<&CaptureSession> {
        self.session.as_ref()
    }

    /// Registration progress as (captured, target)
    pub fn progress(&self) -> (u32, u32) {
        let captured = self
            .session
            .as_ref()
            .map(|s| s.frames.len() as u32)
            .unwrap_or(0);
        (captured, self.config.scheduler.target_images)
    }

    /// Accepted attendance markings, most recent first
    pub fn ledger(&self) -> &AttendanceLedger {
        self.reconciler.ledger()
    }

    /// Explicit user clear of the ledger
    pub fn clear_ledger(&mut self) {
        info!("Clearing attendance ledger ({} entries)", self.reconciler.ledger().len());
        self.reconciler.clear_ledger();
    }

    /// Token that interrupts the current session at its next suspension point
    pub fn cancel_handle(&self) -> Option<CancelToken> {
        self.session.as_ref().map(|s| s.cancel.clone())
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start a new session.
    ///
    /// Requests camera permission; on denial the session waits in
    /// `PermissionPending` and [`SessionOrchestrator::retry_permission`] can
    /// ask again.
    pub async fn start(&mut self, mode: SessionMode) -> Result<SessionState, SessionError> {
        if let Some(session) = &self.session {
            return Err(SessionError::InvalidTransition {
                from: session.state,
                to: SessionState::Active,
            });
        }

        let session = CaptureSession::new(mode);
        info!("Starting {:?} session {}", mode, session.id());
        self.session = Some(session);

        if self.camera.request_permission().await {
            self.activate().await
        } else {
            warn!("Camera permission denied");
            self.transition(SessionState::PermissionPending)?;
            self.fail_message("Camera permission is required");
            Err(SessionError::PermissionDenied)
        }
    }

    /// Ask for camera permission again after a denial
    pub async fn retry_permission(&mut self) -> Result<SessionState, SessionError> {
        self.expect_state(SessionState::PermissionPending, SessionState::Active)?;

        if self.camera.request_permission().await {
            self.activate().await
        } else {
            warn!("Camera permission denied again");
            Err(SessionError::PermissionDenied)
        }
    }

    /// Leave `Error` and return to `Active` without a new permission prompt
    pub async fn retry(&mut self) -> Result<SessionState, SessionError> {
        self.expect_state(SessionState::Error, SessionState::Active)?;
        info!("Retrying session after error");
        self.activate().await
    }

    /// Acquire the camera and enter `Active`
    async fn activate(&mut self) -> Result<SessionState, SessionError> {
        let lease = match CameraLease::acquire(self.camera.clone()).await {
            Ok(lease) => lease,
            Err(e) => {
                error!("Camera unavailable: {}", e);
                self.fail_message(&e.to_string());
                if self.state() == SessionState::Idle {
                    // Never became active; nothing to keep
                    self.session = None;
                }
                return Err(SessionError::Capture(e));
            }
        };

        if let Some(session) = self.session.as_mut() {
            session.lease = Some(lease);
        }
        self.transition(SessionState::Active)?;
        Ok(SessionState::Active)
    }

    /// Cancel the current session from outside a running operation
    pub fn cancel(&mut self) -> bool {
        let Some(session) = self.session.as_ref() else {
            return false;
        };
        if !session.state.is_cancellable() {
            debug!("Cancel ignored in {:?}", session.state);
            return false;
        }
        session.cancel.cancel();
        self.finish_cancelled();
        true
    }

    /// Destroy the current session and return to `Idle`.
    ///
    /// Session-scoped buffers go with the session; the ledger is kept.
    pub fn reset(&mut self) -> SessionState {
        if let Some(session) = self.session.take() {
            session.cancel.cancel();
            info!("Session {} reset from {:?}", session.id(), session.state);
            self.emit(SessionEvent::StateChanged {
                from: session.state,
                to: SessionState::Idle,
            });
        }
        SessionState::Idle
    }

    /// Run the timed registration capture sequence and submit the frames.
    ///
    /// Capture failures are skipped; a short sequence is still submitted when
    /// it meets `min_registration_frames`, and the report says how short.
    pub async fn run_registration(
        &mut self,
        name: &str,
        student_id: &str,
    ) -> Result<RegistrationReport, SessionError> {
        let batch = self.capture_batch(SessionMode::Registration).await?;

        let service = self.service.clone();
        let result = {
            let session = self.active_session()?;
            info!(
                "Submitting registration for {} ({}/{} frames)",
                student_id, batch.successful, batch.requested
            );
            session
                .cancel
                .run_until_cancelled(service.submit_registration(name, student_id, &session.frames))
                .await
        };

        match result {
            None => {
                self.finish_cancelled();
                Err(SessionError::Cancelled)
            }
            Some(Ok(outcome)) => {
                let message = batch.annotate(&outcome.message);
                let report = RegistrationReport {
                    student_id: outcome.student_id,
                    name: outcome.name,
                    requested: batch.requested,
                    successful: batch.successful,
                    failed_steps: batch.failed_steps,
                    embeddings_stored: outcome.successful_embeddings,
                    message: message.clone(),
                };
                self.transition(SessionState::Success)?;
                self.complete_message(&message);
                Ok(report)
            }
            Some(Err(e)) => self.fail_network(e),
        }
    }

    /// Capture another timed sequence for an enrolled student and submit it
    /// to strengthen their recognition.
    ///
    /// Same capture rules as [`SessionOrchestrator::run_registration`].
    pub async fn run_improvement(
        &mut self,
        student_id: &str,
    ) -> Result<ImprovementReport, SessionError> {
        let batch = self.capture_batch(SessionMode::Improvement).await?;

        let service = self.service.clone();
        let result = {
            let session = self.active_session()?;
            info!(
                "Submitting {} extra frames for {}",
                batch.successful, student_id
            );
            session
                .cancel
                .run_until_cancelled(service.submit_improvement(student_id, &session.frames))
                .await
        };

        match result {
            None => {
                self.finish_cancelled();
                Err(SessionError::Cancelled)
            }
            Some(Ok(outcome)) => {
                let message = batch.annotate(&outcome.message);
                let report = ImprovementReport {
                    student_id: outcome.student_id,
                    requested: batch.requested,
                    successful: batch.successful,
                    failed_steps: batch.failed_steps,
                    embeddings_added: outcome.added_embeddings,
                    rejected_images: outcome.failed_images.len() as u32,
                    message: message.clone(),
                };
                self.transition(SessionState::Success)?;
                self.complete_message(&message);
                Ok(report)
            }
            Some(Err(e)) => self.fail_network(e),
        }
    }

    /// Run the capture loop and leave the frames buffered in
    /// `AwaitingServerResult`, or fail the session when too few were taken.
    async fn capture_batch(&mut self, mode: SessionMode) -> Result<CapturedBatch, SessionError> {
        self.expect_mode(mode)?;
        self.expect_state(SessionState::Active, SessionState::CapturingSequence)?;

        if let Some(session) = self.session.as_mut() {
            session.frames.clear();
        }
        self.transition(SessionState::CapturingSequence)?;

        let outcome = {
            let session = self.active_session()?;
            let lease = session.lease.as_ref().ok_or(CameraError::NotInitialized)?;
            let events = self.events.clone();
            self.scheduler
                .run(lease, &session.cancel, |event| {
                    let _ = events.send(SessionEvent::from(event));
                })
                .await
        };

        let sequence = match outcome {
            SequenceOutcome::Cancelled { .. } => {
                self.finish_cancelled();
                return Err(SessionError::Cancelled);
            }
            SequenceOutcome::Completed(sequence) => sequence,
        };

        let required = self.config.min_registration_frames;
        if sequence.successful() < required {
            let err = ValidationError::InsufficientFrames {
                captured: sequence.successful(),
                required,
            };
            warn!("{:?} upload not submitted: {}", mode, err);
            self.transition(SessionState::Error)?;
            self.fail_message(&err.to_string());
            return Err(err.into());
        }

        let batch = CapturedBatch {
            requested: sequence.requested,
            successful: sequence.successful(),
            failed_steps: sequence.failed_steps,
        };
        if let Some(session) = self.session.as_mut() {
            session.frames = sequence.frames;
        }
        self.transition(SessionState::AwaitingServerResult)?;
        Ok(batch)
    }

    /// Fire one attendance probe and apply the server result.
    ///
    /// Returns `Dropped` without side effects when the previous probe is
    /// still in flight or the detection interval has not elapsed.
    pub async fn trigger_attendance(&mut self) -> Result<TriggerOutcome, SessionError> {
        let frame = match self.begin_probe().await? {
            ProbeArm::Armed(frame) => frame,
            ProbeArm::Dropped(reason) => return Ok(TriggerOutcome::Dropped(reason)),
        };

        let cancel = self.active_session()?.cancel.clone();
        let service = self.service.clone();
        match cancel
            .run_until_cancelled(service.submit_attendance_probe(&frame))
            .await
        {
            None => {
                self.finish_cancelled();
                Err(SessionError::Cancelled)
            }
            Some(result) => self.complete_probe(result),
        }
    }

    /// Capture half of an attendance trigger.
    ///
    /// On success the session is `AwaitingServerResult` holding the probe
    /// frame; the caller delivers the server reply through
    /// [`SessionOrchestrator::complete_probe`].
    pub async fn begin_probe(&mut self) -> Result<ProbeArm, SessionError> {
        self.expect_mode(SessionMode::Attendance)?;

        let state = self.state();
        if state == SessionState::AwaitingServerResult {
            debug!("Attendance trigger dropped: probe in flight");
            return Ok(self.drop_trigger(DropReason::InFlight));
        }
        if state != SessionState::Active {
            return Err(SessionError::InvalidTransition {
                from: state,
                to: SessionState::AwaitingServerResult,
            });
        }

        let now = self.scheduler.timer().now();
        if let Err(remaining) = self.throttle.check(now) {
            debug!("Attendance trigger dropped: throttled for {:?}", remaining);
            return Ok(self.drop_trigger(DropReason::Throttled { remaining }));
        }

        let sequence_index = self.probes_sent;
        let captured = {
            let session = self.active_session()?;
            let lease = session.lease.as_ref().ok_or(CameraError::NotInitialized)?;
            session
                .cancel
                .run_until_cancelled(lease.capture(sequence_index))
                .await
        };

        let frame = match captured {
            None => {
                self.finish_cancelled();
                return Err(SessionError::Cancelled);
            }
            Some(Err(e)) => {
                warn!("Attendance capture failed: {}", e);
                self.emit(capture_failed(sequence_index, &e));
                return Err(SessionError::Capture(e));
            }
            Some(Ok(frame)) => frame,
        };

        self.probes_sent += 1;
        self.throttle.record(now);
        if let Some(session) = self.session.as_mut() {
            session.in_flight = Some(frame.clone());
        }
        self.transition(SessionState::AwaitingServerResult)?;
        Ok(ProbeArm::Armed(frame))
    }

    /// Apply the server reply for the in-flight probe
    pub fn complete_probe(
        &mut self,
        result: Result<Vec<RecognitionOutcome>, ServiceError>,
    ) -> Result<TriggerOutcome, SessionError> {
        self.expect_mode(SessionMode::Attendance)?;
        self.expect_state(SessionState::AwaitingServerResult, SessionState::Success)?;
        if let Some(session) = self.session.as_mut() {
            session.in_flight = None;
        }

        match result {
            Ok(outcomes) => {
                self.transition(SessionState::Success)?;
                let events = self.reconciler.reconcile(&outcomes);
                for event in &events {
                    self.emit(SessionEvent::Ledger(event.clone()));
                }
                let accepted = events
                    .iter()
                    .filter(|e| matches!(e, attendance_ledger::LedgerEvent::Appended { .. }))
                    .count();
                let message = if accepted == 0 {
                    "No matching student found".to_string()
                } else {
                    format!("Attendance marked for {} student(s)", accepted)
                };
                self.complete_message(&message);
                Ok(TriggerOutcome::Recognized(events))
            }
            Err(e) => self.fail_network(e),
        }
    }

    /// End the current attendance session and open the next one
    pub async fn next_attendance(&mut self) -> Result<SessionState, SessionError> {
        self.expect_mode(SessionMode::Attendance)?;
        self.reset();
        self.start(SessionMode::Attendance).await
    }

    fn drop_trigger(&self, reason: DropReason) -> ProbeArm {
        self.emit(SessionEvent::TriggerDropped(reason.clone()));
        ProbeArm::Dropped(reason)
    }

    fn fail_network<T>(&mut self, err: ServiceError) -> Result<T, SessionError> {
        error!("Recognition request failed: {}", err);
        self.transition(SessionState::Error)?;
        self.fail_message(&err.to_string());
        Err(SessionError::Network(err))
    }

    fn finish_cancelled(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.discard_buffers();
        }
        if let Err(e) = self.transition(SessionState::Cancelled) {
            debug!("Cancel transition skipped: {}", e);
        }
    }

    fn transition(&mut self, to: SessionState) -> Result<(), SessionError> {
        let Some(session) = self.session.as_mut() else {
            return Err(SessionError::InvalidTransition {
                from: SessionState::Idle,
                to,
            });
        };

        let from = session.state;
        if !from.can_transition_to(to) {
            return Err(SessionError::InvalidTransition { from, to });
        }

        session.state = to;
        if to == SessionState::Cancelled {
            session.discard_buffers();
        }
        if to.releases_camera() {
            // Dropping the lease releases the device
            session.lease = None;
        }
        info!("Session {}: {:?} -> {:?}", session.id(), from, to);
        self.emit(SessionEvent::StateChanged { from, to });
        Ok(())
    }

    fn expect_state(&self, expected: SessionState, to: SessionState) -> Result<(), SessionError> {
        let from = self.state();
        if from != expected {
            return Err(SessionError::InvalidTransition { from, to });
        }
        Ok(())
    }

    fn expect_mode(&self, expected: SessionMode) -> Result<(), SessionError> {
        match &self.session {
            Some(session) if session.mode() == expected => Ok(()),
            Some(_) => Err(SessionError::WrongMode { expected }),
            None => Err(SessionError::InvalidTransition {
                from: SessionState::Idle,
                to: SessionState::Active,
            }),
        }
    }

    fn active_session(&self) -> Result<&CaptureSession, SessionError> {
        self.session.as_ref().ok_or(SessionError::InvalidTransition {
            from: SessionState::Idle,
            to: SessionState::Active,
        })
    }

    fn complete_message(&mut self, message: &str) {
        if let Some(session) = self.session.as_mut() {
            session.message = Some(message.to_string());
        }
        self.emit(SessionEvent::Completed {
            message: message.to_string(),
        });
    }

    fn fail_message(&mut self, message: &str) {
        if let Some(session) = self.session.as_mut() {
            session.message = Some(message.to_string());
        }
        self.emit(SessionEvent::Failed {
            message: message.to_string(),
        });
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Frame of the probe awaiting a result, if any
    pub fn in_flight_probe(&self) -> Option<&CapturedFrame> {
        self.session.as_ref().and_then(|s| s.in_flight())
    }
}
