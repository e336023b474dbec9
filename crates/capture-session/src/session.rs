//! Capture session instance

use camera_capture::{CameraLease, CapturedFrame};
use capture_scheduler::CancelToken;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::state::{SessionMode, SessionState};

/// One capture interaction from start to a terminal state.
///
/// Owns the camera lease, the registration frame buffer, and the in-flight
/// attendance probe. Dropping the session releases the camera.
pub struct CaptureSession {
    id: Uuid,
    mode: SessionMode,
    pub(crate) state: SessionState,
    started_at: DateTime<Utc>,
    pub(crate) frames: Vec<CapturedFrame>,
    pub(crate) in_flight: Option<CapturedFrame>,
    pub(crate) lease: Option<CameraLease>,
    pub(crate) cancel: CancelToken,
    pub(crate) message: Option<String>,
}

impl CaptureSession {
    pub(crate) fn new(mode: SessionMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            state: SessionState::Idle,
            started_at: Utc::now(),
            frames: Vec::new(),
            in_flight: None,
            lease: None,
            cancel: CancelToken::new(),
            message: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Registration frames buffered for submission, in capture order
    pub fn frames(&self) -> &[CapturedFrame] {
        &self.frames
    }

    /// Attendance probe awaiting its server result
    pub fn in_flight(&self) -> Option<&CapturedFrame> {
        self.in_flight.as_ref()
    }

    /// Whether this session currently owns the camera
    pub fn holds_camera(&self) -> bool {
        self.lease.is_some()
    }

    /// Last success or failure message
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Drop everything buffered for this session
    pub(crate) fn discard_buffers(&mut self) {
        self.frames.clear();
        self.in_flight = None;
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("started_at", &self.started_at)
            .field("frames", &self.frames.len())
            .field("in_flight", &self.in_flight.is_some())
            .field("holds_camera", &self.lease.is_some())
            .finish()
    }
}
