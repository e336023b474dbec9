//! Capture Session Orchestrator
//!
//! Sequences camera actions for registration and attendance sessions:
//! - Explicit session state machine with a fixed transition table
//! - Timed multi-shot registration with cancellation
//! - Throttled, non-overlapping attendance probes
//! - Reconciliation of recognition results into the attendance ledger

pub mod config;
pub mod events;
pub mod orchestrator;
pub mod session;
pub mod state;

pub use config::SessionConfig;
pub use events::{DropReason, ProbeArm, SessionEvent, TriggerOutcome};
pub use orchestrator::SessionOrchestrator;
pub use session::CaptureSession;
pub use state::{SessionMode, SessionState};

use camera_capture::CameraError;
use capture_scheduler::SchedulerError;
use recognition_client::ServiceError;
use serde::Serialize;
use thiserror::Error;

/// Caller-side validation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error(
        "Only {captured} frames captured, need at least {required} (short by {})",
        shortfall(.captured, .required)
    )]
    InsufficientFrames { captured: u32, required: u32 },
}

fn shortfall(captured: &u32, required: &u32) -> u32 {
    required.saturating_sub(*captured)
}

/// Session configuration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("min_registration_frames must be within 1..={target}, got {value}")]
    MinRegistrationFrames { value: u32, target: u32 },

    #[error(
        "Confidence thresholds must lie within [0, 1] with high >= acceptance \
         (acceptance {acceptance}, high {high})"
    )]
    Thresholds { acceptance: f64, high: f64 },
}

/// Session error types
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("Capture failed: {0}")]
    Capture(#[from] CameraError),

    #[error("{0}")]
    Network(#[from] ServiceError),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid session transition: {from:?} -> {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },

    #[error("Operation requires a {expected:?} session")]
    WrongMode { expected: SessionMode },

    #[error("Session cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Outcome of a submitted registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationReport {
    pub student_id: String,
    pub name: String,
    /// Frames the session asked for
    pub requested: u32,
    /// Frames actually captured and uploaded
    pub successful: u32,
    /// Steps whose capture failed
    pub failed_steps: Vec<u32>,
    /// Embeddings the server stored
    pub embeddings_stored: u32,
    pub message: String,
}

impl RegistrationReport {
    /// Frames missing relative to the request
    pub fn short_by(&self) -> u32 {
        self.requested.saturating_sub(self.successful)
    }
}

/// Outcome of extra captures submitted for an enrolled student
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImprovementReport {
    pub student_id: String,
    pub requested: u32,
    pub successful: u32,
    pub failed_steps: Vec<u32>,
    /// New embeddings the server added
    pub embeddings_added: u32,
    /// Uploaded images the server could not embed
    pub rejected_images: u32,
    pub message: String,
}

impl ImprovementReport {
    pub fn short_by(&self) -> u32 {
        self.requested.saturating_sub(self.successful)
    }
}
