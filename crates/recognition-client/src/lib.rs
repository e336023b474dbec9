//! Recognition Service Client
//!
//! The remote recognition server owns face embedding, matching, and the
//! authoritative attendance record. This crate provides:
//! - `RecognitionService` collaborator trait used by capture sessions
//! - Outcome types for registration, improvement and attendance probes
//! - JSON envelope decoding for server replies
//! - `HttpRecognitionClient` (multipart upload over reqwest)
//! - `MockRecognitionService` for tests and offline demos

pub mod http;
pub mod mock;
pub mod types;
pub mod wire;

pub use http::{ClientConfig, HttpRecognitionClient};
pub use mock::MockRecognitionService;
pub use types::{
    AttendanceDay, AttendanceRecord, FailedImage, HealthStatus, ImprovementOutcome,
    RecognitionOutcome, RegistrationOutcome, StudentRoster, StudentSummary, SystemStats,
};

use async_trait::async_trait;
use camera_capture::CapturedFrame;
use thiserror::Error;

/// Recognition service error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Server rejected request: {0}")]
    Rejected(String),

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Frame unavailable: {0}")]
    Frame(String),
}

/// Remote recognition collaborator
#[async_trait]
pub trait RecognitionService: Send + Sync {
    /// Upload the registration frames in capture order
    async fn submit_registration(
        &self,
        name: &str,
        student_id: &str,
        frames: &[CapturedFrame],
    ) -> Result<RegistrationOutcome, ServiceError>;

    /// Upload extra frames for a student who is already enrolled
    async fn submit_improvement(
        &self,
        student_id: &str,
        frames: &[CapturedFrame],
    ) -> Result<ImprovementOutcome, ServiceError>;

    /// Upload one probe frame. Batch/multi-face servers return several outcomes.
    async fn submit_attendance_probe(
        &self,
        frame: &CapturedFrame,
    ) -> Result<Vec<RecognitionOutcome>, ServiceError>;
}
