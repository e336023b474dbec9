//! Camera Capture Library for the Attendance Kiosk
//!
//! Provides the camera collaborator seam used by capture sessions:
//! - `Camera` trait for permission requests and shutter actions
//! - Scoped `CameraLease` that releases the device on every exit path
//! - `CapturedFrame` / `FrameHandle` image handles
//! - `MockCamera` (scripted, for tests) and `ReplayCamera` (image directory)

pub mod frame;
pub mod lease;
pub mod mock;
pub mod replay;

pub use frame::{CapturedFrame, FrameHandle};
pub use lease::CameraLease;
pub use mock::MockCamera;
pub use replay::ReplayCamera;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("Camera returned an empty frame")]
    EmptyFrame,

    #[error("Camera not initialized")]
    NotInitialized,

    #[error("Frame read failed: {0}")]
    Read(String),
}

/// Which way the camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    /// Selfie camera, used for both registration and attendance
    #[default]
    Front,
    /// Rear camera, used when an operator points the device at a group
    Back,
}

/// Camera hardware collaborator.
///
/// Implementations own the platform handle. The session layer never calls
/// `open`/`release` directly; it goes through [`CameraLease`].
#[async_trait]
pub trait Camera: Send + Sync {
    /// Ask the user for camera access. May suspend on user interaction.
    async fn request_permission(&self) -> bool;

    /// Open the device for exclusive use.
    async fn open(&self) -> Result<(), CameraError>;

    /// Fire the shutter once.
    async fn capture_frame(&self) -> Result<FrameHandle, CameraError>;

    /// Release the device. Must be safe to call after a failed capture.
    fn release(&self);

    /// Facing reported in logs
    fn facing(&self) -> CameraFacing {
        CameraFacing::Front
    }
}
