//! Attendance Kiosk
//!
//! Command-line front end for the capture session orchestrator: layered
//! configuration, logging setup, console rendering of session events, and
//! the registration, improvement and attendance run loops.

pub mod display;
pub mod runner;
pub mod settings;

pub use runner::{attend, improve, register, AttendanceSummary};
pub use settings::KioskConfig;

use camera_capture::CameraError;
use capture_session::{ConfigError as SessionConfigError, SessionError};
use recognition_client::ServiceError;
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Kiosk error types
#[derive(Error, Debug)]
pub enum KioskError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid capture settings: {0}")]
    SessionConfig(#[from] SessionConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("No camera source: pass --mock or set camera_dir")]
    NoCamera,

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

/// Initialize logging
pub fn init_logging(json: bool, verbose: bool) -> Result<(), KioskError> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    let result = if json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    };

    result.map_err(|e| KioskError::Logging(e.to_string()))
}
