//! Capture Scheduler for Registration and Attendance Sessions
//!
//! Converts session timing configuration into shutter actions:
//! - Instruction sequencing (cyclic pose/expression prompts)
//! - Multi-shot registration loop with cancellable waits
//! - Throttle gate for single-shot attendance triggers

mod cancel;
mod scheduler;
mod sequencer;
mod throttle;

pub use cancel::{CancelToken, Timer, TokioTimer};
pub use scheduler::{
    CaptureSequence, RegistrationScheduler, SchedulerConfig, SchedulerEvent, SequenceOutcome,
};
pub use sequencer::{InstructionSequencer, InstructionStep};
pub use throttle::ThrottleGate;

use thiserror::Error;

/// Scheduler configuration errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// The instruction list must contain at least one step
    #[error("Instruction list is empty")]
    EmptyInstructions,

    /// A registration needs at least one capture
    #[error("Target image count must be at least 1, got {0}")]
    InvalidTarget(u32),
}
