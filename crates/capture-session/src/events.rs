//! Events published to the surrounding UI

use attendance_ledger::LedgerEvent;
use camera_capture::{CameraError, CapturedFrame};
use capture_scheduler::SchedulerEvent;
use std::time::Duration;

use crate::state::SessionState;

/// Why an attendance trigger was ignored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Inside the detection interval of the previous capture
    Throttled { remaining: Duration },
    /// A previous probe is still awaiting its result
    InFlight,
}

/// Session notifications
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    /// Registration prompt now showing
    Instruction { step: u32, text: String },
    /// Frames captured so far against the target
    Progress { captured: u32, target: u32 },
    /// A shutter action failed
    CaptureFailed { step: u32, reason: String },
    TriggerDropped(DropReason),
    Ledger(LedgerEvent),
    /// Terminal success with a human-readable message
    Completed { message: String },
    /// Session failure with a human-readable message
    Failed { message: String },
}

impl From<SchedulerEvent> for SessionEvent {
    fn from(event: SchedulerEvent) -> Self {
        match event {
            SchedulerEvent::Instruction { step, text } => SessionEvent::Instruction { step, text },
            SchedulerEvent::Captured {
                captured, target, ..
            } => SessionEvent::Progress { captured, target },
            SchedulerEvent::CaptureFailed { step, reason } => SessionEvent::CaptureFailed {
                step,
                reason: reason.to_string(),
            },
        }
    }
}

/// Result of the capture half of an attendance trigger
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeArm {
    /// Frame captured; the session now awaits the server result
    Armed(CapturedFrame),
    /// Trigger ignored, state unchanged
    Dropped(DropReason),
}

/// Result of a full attendance trigger
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    /// Server answered; one ledger event per outcome, in order
    Recognized(Vec<LedgerEvent>),
    /// Trigger ignored, state unchanged
    Dropped(DropReason),
}

impl TriggerOutcome {
    pub fn is_dropped(&self) -> bool {
        matches!(self, TriggerOutcome::Dropped(_))
    }
}

pub(crate) fn capture_failed(step: u32, reason: &CameraError) -> SessionEvent {
    SessionEvent::CaptureFailed {
        step,
        reason: reason.to_string(),
    }
}
