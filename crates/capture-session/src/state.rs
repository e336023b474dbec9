//! Session lifecycle states

use serde::{Deserialize, Serialize};

/// What a session is collecting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionMode {
    /// Multi-shot capture for enrolling a student
    Registration,
    /// Single probe frames matched against enrolled students
    Attendance,
    /// Extra multi-shot capture for a student who is already enrolled
    Improvement,
}

/// Capture session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Idle,
    PermissionPending,
    Active,
    CapturingSequence,
    AwaitingServerResult,
    Success,
    Cancelled,
    Error,
}

impl SessionState {
    /// Whether `self -> to` is a legal transition
    pub fn can_transition_to(self, to: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, to),
            (Idle, Active)
                | (Idle, PermissionPending)
                | (PermissionPending, Active)
                | (PermissionPending, Cancelled)
                | (Active, CapturingSequence)
                | (Active, AwaitingServerResult)
                | (Active, Cancelled)
                | (CapturingSequence, AwaitingServerResult)
                | (CapturingSequence, Cancelled)
                | (CapturingSequence, Error)
                | (AwaitingServerResult, Success)
                | (AwaitingServerResult, Error)
                | (AwaitingServerResult, Cancelled)
                | (Success, Idle)
                | (Error, Active)
                | (Error, Cancelled)
        )
    }

    /// No further transitions for this session instance
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Success | SessionState::Cancelled)
    }

    /// States that end camera ownership
    pub fn releases_camera(self) -> bool {
        matches!(
            self,
            SessionState::Success | SessionState::Cancelled | SessionState::Error
        )
    }

    /// States in which a cancel request applies
    pub fn is_cancellable(self) -> bool {
        self.can_transition_to(SessionState::Cancelled)
    }
}
