//! Outcome types produced by the recognition service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of matching one face against registered students
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionOutcome {
    pub matched: bool,
    pub student_id: Option<String>,
    pub name: Option<String>,
    /// Server confidence, expected in [0, 1]
    pub confidence: f64,
    pub occurred_at: DateTime<Utc>,
    /// Server-side attendance record id when attendance was marked
    pub attendance_id: Option<String>,
    pub message: Option<String>,
}

impl RecognitionOutcome {
    /// A positive match
    pub fn matched(student_id: impl Into<String>, name: impl Into<String>, confidence: f64) -> Self {
        Self {
            matched: true,
            student_id: Some(student_id.into()),
            name: Some(name.into()),
            confidence,
            occurred_at: Utc::now(),
            attendance_id: None,
            message: None,
        }
    }

    /// No registered face was close enough
    pub fn no_match(confidence: f64) -> Self {
        Self {
            matched: false,
            student_id: None,
            name: None,
            confidence,
            occurred_at: Utc::now(),
            attendance_id: None,
            message: None,
        }
    }

    pub fn with_attendance_id(mut self, id: impl Into<String>) -> Self {
        self.attendance_id = Some(id.into());
        self
    }
}

/// An image the server could not embed
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FailedImage {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub error: String,
}

/// Server summary of a registration upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationOutcome {
    pub student_id: String,
    pub name: String,
    pub total_images: u32,
    pub successful_embeddings: u32,
    pub failed_images: Vec<FailedImage>,
    pub message: String,
}

/// Server health probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub total_students: Option<u64>,
    #[serde(default)]
    pub model: Option<String>,
}

/// One stored attendance record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: String,
    pub student_id: String,
    #[serde(default)]
    pub check_in: Option<String>,
}

/// Attendance records for one calendar day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceDay {
    pub date: String,
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub attendance: Vec<AttendanceRecord>,
}

/// One enrolled student as listed by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentSummary {
    /// Server record id
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub student_id: String,
    #[serde(default)]
    pub image_count: u32,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Enrolled students
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StudentRoster {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub students: Vec<StudentSummary>,
}

/// Recognition model statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub total_students: u64,
    pub total_embeddings: u64,
    #[serde(default)]
    pub model_name: Option<String>,
    /// Server-side match threshold in [0, 1]
    #[serde(default)]
    pub confidence_threshold: f64,
    #[serde(default)]
    pub average_embeddings_per_student: f64,
}

/// Server summary of an improvement upload for an enrolled student
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImprovementOutcome {
    pub student_id: String,
    pub added_embeddings: u32,
    pub failed_images: Vec<FailedImage>,
    pub message: String,
}
