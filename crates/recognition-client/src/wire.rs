//! Server reply decoding
//!
//! Replies use a `{ success, data, error }` envelope. Older servers return the
//! payload fields at the top level instead of under `data`; both are accepted.
//! Error replies may also be FastAPI-style `{ "detail": "..." }`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::types::{
    FailedImage, ImprovementOutcome, RecognitionOutcome, RegistrationOutcome, SystemStats,
};
use crate::ServiceError;

/// Decode an envelope and return its payload
pub fn decode_envelope<T: DeserializeOwned>(body: &[u8]) -> Result<T, ServiceError> {
    let mut value: Value =
        serde_json::from_slice(body).map_err(|e| ServiceError::Decode(e.to_string()))?;

    if value.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(ServiceError::Rejected(
            error_message(&value).unwrap_or_else(|| "request failed".to_string()),
        ));
    }

    let enveloped = value.get("data").map_or(false, |data| !data.is_null());
    let payload = if enveloped { value["data"].take() } else { value };

    serde_json::from_value(payload).map_err(|e| ServiceError::Decode(e.to_string()))
}

/// Build the error for a non-2xx reply
pub fn http_error(status: u16, body: &[u8]) -> ServiceError {
    let message = serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| error_message(&v))
        .unwrap_or_else(|| {
            let text = String::from_utf8_lossy(body);
            text.chars().take(200).collect()
        });
    ServiceError::Http { status, message }
}

fn error_message(value: &Value) -> Option<String> {
    ["error", "detail", "message"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

#[derive(Debug, Deserialize)]
struct StudentRef {
    student_id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct AttendancePayload {
    #[serde(default)]
    attendance_marked: bool,
    #[serde(default)]
    student: Option<StudentRef>,
    #[serde(default)]
    best_match: Option<StudentRef>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    attendance_id: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProbePayload {
    Batch { results: Vec<AttendancePayload> },
    Single(AttendancePayload),
}

/// Decode an attendance probe reply (single or batch) into outcomes
pub fn decode_probe(body: &[u8]) -> Result<Vec<RecognitionOutcome>, ServiceError> {
    let payloads = match decode_envelope::<ProbePayload>(body)? {
        ProbePayload::Batch { results } => results,
        ProbePayload::Single(payload) => vec![payload],
    };
    Ok(payloads.into_iter().map(into_outcome).collect())
}

fn into_outcome(payload: AttendancePayload) -> RecognitionOutcome {
    let occurred_at = payload
        .timestamp
        .as_deref()
        .and_then(parse_timestamp)
        .unwrap_or_else(Utc::now);

    // Unmatched replies still name the closest student for feedback
    let student = if payload.attendance_marked {
        payload.student
    } else {
        payload.best_match.or(payload.student)
    };
    let (student_id, name) = match student {
        Some(s) => (Some(s.student_id), Some(s.name)),
        None => (None, None),
    };

    RecognitionOutcome {
        matched: payload.attendance_marked,
        student_id,
        name,
        confidence: payload.confidence.unwrap_or(0.0),
        occurred_at,
        attendance_id: payload.attendance_id,
        message: payload.message,
    }
}

/// Accept RFC 3339 or a naive ISO-8601 timestamp (taken as UTC)
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    match NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(naive) => Some(naive.and_utc()),
        Err(e) => {
            debug!("Unparseable timestamp {:?}: {}", raw, e);
            None
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RegistrationSummary {
    #[serde(default)]
    total_images: u32,
    #[serde(default)]
    successful_embeddings: u32,
    #[serde(default)]
    failed_images: Vec<FailedImage>,
}

#[derive(Debug, Deserialize)]
struct RegistrationPayload {
    student_id: String,
    name: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    summary: Option<RegistrationSummary>,
    #[serde(flatten)]
    flat: RegistrationSummary,
}

/// Decode a registration reply
pub fn decode_registration(body: &[u8]) -> Result<RegistrationOutcome, ServiceError> {
    let payload: RegistrationPayload = decode_envelope(body)?;
    let summary = payload.summary.unwrap_or(payload.flat);
    let message = payload.message.unwrap_or_else(|| {
        format!(
            "Student registered with {} face embeddings",
            summary.successful_embeddings
        )
    });

    Ok(RegistrationOutcome {
        student_id: payload.student_id,
        name: payload.name,
        total_images: summary.total_images,
        successful_embeddings: summary.successful_embeddings,
        failed_images: summary.failed_images,
        message,
    })
}

#[derive(Debug, Deserialize)]
struct StatsPayload {
    stats: SystemStats,
}

/// Decode a statistics reply; the figures sit under `stats`
pub fn decode_stats(body: &[u8]) -> Result<SystemStats, ServiceError> {
    decode_envelope::<StatsPayload>(body).map(|payload| payload.stats)
}

#[derive(Debug, Deserialize)]
struct ImprovementPayload {
    #[serde(default)]
    student_id: Option<String>,
    #[serde(default)]
    added_embeddings: u32,
    #[serde(default)]
    failed_images: Vec<FailedImage>,
    #[serde(default)]
    message: Option<String>,
}

/// Decode an improvement reply. The server does not echo the student id, so
/// the caller supplies the one it uploaded for.
pub fn decode_improvement(
    body: &[u8],
    student_id: &str,
) -> Result<ImprovementOutcome, ServiceError> {
    let payload: ImprovementPayload = decode_envelope(body)?;
    let student_id = payload.student_id.unwrap_or_else(|| student_id.to_string());
    let message = payload.message.unwrap_or_else(|| {
        format!(
            "Added {} new embeddings for student {}",
            payload.added_embeddings, student_id
        )
    });

    Ok(ImprovementOutcome {
        student_id,
        added_embeddings: payload.added_embeddings,
        failed_images: payload.failed_images,
        message,
    })
}
