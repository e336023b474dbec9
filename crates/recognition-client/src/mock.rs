//! In-process recognition service for tests and offline demos

use async_trait::async_trait;
use camera_capture::CapturedFrame;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use crate::types::{ImprovementOutcome, RecognitionOutcome, RegistrationOutcome};
use crate::{RecognitionService, ServiceError};

/// Mock recognition service.
///
/// Probe replies are served from a queue; an empty queue answers "no match".
/// Registration replies echo the uploaded frame count unless a failure is
/// scripted.
pub struct MockRecognitionService {
    probe_replies: Mutex<VecDeque<Result<Vec<RecognitionOutcome>, ServiceError>>>,
    registration_failure: Mutex<Option<ServiceError>>,
    latency: Duration,
    registration_calls: AtomicU32,
    improvement_calls: AtomicU32,
    probe_calls: AtomicU32,
    last_registration: Mutex<Option<Vec<u32>>>,
    unknown_students: Mutex<Vec<String>>,
}

impl MockRecognitionService {
    pub fn new() -> Self {
        Self {
            probe_replies: Mutex::new(VecDeque::new()),
            registration_failure: Mutex::new(None),
            latency: Duration::ZERO,
            registration_calls: AtomicU32::new(0),
            improvement_calls: AtomicU32::new(0),
            probe_calls: AtomicU32::new(0),
            last_registration: Mutex::new(None),
            unknown_students: Mutex::new(Vec::new()),
        }
    }

    /// Simulate network latency on every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue the reply for the next attendance probe
    pub fn push_probe_reply(&self, reply: Result<Vec<RecognitionOutcome>, ServiceError>) {
        if let Ok(mut replies) = self.probe_replies.lock() {
            replies.push_back(reply);
        }
    }

    /// Make registrations fail with `err` until cleared
    pub fn fail_registrations(&self, err: Option<ServiceError>) {
        if let Ok(mut failure) = self.registration_failure.lock() {
            *failure = err;
        }
    }

    /// Answer improvement uploads for `student_id` with 404 "Student not found"
    pub fn forget_student(&self, student_id: &str) {
        if let Ok(mut unknown) = self.unknown_students.lock() {
            unknown.push(student_id.to_string());
        }
    }

    pub fn registration_calls(&self) -> u32 {
        self.registration_calls.load(Ordering::SeqCst)
    }

    pub fn improvement_calls(&self) -> u32 {
        self.improvement_calls.load(Ordering::SeqCst)
    }

    pub fn probe_calls(&self) -> u32 {
        self.probe_calls.load(Ordering::SeqCst)
    }

    /// Sequence indexes of the frames in the last registration or improvement upload
    pub fn last_registration(&self) -> Option<Vec<u32>> {
        self.last_registration.lock().ok().and_then(|last| last.clone())
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl Default for MockRecognitionService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecognitionService for MockRecognitionService {
    async fn submit_registration(
        &self,
        name: &str,
        student_id: &str,
        frames: &[CapturedFrame],
    ) -> Result<RegistrationOutcome, ServiceError> {
        self.registration_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_registration.lock() {
            *last = Some(frames.iter().map(|f| f.sequence_index).collect());
        }
        self.simulate_latency().await;

        let failure = self.registration_failure.lock().ok().and_then(|f| f.clone());
        if let Some(err) = failure {
            return Err(err);
        }

        debug!("Mock registered {} with {} frames", student_id, frames.len());
        Ok(RegistrationOutcome {
            student_id: student_id.to_string(),
            name: name.to_string(),
            total_images: frames.len() as u32,
            successful_embeddings: frames.len() as u32,
            failed_images: Vec::new(),
            message: format!("Student registered with {} face embeddings", frames.len()),
        })
    }

    async fn submit_improvement(
        &self,
        student_id: &str,
        frames: &[CapturedFrame],
    ) -> Result<ImprovementOutcome, ServiceError> {
        self.improvement_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_registration.lock() {
            *last = Some(frames.iter().map(|f| f.sequence_index).collect());
        }
        self.simulate_latency().await;

        let unknown = self
            .unknown_students
            .lock()
            .map(|u| u.iter().any(|s| s == student_id))
            .unwrap_or(false);
        if unknown {
            return Err(ServiceError::Http {
                status: 404,
                message: "Student not found".to_string(),
            });
        }
        if frames.is_empty() {
            return Err(ServiceError::Http {
                status: 400,
                message: "No valid embeddings generated from provided images".to_string(),
            });
        }

        debug!("Mock improved {} with {} frames", student_id, frames.len());
        Ok(ImprovementOutcome {
            student_id: student_id.to_string(),
            added_embeddings: frames.len() as u32,
            failed_images: Vec::new(),
            message: format!(
                "Added {} new embeddings for student {}",
                frames.len(),
                student_id
            ),
        })
    }

    async fn submit_attendance_probe(
        &self,
        frame: &CapturedFrame,
    ) -> Result<Vec<RecognitionOutcome>, ServiceError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let reply = self.probe_replies.lock().ok().and_then(|mut r| r.pop_front());
        debug!("Mock probe {} answered", frame.sequence_index);
        reply.unwrap_or_else(|| Ok(vec![RecognitionOutcome::no_match(0.0)]))
    }
}
