//! HTTP recognition client
//!
//! Multipart uploads to the recognition server's REST API.

use async_trait::async_trait;
use camera_capture::CapturedFrame;
use chrono::{NaiveDate, SecondsFormat};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::types::{
    AttendanceDay, HealthStatus, ImprovementOutcome, RecognitionOutcome, RegistrationOutcome,
    StudentRoster, SystemStats,
};
use crate::wire::{
    decode_envelope, decode_improvement, decode_probe, decode_registration, decode_stats,
    http_error,
};
use crate::{RecognitionService, ServiceError};

/// Recognition server connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server base URL (e.g., "http://192.168.1.20:8000")
    pub base_url: String,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl ClientConfig {
    /// Join `path` onto the base URL
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Recognition service reached over HTTP
pub struct HttpRecognitionClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl HttpRecognitionClient {
    pub fn new(config: ClientConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ServiceError::Network(e.to_string()))?;
        info!("Recognition client targeting {}", config.base_url);
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Check that the server is reachable
    pub async fn health(&self) -> Result<HealthStatus, ServiceError> {
        let request = self.http.get(self.config.url("/health"));
        let body = self.send(request).await?;
        decode_envelope(&body)
    }

    /// Fetch the server's attendance records for one day
    pub async fn attendance_for_date(&self, date: NaiveDate) -> Result<AttendanceDay, ServiceError> {
        let path = format!("/attendance/{}", date.format("%Y-%m-%d"));
        let request = self.http.get(self.config.url(&path));
        let body = self.send(request).await?;
        decode_envelope(&body)
    }

    /// List enrolled students
    pub async fn students(&self) -> Result<StudentRoster, ServiceError> {
        let request = self.http.get(self.config.url("/students"));
        let body = self.send(request).await?;
        decode_envelope(&body)
    }

    /// Fetch recognition model statistics
    pub async fn stats(&self) -> Result<SystemStats, ServiceError> {
        let request = self.http.get(self.config.url("/stats"));
        let body = self.send(request).await?;
        decode_stats(&body)
    }

    async fn image_part(frame: &CapturedFrame, file_name: String) -> Result<Part, ServiceError> {
        let bytes = frame
            .handle
            .read_bytes()
            .await
            .map_err(|e| ServiceError::Frame(e.to_string()))?;
        Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("image/jpeg")
            .map_err(|e| ServiceError::Frame(e.to_string()))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Vec<u8>, ServiceError> {
        let response = request.send().await.map_err(|e| self.map_transport(e))?;
        let status = response.status();
        let body = response.bytes().await.map_err(|e| self.map_transport(e))?;
        debug!("Recognition server replied {} ({} bytes)", status, body.len());

        if !status.is_success() {
            let err = http_error(status.as_u16(), &body);
            warn!("Recognition server error: {}", err);
            return Err(err);
        }
        Ok(body.to_vec())
    }

    fn map_transport(&self, err: reqwest::Error) -> ServiceError {
        if err.is_timeout() {
            ServiceError::Timeout(self.config.timeout_ms)
        } else {
            ServiceError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl RecognitionService for HttpRecognitionClient {
    async fn submit_registration(
        &self,
        name: &str,
        student_id: &str,
        frames: &[CapturedFrame],
    ) -> Result<RegistrationOutcome, ServiceError> {
        let mut form = Form::new()
            .text("name", name.to_string())
            .text("student_id", student_id.to_string());
        for frame in frames {
            form = form.part("images", Self::image_part(frame, frame.file_name()).await?);
        }

        info!("Uploading {} registration images for {}", frames.len(), student_id);
        let request = self.http.post(self.config.url("/register")).multipart(form);
        let body = self.send(request).await?;
        decode_registration(&body)
    }

    async fn submit_improvement(
        &self,
        student_id: &str,
        frames: &[CapturedFrame],
    ) -> Result<ImprovementOutcome, ServiceError> {
        let mut form = Form::new().text("student_id", student_id.to_string());
        for (i, frame) in frames.iter().enumerate() {
            let part = Self::image_part(frame, format!("improve_{}.jpg", i)).await?;
            form = form.part("images", part);
        }

        info!("Uploading {} improvement images for {}", frames.len(), student_id);
        let request = self
            .http
            .post(self.config.url("/improve-recognition"))
            .multipart(form);
        let body = self.send(request).await?;
        decode_improvement(&body, student_id)
    }

    async fn submit_attendance_probe(
        &self,
        frame: &CapturedFrame,
    ) -> Result<Vec<RecognitionOutcome>, ServiceError> {
        let timestamp = frame.captured_at.to_rfc3339_opts(SecondsFormat::Millis, true);
        let form = Form::new()
            .part("image", Self::image_part(frame, frame.file_name()).await?)
            .text("timestamp", timestamp);

        debug!("Uploading attendance probe {}", frame.sequence_index);
        let request = self.http.post(self.config.url("/attendance")).multipart(form);
        let body = self.send(request).await?;
        decode_probe(&body)
    }
}
