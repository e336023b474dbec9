//! Scripted camera for tests and demos

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::{Camera, CameraError, FrameHandle};

/// Mock camera (no hardware required).
///
/// Shutter calls are numbered from zero; individual calls can be scripted to
/// fail or return an empty handle.
pub struct MockCamera {
    permission: AtomicBool,
    available: bool,
    failing: HashSet<u32>,
    empty: HashSet<u32>,
    capture_delay: Duration,
    open: AtomicBool,
    captures: AtomicU32,
    releases: AtomicU32,
    permission_requests: AtomicU32,
}

impl MockCamera {
    /// Create a camera that grants permission and always captures
    pub fn new() -> Self {
        Self {
            permission: AtomicBool::new(true),
            available: true,
            failing: HashSet::new(),
            empty: HashSet::new(),
            capture_delay: Duration::ZERO,
            open: AtomicBool::new(false),
            captures: AtomicU32::new(0),
            releases: AtomicU32::new(0),
            permission_requests: AtomicU32::new(0),
        }
    }

    /// Deny permission until [`MockCamera::set_permission`] is called
    pub fn denying_permission(self) -> Self {
        self.permission.store(false, Ordering::SeqCst);
        self
    }

    /// Fail the given shutter calls with a capture error
    pub fn failing_on(mut self, calls: &[u32]) -> Self {
        self.failing.extend(calls);
        self
    }

    /// Return an empty handle on the given shutter calls
    pub fn empty_on(mut self, calls: &[u32]) -> Self {
        self.empty.extend(calls);
        self
    }

    /// Make `open` fail
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Simulate hardware latency on every shutter call
    pub fn with_capture_delay(mut self, delay: Duration) -> Self {
        self.capture_delay = delay;
        self
    }

    /// Change the answer to the next permission request
    pub fn set_permission(&self, granted: bool) {
        self.permission.store(granted, Ordering::SeqCst);
    }

    /// Whether the device is currently held open
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Number of shutter calls so far
    pub fn capture_count(&self) -> u32 {
        self.captures.load(Ordering::SeqCst)
    }

    /// Number of releases so far
    pub fn release_count(&self) -> u32 {
        self.releases.load(Ordering::SeqCst)
    }

    /// Number of permission prompts shown so far
    pub fn permission_requests(&self) -> u32 {
        self.permission_requests.load(Ordering::SeqCst)
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Camera for MockCamera {
    async fn request_permission(&self) -> bool {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        self.permission.load(Ordering::SeqCst)
    }

    async fn open(&self) -> Result<(), CameraError> {
        if !self.available {
            return Err(CameraError::Open("mock camera unavailable".to_string()));
        }
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn capture_frame(&self) -> Result<FrameHandle, CameraError> {
        if !self.is_open() {
            return Err(CameraError::NotInitialized);
        }
        if !self.capture_delay.is_zero() {
            tokio::time::sleep(self.capture_delay).await;
        }

        let call = self.captures.fetch_add(1, Ordering::SeqCst);
        debug!("Mock shutter call {}", call);

        if self.failing.contains(&call) {
            return Err(CameraError::Capture(format!("mock failure on call {}", call)));
        }
        if self.empty.contains(&call) {
            return Ok(FrameHandle::Uri(String::new()));
        }
        Ok(FrameHandle::Uri(format!("mock://frame/{}", call)))
    }

    fn release(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}
