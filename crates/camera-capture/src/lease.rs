//! Scoped camera ownership

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{Camera, CameraError, CapturedFrame};

/// Exclusive, scoped handle on an opened camera.
///
/// The device is released when the lease is dropped, whichever path ends the
/// session (success, cancel, error, or an early return on capture failure).
pub struct CameraLease {
    camera: Arc<dyn Camera>,
}

impl CameraLease {
    /// Open the camera and take ownership of it
    pub async fn acquire(camera: Arc<dyn Camera>) -> Result<Self, CameraError> {
        camera.open().await?;
        info!("Camera acquired ({:?})", camera.facing());
        Ok(Self { camera })
    }

    /// Fire the shutter once and stamp the frame with `sequence_index`.
    ///
    /// An empty handle is reported as [`CameraError::EmptyFrame`].
    pub async fn capture(&self, sequence_index: u32) -> Result<CapturedFrame, CameraError> {
        let handle = self.camera.capture_frame().await?;
        if handle.is_empty() {
            warn!("Capture {} returned an empty frame", sequence_index);
            return Err(CameraError::EmptyFrame);
        }
        debug!("Captured frame {}", sequence_index);
        Ok(CapturedFrame::new(handle, sequence_index))
    }
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        self.camera.release();
        info!("Camera released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockCamera;

    #[tokio::test]
    async fn test_lease_releases_on_drop() {
        let camera = Arc::new(MockCamera::new());
        {
            let lease = CameraLease::acquire(camera.clone()).await.unwrap();
            assert!(camera.is_open());
            lease.capture(0).await.unwrap();
        }
        assert!(!camera.is_open());
        assert_eq!(camera.release_count(), 1);
    }

    #[tokio::test]
    async fn test_lease_releases_after_failed_capture() {
        let camera = Arc::new(MockCamera::new().failing_on(&[0]));
        let result = async {
            let lease = CameraLease::acquire(camera.clone()).await?;
            lease.capture(0).await
        }
        .await;

        assert!(result.is_err());
        assert_eq!(camera.release_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_frame_is_capture_failure() {
        let camera = Arc::new(MockCamera::new().empty_on(&[0]));
        let lease = CameraLease::acquire(camera.clone()).await.unwrap();
        assert_eq!(lease.capture(0).await, Err(CameraError::EmptyFrame));
    }

    #[tokio::test]
    async fn test_open_failure_does_not_lease() {
        let camera = Arc::new(MockCamera::new().unavailable());
        assert!(CameraLease::acquire(camera.clone()).await.is_err());
        assert_eq!(camera.release_count(), 0);
    }
}
