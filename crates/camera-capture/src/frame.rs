//! Captured frame types

use chrono::{DateTime, Utc};

use crate::CameraError;

/// Opaque image handle returned by the camera
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameHandle {
    /// Platform URI or file path of an encoded image
    Uri(String),
    /// Encoded image bytes (JPEG/PNG)
    Bytes(Vec<u8>),
}

impl FrameHandle {
    /// A handle with no image behind it counts as a failed capture
    pub fn is_empty(&self) -> bool {
        match self {
            FrameHandle::Uri(uri) => uri.trim().is_empty(),
            FrameHandle::Bytes(bytes) => bytes.is_empty(),
        }
    }

    /// Load the encoded image bytes for upload
    pub async fn read_bytes(&self) -> Result<Vec<u8>, CameraError> {
        match self {
            FrameHandle::Bytes(bytes) => Ok(bytes.clone()),
            FrameHandle::Uri(uri) => {
                let path = uri.strip_prefix("file://").unwrap_or(uri);
                tokio::fs::read(path)
                    .await
                    .map_err(|e| CameraError::Read(format!("{}: {}", path, e)))
            }
        }
    }
}

/// A frame produced by one shutter action
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    /// Image data handle
    pub handle: FrameHandle,
    /// Capture step index within the session (strictly increasing)
    pub sequence_index: u32,
    /// Wall-clock capture time
    pub captured_at: DateTime<Utc>,
}

impl CapturedFrame {
    /// Create a frame stamped with the current time
    pub fn new(handle: FrameHandle, sequence_index: u32) -> Self {
        Self {
            handle,
            sequence_index,
            captured_at: Utc::now(),
        }
    }

    /// Decode the image header and return (width, height).
    ///
    /// Only in-memory handles are inspected; URI handles return `None`.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match &self.handle {
            FrameHandle::Bytes(bytes) => image::load_from_memory(bytes)
                .ok()
                .map(|img| (img.width(), img.height())),
            FrameHandle::Uri(_) => None,
        }
    }

    /// Upload file name for this frame
    pub fn file_name(&self) -> String {
        format!("face_{}.jpg", self.sequence_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::new(width, height);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_empty_handles() {
        assert!(FrameHandle::Uri("  ".to_string()).is_empty());
        assert!(FrameHandle::Bytes(Vec::new()).is_empty());
        assert!(!FrameHandle::Uri("file:///tmp/a.jpg".to_string()).is_empty());
        assert!(!FrameHandle::Bytes(vec![1]).is_empty());
    }

    #[test]
    fn test_dimensions_from_bytes() {
        let frame = CapturedFrame::new(FrameHandle::Bytes(png_bytes(4, 3)), 0);
        assert_eq!(frame.dimensions(), Some((4, 3)));

        let garbage = CapturedFrame::new(FrameHandle::Bytes(vec![0, 1, 2]), 1);
        assert_eq!(garbage.dimensions(), None);
    }

    #[test]
    fn test_file_name() {
        let frame = CapturedFrame::new(FrameHandle::Uri("x".into()), 7);
        assert_eq!(frame.file_name(), "face_7.jpg");
    }

    #[tokio::test]
    async fn test_read_bytes_from_missing_file() {
        let handle = FrameHandle::Uri("file:///definitely/not/here.jpg".to_string());
        assert!(matches!(handle.read_bytes().await, Err(CameraError::Read(_))));
    }
}
