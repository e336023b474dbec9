//! Directory-backed camera
//!
//! Replays the image files of a directory as successive shutter actions,
//! cycling when the directory is exhausted. Used by the kiosk binary on
//! machines without a camera.

use async_trait::async_trait;
use image::{ImageFormat, ImageReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, info};

use crate::{Camera, CameraError, FrameHandle};

/// Camera that serves image files from disk
pub struct ReplayCamera {
    files: Vec<PathBuf>,
    next: AtomicUsize,
    open: AtomicBool,
}

impl ReplayCamera {
    /// Scan `dir` for decodable images (sorted by file name)
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, CameraError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir)
            .map_err(|e| CameraError::Open(format!("{}: {}", dir.display(), e)))?;

        let mut files = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            match sniff_format(&path) {
                Some(format) => {
                    debug!("Found {:?} image {}", format, path.display());
                    files.push(path);
                }
                None => debug!("Skipping non-image file {}", path.display()),
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(CameraError::Open(format!(
                "no images found in {}",
                dir.display()
            )));
        }

        info!("Replay camera loaded {} images from {}", files.len(), dir.display());
        Ok(Self {
            files,
            next: AtomicUsize::new(0),
            open: AtomicBool::new(false),
        })
    }

    /// Number of images available
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no images were found
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Image format from the file's leading bytes; the rest is not read
fn sniff_format(path: &Path) -> Option<ImageFormat> {
    ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .ok()
        .and_then(|reader| reader.format())
}

#[async_trait]
impl Camera for ReplayCamera {
    async fn request_permission(&self) -> bool {
        true
    }

    async fn open(&self) -> Result<(), CameraError> {
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn capture_frame(&self) -> Result<FrameHandle, CameraError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(CameraError::NotInitialized);
        }
        let idx = self.next.fetch_add(1, Ordering::SeqCst) % self.files.len();
        let path = &self.files[idx];
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| CameraError::Capture(format!("{}: {}", path.display(), e)))?;
        Ok(FrameHandle::Bytes(bytes))
    }

    fn release(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}
