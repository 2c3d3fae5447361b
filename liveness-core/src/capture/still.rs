//! Still-image capture source.
//!
//! Replays a single image file, or every `.jpg`/`.jpeg`/`.png` in a
//! directory in file-name order, as if it were a live camera. Each
//! snapshot returns the next still and wraps around at the end.
//! Acquisition fails the way a missing camera does: a path that does
//! not exist or holds nothing decodable is [`LivenessError::Camera`].

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use image::imageops::FilterType;
use tracing::{debug, info, warn};

use crate::capture::types::{CaptureConstraints, PixelFormat, RawFrame};
use crate::capture::{CaptureSource, CaptureStream};
use crate::error::LivenessError;

const EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Capture source backed by image files on disk.
#[derive(Debug, Clone)]
pub struct StillImageSource {
    path: PathBuf,
}

impl StillImageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CaptureSource for StillImageSource {
    async fn acquire(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>, LivenessError> {
        let path = self.path.clone();
        let constraints = *constraints;
        let frames = tokio::task::spawn_blocking(move || load_frames(&path, &constraints))
            .await
            .map_err(|e| LivenessError::Camera(format!("loader task failed: {e}")))??;

        info!(
            path = %self.path.display(),
            frames = frames.len(),
            "still-image source acquired"
        );
        Ok(Box::new(StillImageStream {
            frames,
            next: 0,
            released: false,
        }))
    }
}

/// Collect candidate files: the path itself, or its image entries sorted
/// by name.
fn candidate_files(path: &Path) -> Result<Vec<PathBuf>, LivenessError> {
    if !path.exists() {
        return Err(LivenessError::Camera(format!(
            "{} does not exist",
            path.display()
        )));
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

fn load_frames(
    path: &Path,
    constraints: &CaptureConstraints,
) -> Result<Vec<RawFrame>, LivenessError> {
    let mut frames = Vec::new();

    for file in candidate_files(path)? {
        let img = match image::open(&file) {
            Ok(img) => img,
            Err(e) => {
                warn!(file = %file.display(), "skipping undecodable still: {e}");
                continue;
            }
        };

        let img = if img.width() > constraints.width || img.height() > constraints.height {
            img.resize(constraints.width, constraints.height, FilterType::Triangle)
        } else {
            img
        };

        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        debug!(file = %file.display(), width, height, "loaded still");
        frames.push(RawFrame::packed(
            width,
            height,
            PixelFormat::Rgb8,
            rgb.into_raw(),
        )?);
    }

    if frames.is_empty() {
        return Err(LivenessError::Camera(format!(
            "no decodable images at {}",
            path.display()
        )));
    }
    Ok(frames)
}

/// Live stream for [`StillImageSource`].
#[derive(Debug)]
pub struct StillImageStream {
    frames: Vec<RawFrame>,
    next: usize,
    released: bool,
}

impl CaptureStream for StillImageStream {
    fn snapshot(&mut self) -> Result<RawFrame, LivenessError> {
        if self.released || self.frames.is_empty() {
            return Err(LivenessError::StreamReleased);
        }
        let mut frame = self.frames[self.next].clone();
        frame.timestamp = Instant::now();
        self.next = (self.next + 1) % self.frames.len();
        Ok(frame)
    }

    fn release(&mut self) {
        if !self.released {
            debug!("still-image source released");
        }
        self.released = true;
        self.frames.clear();
    }

    fn is_released(&self) -> bool {
        self.released
    }
}

// ── Tests ────────────────────────────────────────────────────────
