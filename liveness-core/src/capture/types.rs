//! Frame and constraint types shared by capture sources and the encoder.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::LivenessError;

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout for raw captured frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 3 bytes per pixel: Red, Green, Blue.
    Rgb8,
    /// 4 bytes per pixel: Red, Green, Blue, Alpha.
    Rgba8,
    /// 4 bytes per pixel: Blue, Green, Red, Alpha (typical webcam/OS layout).
    Bgra8,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra8 | PixelFormat::Rgba8 => 4,
            PixelFormat::Rgb8 => 3,
        }
    }
}

// ── RawFrame ─────────────────────────────────────────────────────

/// An uncompressed still taken from the live capture surface.
///
/// The `data` buffer holds `height` rows of `stride` bytes each.
/// `stride` may be larger than `width * bytes_per_pixel` when the
/// producer pads rows.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Row pitch in **bytes** (may exceed `width * bpp`).
    pub stride: u32,
    /// Pixel layout.
    pub format: PixelFormat,
    /// Raw pixel data, `stride * height` bytes.
    pub data: Vec<u8>,
    /// Monotonic capture timestamp.
    pub timestamp: Instant,
}

/// Byte length of a tightly packed `width` x `height` bitmap.
pub fn packed_len(width: u32, height: u32, format: PixelFormat) -> Result<usize, LivenessError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|px| px.checked_mul(format.bytes_per_pixel()))
        .ok_or_else(|| LivenessError::Encoding(format!("frame size {width}x{height} overflows")))
}

impl RawFrame {
    /// Build a tightly packed frame, checking the buffer length.
    pub fn packed(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, LivenessError> {
        let stride = width
            .checked_mul(format.bytes_per_pixel() as u32)
            .ok_or_else(|| LivenessError::Encoding(format!("row of {width} pixels overflows")))?;
        let frame = Self {
            width,
            height,
            stride,
            format,
            data,
            timestamp: Instant::now(),
        };
        frame.check_len()?;
        Ok(frame)
    }

    /// Total byte size the raw bitmap occupies.
    pub fn byte_len(&self) -> usize {
        self.stride as usize * self.height as usize
    }

    /// Fails when `data` is shorter than `stride * height` or the stride
    /// cannot hold a full row.
    pub fn check_len(&self) -> Result<(), LivenessError> {
        let row = self.width as usize * self.format.bytes_per_pixel();
        if (self.stride as usize) < row {
            return Err(LivenessError::Encoding(format!(
                "stride {} shorter than row of {row} bytes",
                self.stride
            )));
        }
        if self.data.len() < self.byte_len() {
            return Err(LivenessError::Encoding(format!(
                "frame buffer too small: {} < {}",
                self.data.len(),
                self.byte_len()
            )));
        }
        Ok(())
    }

    /// Returns a row slice (including possible padding bytes).
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride as usize;
        let end = start + self.stride as usize;
        &self.data[start..end]
    }
}

// ── CaptureConstraints ───────────────────────────────────────────

/// Which camera to prefer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Front-facing (selfie) camera.
    #[default]
    User,
    /// Rear camera.
    Environment,
}

/// Largest capture width or height a session accepts.
pub const MAX_DIMENSION: u32 = 8192;

/// Fixed acquisition constraints for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub facing: Facing,
    /// Target width in pixels.
    pub width: u32,
    /// Target height in pixels.
    pub height: u32,
}

impl CaptureConstraints {
    /// Both sides non-zero and within [`MAX_DIMENSION`].
    pub fn is_valid(&self) -> bool {
        (1..=MAX_DIMENSION).contains(&self.width) && (1..=MAX_DIMENSION).contains(&self.height)
    }
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            facing: Facing::User,
            width: 640,
            height: 480,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_frame_checks_length() {
        assert!(RawFrame::packed(2, 2, PixelFormat::Rgb8, vec![0; 12]).is_ok());
        assert!(RawFrame::packed(2, 2, PixelFormat::Rgba8, vec![0; 12]).is_err());
    }

    #[test]
    fn oversized_frames_are_errors() {
        assert!(matches!(
            RawFrame::packed(u32::MAX, 1, PixelFormat::Rgba8, Vec::new()),
            Err(LivenessError::Encoding(_))
        ));
        assert_eq!(packed_len(4, 2, PixelFormat::Rgb8).unwrap(), 24);
        assert!(packed_len(40_000, 40_000, PixelFormat::Rgb8).is_ok());
    }

    #[test]
    fn constraint_bounds() {
        assert!(CaptureConstraints::default().is_valid());
        let huge = CaptureConstraints {
            width: 40_000,
            height: 40_000,
            ..Default::default()
        };
        assert!(!huge.is_valid());
        let empty = CaptureConstraints {
            height: 0,
            ..Default::default()
        };
        assert!(!empty.is_valid());
    }

    #[test]
    fn padded_rows() {
        let frame = RawFrame {
            width: 2,
            height: 2,
            stride: 8,
            format: PixelFormat::Rgb8,
            data: (0..16).collect(),
            timestamp: Instant::now(),
        };
        frame.check_len().unwrap();
        assert_eq!(frame.row(1), &[8, 9, 10, 11, 12, 13, 14, 15]);
    }

    #[test]
    fn default_constraints_are_front_vga() {
        let c = CaptureConstraints::default();
        assert_eq!(c.facing, Facing::User);
        assert_eq!((c.width, c.height), (640, 480));
    }
}
