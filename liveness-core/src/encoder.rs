//! Still-frame encoder.
//!
//! Turns a [`RawFrame`] snapshot into a JPEG at the configured quality and
//! wraps it as the base64 [`OutboundFrame`] the service expects.
//!
//! - **Rgb8**: rows copied as-is (padding stripped).
//! - **Rgba8 / Bgra8**: alpha dropped and channels reordered to RGB.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;

use crate::capture::{PixelFormat, RawFrame};
use crate::error::LivenessError;
use crate::protocol::OutboundFrame;

/// Default compression quality, as a fraction.
pub const DEFAULT_QUALITY: f32 = 0.6;

// ── EncodedFrame ─────────────────────────────────────────────────

/// A compressed still ready for transmission.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// JPEG bytes.
    pub jpeg: Vec<u8>,
}

impl EncodedFrame {
    /// Base64 payload without any data-URL prefix.
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.jpeg)
    }

    /// The outbound wire message for this frame.
    pub fn to_outbound(&self) -> OutboundFrame {
        OutboundFrame::new(self.to_base64())
    }
}

// ── FrameEncoder ─────────────────────────────────────────────────

/// JPEG encoder with a fixed quality.
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    /// JPEG quality 1..=100.
    quality: u8,
    /// Number of frames encoded so far.
    frame_count: u64,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_QUALITY)
    }
}

impl FrameEncoder {
    /// Create an encoder; `quality` is a fraction in `(0, 1]` and is
    /// clamped into range.
    pub fn new(quality: f32) -> Self {
        Self {
            quality: quality_to_jpeg(quality),
            frame_count: 0,
        }
    }

    /// JPEG quality in use (1..=100).
    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Number of frames encoded so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Compress one snapshot.
    pub fn encode(&mut self, frame: &RawFrame) -> Result<EncodedFrame, LivenessError> {
        if frame.width == 0 || frame.height == 0 {
            return Err(LivenessError::Encoding("empty frame".into()));
        }
        frame.check_len()?;

        let rgb = to_rgb(frame);
        let image = RgbImage::from_raw(frame.width, frame.height, rgb)
            .ok_or_else(|| LivenessError::Encoding("rgb buffer size mismatch".into()))?;

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality).encode_image(&image)?;

        self.frame_count += 1;

        Ok(EncodedFrame {
            width: frame.width,
            height: frame.height,
            jpeg,
        })
    }
}

fn quality_to_jpeg(quality: f32) -> u8 {
    if !quality.is_finite() {
        return quality_to_jpeg(DEFAULT_QUALITY);
    }
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Pack `frame` into tightly laid-out RGB bytes.
fn to_rgb(frame: &RawFrame) -> Vec<u8> {
    let bpp = frame.format.bytes_per_pixel();
    let row_len = frame.width as usize * bpp;
    let mut out = Vec::with_capacity(frame.width as usize * frame.height as usize * 3);

    for y in 0..frame.height {
        let row = &frame.row(y)[..row_len];
        match frame.format {
            PixelFormat::Rgb8 => out.extend_from_slice(row),
            PixelFormat::Rgba8 => {
                for px in row.chunks_exact(4) {
                    out.extend_from_slice(&px[..3]);
                }
            }
            PixelFormat::Bgra8 => {
                for px in row.chunks_exact(4) {
                    out.extend_from_slice(&[px[2], px[1], px[0]]);
                }
            }
        }
    }

    out
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn solid(w: u32, h: u32, format: PixelFormat, px: &[u8]) -> RawFrame {
        let data = px.repeat((w * h) as usize);
        RawFrame::packed(w, h, format, data).unwrap()
    }

    #[test]
    fn quality_mapping() {
        assert_eq!(FrameEncoder::default().quality(), 60);
        assert_eq!(FrameEncoder::new(1.0).quality(), 100);
        assert_eq!(FrameEncoder::new(0.0).quality(), 1);
        assert_eq!(FrameEncoder::new(7.5).quality(), 100);
        assert_eq!(FrameEncoder::new(f32::NAN).quality(), 60);
    }

    #[test]
    fn produces_a_jpeg() {
        let mut enc = FrameEncoder::default();
        let frame = solid(16, 8, PixelFormat::Rgb8, &[10, 120, 240]);
        let out = enc.encode(&frame).unwrap();

        assert_eq!(&out.jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!((out.width, out.height), (16, 8));
        assert_eq!(enc.frame_count(), 1);

        let decoded = image::load_from_memory(&out.jpeg).unwrap();
        assert_eq!(decoded.width(), 16);
        assert_eq!(decoded.height(), 8);
    }

    #[test]
    fn bgra_channels_are_swapped() {
        let frame = solid(1, 1, PixelFormat::Bgra8, &[1, 2, 3, 255]);
        assert_eq!(to_rgb(&frame), vec![3, 2, 1]);

        let frame = solid(1, 1, PixelFormat::Rgba8, &[1, 2, 3, 255]);
        assert_eq!(to_rgb(&frame), vec![1, 2, 3]);
    }

    #[test]
    fn row_padding_is_stripped() {
        let frame = RawFrame {
            width: 1,
            height: 2,
            stride: 4,
            format: PixelFormat::Rgb8,
            data: vec![1, 2, 3, 0, 4, 5, 6, 0],
            timestamp: Instant::now(),
        };
        assert_eq!(to_rgb(&frame), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn short_buffer_is_rejected() {
        let frame = RawFrame {
            width: 4,
            height: 4,
            stride: 12,
            format: PixelFormat::Rgb8,
            data: vec![0; 10],
            timestamp: Instant::now(),
        };
        assert!(matches!(
            FrameEncoder::default().encode(&frame),
            Err(LivenessError::Encoding(_))
        ));
    }

    #[test]
    fn outbound_is_plain_base64() {
        let mut enc = FrameEncoder::default();
        let out = enc
            .encode(&solid(4, 4, PixelFormat::Rgb8, &[0, 0, 0]))
            .unwrap();
        let wire = out.to_outbound();
        assert!(!wire.frame.starts_with("data:"));
        assert_eq!(BASE64.decode(&wire.frame).unwrap(), out.jpeg);
    }
}
