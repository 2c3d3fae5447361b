//! Pixel conversions for camera driver buffers.

use image::ImageFormat;

use crate::capture::types::{PixelFormat, RawFrame, packed_len};
use crate::error::LivenessError;

/// YUYV 4:2:2 (two pixels per four bytes) to packed RGB8.
///
/// A `stride` of 0 means rows are tightly packed.
pub fn yuyv_to_rgb(
    src: &[u8],
    width: u32,
    height: u32,
    stride: u32,
) -> Result<RawFrame, LivenessError> {
    let pairs = width.div_ceil(2) as usize;
    let stride = match stride as usize {
        0 => pairs * 4,
        s => s,
    };
    if stride < pairs * 4 {
        return Err(LivenessError::Encoding(format!(
            "yuyv stride {stride} shorter than row of {} bytes",
            pairs * 4
        )));
    }
    let needed = stride
        .checked_mul(height as usize)
        .ok_or_else(|| LivenessError::Encoding(format!("frame size {width}x{height} overflows")))?;
    if src.len() < needed {
        return Err(LivenessError::Encoding(format!(
            "yuyv buffer too small: {} < {needed}",
            src.len()
        )));
    }

    let mut rgb = Vec::with_capacity(packed_len(width, height, PixelFormat::Rgb8)?);
    for row in src.chunks_exact(stride).take(height as usize) {
        for (i, quad) in row[..pairs * 4].chunks_exact(4).enumerate() {
            let [y0, u, y1, v] = [quad[0], quad[1], quad[2], quad[3]];
            rgb.extend_from_slice(&ycbcr_to_rgb(y0, u, v));
            if i * 2 + 1 < width as usize {
                rgb.extend_from_slice(&ycbcr_to_rgb(y1, u, v));
            }
        }
    }
    RawFrame::packed(width, height, PixelFormat::Rgb8, rgb)
}

/// Motion-JPEG buffer to packed RGB8.
pub fn jpeg_to_rgb(src: &[u8]) -> Result<RawFrame, LivenessError> {
    let rgb = image::load_from_memory_with_format(src, ImageFormat::Jpeg)?.to_rgb8();
    let (width, height) = rgb.dimensions();
    RawFrame::packed(width, height, PixelFormat::Rgb8, rgb.into_raw())
}

/// BT.601 studio-swing integer conversion.
fn ycbcr_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = i32::from(y) - 16;
    let d = i32::from(u) - 128;
    let e = i32::from(v) - 128;
    let clamp = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    [
        clamp(298 * c + 409 * e),
        clamp(298 * c - 100 * d - 208 * e),
        clamp(298 * c + 516 * d),
    ]
}
