//! Synthetic capture source.
//!
//! Produces a diagonal gradient that shifts by a few pixels on every
//! snapshot, so consecutive stills differ. Used to check connectivity
//! against a real service and as the default source in tests.

use async_trait::async_trait;
use tracing::debug;

use crate::capture::types::{CaptureConstraints, PixelFormat, RawFrame, packed_len};
use crate::capture::{CaptureSource, CaptureStream};
use crate::error::LivenessError;

/// Source that never fails to acquire.
#[derive(Debug, Clone, Copy, Default)]
pub struct TestPatternSource;

impl TestPatternSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CaptureSource for TestPatternSource {
    async fn acquire(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>, LivenessError> {
        if !constraints.is_valid() {
            return Err(LivenessError::Camera(format!(
                "unsupported capture size {}x{}",
                constraints.width, constraints.height
            )));
        }
        debug!(
            width = constraints.width,
            height = constraints.height,
            "test pattern acquired"
        );
        Ok(Box::new(PatternStream {
            width: constraints.width,
            height: constraints.height,
            tick: 0,
            released: false,
        }))
    }
}

/// Live stream for [`TestPatternSource`].
#[derive(Debug)]
pub struct PatternStream {
    width: u32,
    height: u32,
    tick: u32,
    released: bool,
}

impl CaptureStream for PatternStream {
    fn snapshot(&mut self) -> Result<RawFrame, LivenessError> {
        if self.released {
            return Err(LivenessError::StreamReleased);
        }
        let shift = self.tick.wrapping_mul(4);
        self.tick = self.tick.wrapping_add(1);

        let (width, height) = (u64::from(self.width), u64::from(self.height));
        let mut data = Vec::with_capacity(packed_len(self.width, self.height, PixelFormat::Rgb8)?);
        for y in 0..self.height {
            for x in 0..self.width {
                let sx = x.wrapping_add(shift) % self.width;
                let r = (u64::from(sx) * 255 / width) as u8;
                let g = (u64::from(y) * 255 / height) as u8;
                let b = x.wrapping_add(y).wrapping_add(shift) as u8;
                data.extend_from_slice(&[r, g, b]);
            }
        }
        RawFrame::packed(self.width, self.height, PixelFormat::Rgb8, data)
    }

    fn release(&mut self) {
        if !self.released {
            debug!("test pattern released");
        }
        self.released = true;
    }

    fn is_released(&self) -> bool {
        self.released
    }
}
