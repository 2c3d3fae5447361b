//! Capture sources.
//!
//! A [`CaptureSource`] hands out a live [`CaptureStream`] for the
//! duration of one session. The controller polls the stream for stills
//! at the frame interval; there is no per-frame subscription.
//!
//! | Source              | Backing                                      |
//! |---------------------|----------------------------------------------|
//! | `StillImageSource`  | an image file or a directory of stills, cycled |
//! | `TestPatternSource` | a synthetic moving gradient                   |
//! | `V4lSource`         | a V4L2 camera node (feature `v4l`)            |
//!
//! Other hardware backends plug in by implementing the two traits.

pub mod convert;
pub mod pattern;
pub mod still;
pub mod types;
#[cfg(feature = "v4l")]
pub mod v4l2;

use async_trait::async_trait;

use crate::error::LivenessError;

pub use pattern::TestPatternSource;
pub use still::StillImageSource;
#[cfg(feature = "v4l")]
pub use v4l2::V4lSource;
pub use types::{CaptureConstraints, Facing, MAX_DIMENSION, PixelFormat, RawFrame};

/// Something that can be opened as a live capture stream.
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Open the source under `constraints`.
    ///
    /// Returns [`LivenessError::Camera`] when no usable device exists or
    /// access is refused.
    async fn acquire(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>, LivenessError>;
}

/// A live capture surface owned by one session.
pub trait CaptureStream: Send {
    /// Take a still of the current surface.
    ///
    /// Fails with [`LivenessError::StreamReleased`] after [`release`](Self::release).
    fn snapshot(&mut self) -> Result<RawFrame, LivenessError>;

    /// Stop the underlying device. Safe to call more than once.
    fn release(&mut self);

    fn is_released(&self) -> bool;
}
