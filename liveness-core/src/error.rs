//! Domain-specific error types for the liveness session client.
//!
//! All fallible operations return `Result<T, LivenessError>`.
//! Nothing in the session loop panics on bad input from the camera,
//! the network or the remote service.

use std::time::Duration;

use thiserror::Error;

/// The canonical error type for the liveness client.
#[derive(Debug, Error)]
pub enum LivenessError {
    // ── Capture Errors ───────────────────────────────────────────
    /// The capture source could not be acquired (no device, no
    /// permission, nothing decodable at the configured path).
    #[error("camera unavailable: {0}")]
    Camera(String),

    /// A snapshot was requested from a stream that has been released.
    #[error("capture stream already released")]
    StreamReleased,

    // ── Channel Errors ───────────────────────────────────────────
    /// Opening the session channel failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The session channel is not open (never became ready, or closed).
    #[error("channel closed")]
    ChannelClosed,

    /// Opening the channel exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The underlying IO layer reported an error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // ── Protocol Errors ──────────────────────────────────────────
    /// An inbound payload could not be interpreted as a protocol message.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// JSON encoding of an outbound message failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Encoding Errors ──────────────────────────────────────────
    /// A raw frame could not be turned into a compressed still.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The image codec rejected the input.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    // ── Lifecycle Errors ─────────────────────────────────────────
    /// `start()` was called while a session is still live.
    #[error("a verification session is already running")]
    SessionActive,

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for LivenessError {
    fn from(s: String) -> Self {
        LivenessError::Other(s)
    }
}

impl From<&str> for LivenessError {
    fn from(s: &str) -> Self {
        LivenessError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for LivenessError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        LivenessError::ChannelClosed
    }
}
