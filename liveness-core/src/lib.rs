//! # liveness-core
//!
//! Client side of a head-movement liveness check. The client streams
//! camera stills to a verification service over a message channel; the
//! service answers each frame with the next instruction until it reaches
//! a verdict.
//!
//! This crate contains:
//! - **Protocol**: `InboundMessage`, `OutboundFrame`, `Direction`
//! - **State**: `SessionState`, a pure transition table from server
//!   messages to render instructions and loop actions
//! - **Render**: `RenderInstruction`, `DotProgress` and the `PresentationSink` seam
//! - **Capture**: `CaptureSource` / `CaptureStream` with still-image,
//!   test-pattern and (feature `v4l`) V4L2 camera backends
//! - **Encoder**: `FrameEncoder`, JPEG + base64 framing
//! - **Channel**: `ChannelConnector` with WebSocket and in-process backends
//! - **Controller**: `SessionController`, the start / stop / retry lifecycle
//! - **Error**: `LivenessError`, typed and `thiserror`-based

pub mod capture;
pub mod channel;
pub mod controller;
pub mod encoder;
pub mod error;
pub mod labels;
pub mod protocol;
pub mod render;
pub mod state;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use capture::{
    CaptureConstraints, CaptureSource, CaptureStream, Facing, PixelFormat, RawFrame,
    StillImageSource, TestPatternSource,
};
#[cfg(feature = "v4l")]
pub use capture::V4lSource;
pub use channel::{
    ChannelConnector, ChannelEvent, ChannelHandle, MemoryConnector, RemotePeer, WsConnector,
};
pub use controller::{SessionConfig, SessionController, SessionHandle, SessionHooks};
pub use encoder::{EncodedFrame, FrameEncoder};
pub use error::LivenessError;
pub use labels::LabelTable;
pub use protocol::{Direction, InboundMessage, OutboundFrame, StepReport};
pub use render::{
    DotProgress, DotState, Highlight, MAX_STEPS, PresentationSink, RecordingSink,
    RenderInstruction, Severity,
};
pub use state::{SessionOutcome, SessionPhase, SessionState};
