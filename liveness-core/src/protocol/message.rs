//! Session wire messages.
//!
//! # Wire Protocol
//!
//! ```text
//! Service ──[{"type":"start", ...}]──────────────► Client
//! Client  ──[{"frame":"<base64 jpeg>"}]──────────► Service   (one per reply)
//! Service ──[{"type":"no_face"|"waiting"|...}]───► Client
//!   ...
//! Service ──[{"type":"complete"|"failed"}]───────► Client    (terminal)
//! ```
//!
//! Every inbound message is a JSON object discriminated by `type`.
//! The service answers each frame with exactly one message, so the
//! client never needs more than one frame in flight.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::LivenessError;

/// Sub-phase token: the service wants the face centred before it
/// issues the next challenge.
pub const STATE_WAITING_CENTER: &str = "WAITING_CENTER";

/// Sub-phase token: a challenge is outstanding and the service is
/// waiting for the head movement.
pub const STATE_WAITING_ACTION: &str = "WAITING_ACTION";

// ── Inbound ──────────────────────────────────────────────────────

/// Progress report carried by every non-failure message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// Direction token the user should follow (`CENTER`, `LEFT`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,

    /// Service-side sub-phase (`WAITING_CENTER`, `WAITING_ACTION`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Number of challenge steps passed so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<u32>,

    /// Number of steps the service requires in total.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,

    /// Set when the user moved the wrong way. The service sends either
    /// a boolean or the offending direction token (null when unset).
    #[serde(default, deserialize_with = "flag_or_token")]
    pub wrong_direction: bool,

    /// Estimated yaw in degrees, informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yaw: Option<f64>,

    /// Estimated pitch in degrees, informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
}

impl StepReport {
    /// Direction token, defaulting to `CENTER` when absent or blank.
    pub fn instruction_token(&self) -> &str {
        self.instruction
            .as_deref()
            .filter(|token| !token.trim().is_empty())
            .unwrap_or("CENTER")
    }

    /// Whether the service reports an outstanding challenge.
    pub fn awaiting_action(&self) -> bool {
        self.state.as_deref() == Some(STATE_WAITING_ACTION)
    }

    /// Whether the service is waiting for the face to be centred.
    pub fn awaiting_center(&self) -> bool {
        self.state.as_deref() == Some(STATE_WAITING_CENTER)
    }
}

/// Detail attached to an authoritative verification failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    /// Machine-readable reason (`timeout`, `challenge_timeout`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message to show the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Non-fatal complaint from the service about the last frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceNotice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A message received from the liveness service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Session accepted; the client should start streaming.
    Start(StepReport),
    /// No face was found in the last frame.
    NoFace(StepReport),
    /// Waiting for the face to centre, or for the requested movement.
    Waiting(StepReport),
    /// A new challenge has been issued.
    Challenge(StepReport),
    /// The outstanding challenge was passed.
    Success(StepReport),
    /// All challenges passed. Terminal.
    Complete(StepReport),
    /// Verification failed. Terminal.
    Failed(FailureReport),
    /// The service could not use the last frame.
    Error(ServiceNotice),
}

impl InboundMessage {
    /// Parse one inbound payload.
    pub fn parse(text: &str) -> Result<Self, LivenessError> {
        serde_json::from_str(text).map_err(|e| LivenessError::MalformedMessage(e.to_string()))
    }

    /// The wire `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::Start(_) => "start",
            InboundMessage::NoFace(_) => "no_face",
            InboundMessage::Waiting(_) => "waiting",
            InboundMessage::Challenge(_) => "challenge",
            InboundMessage::Success(_) => "success",
            InboundMessage::Complete(_) => "complete",
            InboundMessage::Failed(_) => "failed",
            InboundMessage::Error(_) => "error",
        }
    }

    /// `complete` and `failed` end the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, InboundMessage::Complete(_) | InboundMessage::Failed(_))
    }

    /// The progress report, if this message carries one.
    pub fn report(&self) -> Option<&StepReport> {
        match self {
            InboundMessage::Start(r)
            | InboundMessage::NoFace(r)
            | InboundMessage::Waiting(r)
            | InboundMessage::Challenge(r)
            | InboundMessage::Success(r)
            | InboundMessage::Complete(r) => Some(r),
            InboundMessage::Failed(_) | InboundMessage::Error(_) => None,
        }
    }
}

fn flag_or_token<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Flag(bool),
        Token(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Flag(flag)) => flag,
        Some(Raw::Token(token)) => !token.is_empty(),
        None => false,
    })
}

// ── Outbound ─────────────────────────────────────────────────────

/// The single client → service payload: one compressed still frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundFrame {
    /// Base64 (standard alphabet) JPEG bytes, without a data-URL prefix.
    pub frame: String,
}

impl OutboundFrame {
    pub fn new(frame: impl Into<String>) -> Self {
        Self {
            frame: frame.into(),
        }
    }

    /// Serialise to the JSON text sent over the channel.
    pub fn to_json(&self) -> Result<String, LivenessError> {
        Ok(serde_json::to_string(self)?)
    }
}

// ── Tests ────────────────────────────────────────────────────────
