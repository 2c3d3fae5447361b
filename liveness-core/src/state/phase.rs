//! Lifecycle phases of one verification session.
//!
//! Provides a `SessionPhase` enum with validated transitions that return
//! `Result` instead of panicking. Message-driven moves between the step
//! phases happen in [`SessionState`](crate::state::SessionState).

use std::time::Instant;

use crate::error::LivenessError;

// ── SessionPhase ─────────────────────────────────────────────────

/// The current phase of a verification session.
///
/// ```text
///  Idle ──► Acquiring ──► Connecting ──► AwaitingStart
///                                             │ start
///                                             ▼
///          ┌── Positioning / NoFace / Waiting / Challenge / StepPassed ──┐
///          │                                                             │
///          ▼ complete                  failed ▼           close / error ▼
///       Complete                           Failed                 Disconnected
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Nothing running. Initial state.
    #[default]
    Idle,

    /// Waiting for the capture source.
    Acquiring,

    /// Capture is live; the session channel is being opened.
    Connecting,

    /// Channel is open; waiting for the service's `start`.
    AwaitingStart {
        /// When the channel became ready.
        since: Instant,
    },

    /// `start` received; frames are flowing.
    Positioning,

    /// The service saw no face in the last frame.
    NoFace,

    /// Waiting for the face to centre or for the requested movement.
    Waiting,

    /// A challenge is outstanding.
    Challenge,

    /// The last challenge was passed.
    StepPassed,

    /// Verified. Terminal.
    Complete,

    /// Verification failed. Terminal.
    Failed,

    /// The channel dropped without a verdict. Terminal.
    Disconnected,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Acquiring => write!(f, "Acquiring"),
            Self::Connecting => write!(f, "Connecting"),
            Self::AwaitingStart { .. } => write!(f, "AwaitingStart"),
            Self::Positioning => write!(f, "Positioning"),
            Self::NoFace => write!(f, "NoFace"),
            Self::Waiting => write!(f, "Waiting"),
            Self::Challenge => write!(f, "Challenge"),
            Self::StepPassed => write!(f, "StepPassed"),
            Self::Complete => write!(f, "Complete"),
            Self::Failed => write!(f, "Failed"),
            Self::Disconnected => write!(f, "Disconnected"),
        }
    }
}

impl SessionPhase {
    /// `Complete`, `Failed` and `Disconnected` end the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Disconnected)
    }

    /// Phases in which the session channel carries protocol messages.
    pub fn accepts_messages(&self) -> bool {
        matches!(
            self,
            Self::Connecting
                | Self::AwaitingStart { .. }
                | Self::Positioning
                | Self::NoFace
                | Self::Waiting
                | Self::Challenge
                | Self::StepPassed
        )
    }

    /// Anything between leaving `Idle` and reaching a terminal phase.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle) && !self.is_terminal()
    }

    /// How long the channel has been waiting for `start`.
    ///
    /// Returns `None` for any other phase.
    pub fn awaiting_start_for(&self) -> Option<std::time::Duration> {
        match self {
            Self::AwaitingStart { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Acquiring`.
    ///
    /// Valid from: `Idle`.
    pub fn begin_acquire(&mut self) -> Result<(), LivenessError> {
        match self {
            Self::Idle => {
                *self = Self::Acquiring;
                Ok(())
            }
            _ => Err(LivenessError::SessionActive),
        }
    }

    /// Transition to `Connecting`.
    ///
    /// Valid from: `Acquiring`.
    pub fn begin_connect(&mut self) -> Result<(), LivenessError> {
        match self {
            Self::Acquiring => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(LivenessError::Other(format!(
                "cannot connect from phase {self}"
            ))),
        }
    }

    /// Transition to `AwaitingStart`.
    ///
    /// Valid from: `Connecting`.
    pub fn channel_ready(&mut self) -> Result<(), LivenessError> {
        match self {
            Self::Connecting => {
                *self = Self::AwaitingStart {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(LivenessError::Other(format!(
                "channel ready in phase {self}"
            ))),
        }
    }

    /// Force-reset to `Idle` regardless of current state.
    pub fn reset(&mut self) {
        *self = Self::Idle;
    }
}

// ── Tests ────────────────────────────────────────────────────────
