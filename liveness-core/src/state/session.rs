//! Message-driven session state.
//!
//! [`SessionState::apply`] is the whole protocol table: it takes one
//! inbound message and returns what to draw and what the frame loop
//! should do next. It is synchronous and performs no I/O, so the async
//! controller only has to carry out the returned [`Transition`].

use std::time::Duration;

use tracing::debug;

use crate::labels::LabelTable;
use crate::protocol::{Direction, InboundMessage, StepReport};
use crate::render::{
    DotProgress, Highlight, MAX_STEPS, RESULT_FAILED, RESULT_VERIFIED, RenderInstruction,
    STATUS_BAD_MESSAGE, STATUS_CENTER_FACE, STATUS_CONNECTED, STATUS_CONNECTION_ERROR,
    STATUS_CONNECTION_LOST, STATUS_CONNECTION_TIMEOUT, STATUS_FOLLOW_PROMPT, STATUS_MOVE_NOW,
    STATUS_NO_FACE, STATUS_POSITION_FACE, STATUS_STEP_PASSED, STATUS_WRONG_DIRECTION, Severity,
};
use crate::state::phase::SessionPhase;

// ── SessionOutcome ───────────────────────────────────────────────

/// How a session ended. Delivered exactly once per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The service sent `complete`.
    Verified,
    /// The service sent `failed`; detail is passed through verbatim.
    Failed {
        reason: Option<String>,
        message: Option<String>,
    },
    /// The channel closed, errored or went silent without a verdict.
    ConnectionLost { detail: String },
    /// The capture source could not be acquired.
    CameraUnavailable { detail: String },
    /// `stop()` was called.
    Cancelled,
}

impl SessionOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, SessionOutcome::Verified)
    }
}

// ── Transition ───────────────────────────────────────────────────

/// Presentation change produced by one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Render {
    /// Nothing to draw.
    Nothing,
    /// A full step frame.
    Step(RenderInstruction),
    /// Only the status line changes.
    Status { text: String, severity: Severity },
    /// Terminal overlay, optionally with a final dot update.
    Terminal {
        ok: bool,
        text: String,
        progress: Option<DotProgress>,
    },
}

/// What the frame loop should do after an event.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopAction {
    /// Capture and send a frame immediately.
    SendNow,
    /// Send one more frame after the frame interval.
    ScheduleNext,
    /// Send nothing; wait for the next message.
    Idle,
    /// Stop streaming, tear down and report.
    Finish(SessionOutcome),
}

/// Result of feeding one event into [`SessionState`].
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub render: Render,
    pub action: LoopAction,
}

impl Transition {
    fn ignored() -> Self {
        Self {
            render: Render::Nothing,
            action: LoopAction::Idle,
        }
    }
}

// ── SessionState ─────────────────────────────────────────────────

/// Per-session protocol state.
#[derive(Debug, Clone)]
pub struct SessionState {
    phase: SessionPhase,
    /// Whether the capture/transmit loop is active.
    streaming: bool,
    /// Challenge steps passed, as last reported by the service.
    progress: u32,
    /// Number of dots to draw.
    total_steps: u32,
}

impl SessionState {
    pub fn new(total_steps: u32) -> Self {
        Self {
            phase: SessionPhase::Idle,
            streaming: false,
            progress: 0,
            total_steps: total_steps.min(MAX_STEPS),
        }
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    /// Mutable access for the lifecycle transitions on [`SessionPhase`].
    pub fn phase_mut(&mut self) -> &mut SessionPhase {
        &mut self.phase
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn progress(&self) -> u32 {
        self.progress
    }

    pub fn total_steps(&self) -> u32 {
        self.total_steps
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    fn dots(&self) -> DotProgress {
        DotProgress::new(self.progress, self.total_steps)
    }

    /// Frames keep flowing only while streaming.
    fn continue_loop(&self) -> LoopAction {
        if self.streaming {
            LoopAction::ScheduleNext
        } else {
            LoopAction::Idle
        }
    }

    fn step(
        &self,
        instruction: &str,
        status: impl Into<String>,
        severity: Severity,
        highlight: Highlight,
    ) -> Render {
        Render::Step(RenderInstruction {
            instruction: instruction.to_string(),
            status: status.into(),
            severity,
            highlight,
            progress: Some(self.dots()),
        })
    }

    fn absorb(&mut self, report: &StepReport) {
        if let Some(total) = report.total.filter(|t| *t > 0) {
            self.total_steps = total.min(MAX_STEPS);
        }
        self.progress = report.success.unwrap_or(0);
    }

    // ── Events ───────────────────────────────────────────────────

    /// The session channel reported ready.
    pub fn on_channel_ready(&mut self) -> Transition {
        if self.phase.channel_ready().is_err() {
            return Transition::ignored();
        }
        Transition {
            render: Render::Status {
                text: STATUS_CONNECTED.to_string(),
                severity: Severity::Normal,
            },
            action: LoopAction::Idle,
        }
    }

    /// Apply one protocol message.
    pub fn apply(&mut self, msg: &InboundMessage, labels: &LabelTable) -> Transition {
        if !self.phase.accepts_messages() {
            debug!(kind = msg.kind(), phase = %self.phase, "message ignored");
            return Transition::ignored();
        }

        let center = labels.direction(Direction::Center);

        match msg {
            InboundMessage::Start(report) => {
                self.absorb(report);
                self.streaming = true;
                self.phase = SessionPhase::Positioning;
                Transition {
                    render: self.step(
                        center,
                        STATUS_POSITION_FACE,
                        Severity::Normal,
                        Highlight::Idle,
                    ),
                    action: LoopAction::SendNow,
                }
            }

            InboundMessage::NoFace(report) => {
                self.absorb(report);
                self.phase = SessionPhase::NoFace;
                Transition {
                    render: self.step(center, STATUS_NO_FACE, Severity::Error, Highlight::Idle),
                    action: self.continue_loop(),
                }
            }

            InboundMessage::Waiting(report) => {
                self.absorb(report);
                self.phase = SessionPhase::Waiting;
                let label = labels.label(report.instruction_token());
                let (status, severity) = if report.wrong_direction {
                    (format!("{STATUS_WRONG_DIRECTION} {label}"), Severity::Error)
                } else if report.awaiting_center() {
                    (STATUS_CENTER_FACE.to_string(), Severity::Normal)
                } else {
                    (STATUS_FOLLOW_PROMPT.to_string(), Severity::Normal)
                };
                let highlight = if report.awaiting_action() {
                    Highlight::Active
                } else {
                    Highlight::Idle
                };
                Transition {
                    render: self.step(label, status, severity, highlight),
                    action: self.continue_loop(),
                }
            }

            InboundMessage::Challenge(report) => {
                self.absorb(report);
                self.phase = SessionPhase::Challenge;
                let label = labels.label(report.instruction_token());
                Transition {
                    render: self.step(label, STATUS_MOVE_NOW, Severity::Normal, Highlight::Active),
                    action: self.continue_loop(),
                }
            }

            InboundMessage::Success(report) => {
                self.absorb(report);
                self.phase = SessionPhase::StepPassed;
                Transition {
                    render: self.step(center, STATUS_STEP_PASSED, Severity::Normal, Highlight::Ok),
                    action: self.continue_loop(),
                }
            }

            InboundMessage::Complete(report) => {
                let progress = report.success.map(|passed| {
                    self.progress = passed;
                    self.dots()
                });
                self.streaming = false;
                self.phase = SessionPhase::Complete;
                Transition {
                    render: Render::Terminal {
                        ok: true,
                        text: RESULT_VERIFIED.to_string(),
                        progress,
                    },
                    action: LoopAction::Finish(SessionOutcome::Verified),
                }
            }

            // `failed` carries no step count, so the dots keep the last
            // reported progress.
            InboundMessage::Failed(failure) => {
                self.streaming = false;
                self.phase = SessionPhase::Failed;
                let text = failure
                    .message
                    .clone()
                    .unwrap_or_else(|| RESULT_FAILED.to_string());
                Transition {
                    render: Render::Terminal {
                        ok: false,
                        text,
                        progress: None,
                    },
                    action: LoopAction::Finish(SessionOutcome::Failed {
                        reason: failure.reason.clone(),
                        message: failure.message.clone(),
                    }),
                }
            }

            InboundMessage::Error(notice) => Transition {
                render: Render::Status {
                    text: notice
                        .message
                        .clone()
                        .unwrap_or_else(|| STATUS_BAD_MESSAGE.to_string()),
                    severity: Severity::Error,
                },
                action: self.continue_loop(),
            },
        }
    }

    /// An inbound payload could not be parsed. The loop keeps going so a
    /// server-paced session does not stall on one bad reply.
    pub fn on_malformed(&mut self) -> Transition {
        if !self.phase.accepts_messages() {
            return Transition::ignored();
        }
        Transition {
            render: Render::Status {
                text: STATUS_BAD_MESSAGE.to_string(),
                severity: Severity::Error,
            },
            action: self.continue_loop(),
        }
    }

    /// The channel closed or errored before a verdict.
    pub fn on_channel_lost(&mut self, detail: impl Into<String>, errored: bool) -> Transition {
        let status = if errored {
            STATUS_CONNECTION_ERROR
        } else {
            STATUS_CONNECTION_LOST
        };
        self.drop_connection(status, detail.into())
    }

    /// No inbound message arrived within `after`.
    pub fn on_idle_timeout(&mut self, after: Duration) -> Transition {
        self.drop_connection(
            STATUS_CONNECTION_TIMEOUT,
            format!("no message from service for {after:?}"),
        )
    }

    fn drop_connection(&mut self, status: &str, detail: String) -> Transition {
        if !self.phase.is_active() {
            return Transition::ignored();
        }
        self.streaming = false;
        self.phase = SessionPhase::Disconnected;
        Transition {
            render: Render::Status {
                text: status.to_string(),
                severity: Severity::Error,
            },
            action: LoopAction::Finish(SessionOutcome::ConnectionLost { detail }),
        }
    }

    /// Explicit stop: no more frames regardless of phase.
    pub fn halt(&mut self) {
        self.streaming = false;
        self.phase.reset();
    }
}

// ── Tests ────────────────────────────────────────────────────────
