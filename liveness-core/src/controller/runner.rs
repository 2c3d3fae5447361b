//! The session task.

use std::sync::Arc;

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::{CaptureSource, CaptureStream};
use crate::channel::{ChannelConnector, ChannelEvent, ChannelHandle};
use crate::controller::{SessionConfig, SessionHooks};
use crate::encoder::FrameEncoder;
use crate::error::LivenessError;
use crate::protocol::{InboundMessage, StepReport};
use crate::render::{
    Highlight, PresentationSink, STATUS_CONNECTION_ERROR, Severity, camera_error_status,
};
use crate::state::{LoopAction, Render, SessionOutcome, SessionState};

pub(super) struct SessionRunner {
    pub(super) config: Arc<SessionConfig>,
    pub(super) source: Arc<dyn CaptureSource>,
    pub(super) connector: Arc<dyn ChannelConnector>,
    pub(super) sink: Arc<dyn PresentationSink>,
    pub(super) hooks: SessionHooks,
    pub(super) cancel: CancellationToken,
}

impl SessionRunner {
    pub(super) async fn run(self) -> SessionOutcome {
        let mut state = SessionState::new(self.config.total_steps);
        let outcome = self.drive(&mut state).await;

        info!(?outcome, "liveness session ended");
        if !matches!(outcome, SessionOutcome::Verified | SessionOutcome::Cancelled) {
            self.sink.show_start_control();
        }
        self.hooks.notify(&outcome);
        outcome
    }

    async fn drive(&self, state: &mut SessionState) -> SessionOutcome {
        if let Err(e) = state.phase_mut().begin_acquire() {
            return SessionOutcome::CameraUnavailable {
                detail: e.to_string(),
            };
        }

        // ── Camera ──
        let acquired = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return SessionOutcome::Cancelled,
            result = self.source.acquire(&self.config.constraints) => result,
        };
        let mut stream = match acquired {
            Ok(stream) => stream,
            Err(e) => {
                let detail = camera_detail(&e);
                warn!("camera unavailable: {detail}");
                self.sink
                    .set_status(&camera_error_status(&detail), Severity::Error);
                return SessionOutcome::CameraUnavailable { detail };
            }
        };
        // A stop that lands while the camera prompt resolves.
        if self.cancel.is_cancelled() {
            stream.release();
            return SessionOutcome::Cancelled;
        }

        // ── Channel ──
        if let Err(e) = state.phase_mut().begin_connect() {
            stream.release();
            return SessionOutcome::ConnectionLost {
                detail: e.to_string(),
            };
        }
        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                stream.release();
                return SessionOutcome::Cancelled;
            }
            result = self.connector.open(&self.config.address) => result,
        };
        let mut channel = match opened {
            Ok(channel) => channel,
            Err(e) => {
                warn!("channel open failed: {e}");
                stream.release();
                self.sink.set_status(STATUS_CONNECTION_ERROR, Severity::Error);
                return SessionOutcome::ConnectionLost {
                    detail: e.to_string(),
                };
            }
        };

        let outcome = self.pump(state, &mut *stream, &mut channel).await;

        stream.release();
        channel.close();
        outcome
    }

    /// The send/reply loop. At most one frame is ever scheduled.
    async fn pump(
        &self,
        state: &mut SessionState,
        stream: &mut dyn CaptureStream,
        channel: &mut ChannelHandle,
    ) -> SessionOutcome {
        let mut encoder = FrameEncoder::new(self.config.jpeg_quality);
        let idle_timeout = self.config.idle_timeout;
        let mut next_send: Option<Instant> = None;
        let mut idle_deadline = idle_timeout.map(|t| Instant::now() + t);

        loop {
            let send_at = next_send;
            let idle_at = idle_deadline;

            let action = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    state.halt();
                    debug!(frames = encoder.frame_count(), "session cancelled");
                    return SessionOutcome::Cancelled;
                }

                event = channel.recv() => {
                    idle_deadline = idle_timeout.map(|t| Instant::now() + t);
                    let transition = match event {
                        Some(ChannelEvent::Ready) => state.on_channel_ready(),
                        Some(ChannelEvent::Message(text)) => match InboundMessage::parse(&text) {
                            Ok(msg) => {
                                debug!(
                                    kind = msg.kind(),
                                    instruction = msg.report().map(StepReport::instruction_token),
                                    phase = %state.phase(),
                                    "message"
                                );
                                if let (InboundMessage::Start(_), Some(waited)) =
                                    (&msg, state.phase().awaiting_start_for())
                                {
                                    info!(?waited, "service started the session");
                                }
                                state.apply(&msg, &self.config.labels)
                            }
                            Err(e) => {
                                warn!("ignoring malformed message: {e}");
                                state.on_malformed()
                            }
                        },
                        Some(ChannelEvent::Error(detail)) => {
                            warn!("channel error: {detail}");
                            state.on_channel_lost(detail, true)
                        }
                        Some(ChannelEvent::Closed { reason }) => {
                            info!(%reason, "channel closed by service");
                            state.on_channel_lost(reason, false)
                        }
                        None => state.on_channel_lost("channel dropped", false),
                    };
                    self.render(&transition.render);
                    transition.action
                }

                _ = sleep_until(send_at.unwrap_or_else(Instant::now)), if send_at.is_some() => {
                    LoopAction::SendNow
                }

                _ = sleep_until(idle_at.unwrap_or_else(Instant::now)), if idle_at.is_some() => {
                    idle_deadline = None;
                    let after = idle_timeout.unwrap_or_default();
                    warn!(?after, "service went quiet");
                    let transition = state.on_idle_timeout(after);
                    self.render(&transition.render);
                    transition.action
                }
            };

            match action {
                LoopAction::SendNow => {
                    next_send = None;
                    if let Err(e) = self.send_frame(state, stream, channel, &mut encoder).await {
                        warn!("frame not sent: {e}");
                        // Nothing went out, so no reply will pace the loop.
                        if state.is_streaming() && channel.is_open() {
                            next_send = Some(Instant::now() + self.config.frame_interval);
                        }
                    }
                }
                LoopAction::ScheduleNext => {
                    if next_send.is_none() {
                        next_send = Some(Instant::now() + self.config.frame_interval);
                    }
                }
                LoopAction::Idle => {}
                LoopAction::Finish(outcome) => {
                    debug!(frames = encoder.frame_count(), "session loop finished");
                    return outcome;
                }
            }
        }
    }

    /// Capture, encode and send one frame, if the session still wants
    /// one.
    async fn send_frame(
        &self,
        state: &SessionState,
        stream: &mut dyn CaptureStream,
        channel: &ChannelHandle,
        encoder: &mut FrameEncoder,
    ) -> Result<(), LivenessError> {
        if !state.is_streaming() || state.is_terminal() || !channel.is_open() {
            debug!(phase = %state.phase(), "frame skipped");
            return Ok(());
        }
        let raw = stream.snapshot()?;
        let frame = encoder.encode(&raw)?;
        channel.send(&frame.to_outbound()).await?;
        debug!(
            width = frame.width,
            height = frame.height,
            bytes = frame.jpeg.len(),
            "frame sent"
        );
        Ok(())
    }

    fn render(&self, render: &Render) {
        let sink = self.sink.as_ref();
        match render {
            Render::Nothing => {}
            Render::Step(instruction) => instruction.apply(sink),
            Render::Status { text, severity } => sink.set_status(text, *severity),
            Render::Terminal { ok, text, progress } => {
                if let Some(progress) = progress {
                    sink.set_progress(*progress);
                }
                sink.set_highlight(Highlight::Idle);
                sink.show_terminal_result(*ok, text);
            }
        }
    }
}

/// Text shown after "Camera error: ".
fn camera_detail(err: &LivenessError) -> String {
    match err {
        LivenessError::Camera(detail) => detail.clone(),
        other => other.to_string(),
    }
}
