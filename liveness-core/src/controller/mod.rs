//! Session controller: owns the lifecycle of one verification attempt.
//!
//! [`SessionController::start`] spawns a session task that acquires the
//! camera, opens the channel and then runs the send/reply loop until the
//! service delivers a verdict, the channel drops, or the host calls
//! [`stop`](SessionController::stop). The task is the only place that
//! touches the camera stream and the channel, so every teardown path
//! releases both exactly once.

pub mod config;
mod runner;

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::capture::CaptureSource;
use crate::channel::ChannelConnector;
use crate::error::LivenessError;
use crate::render::{PresentationSink, RenderInstruction};
use crate::state::SessionOutcome;

pub use config::{SessionConfig, SessionHooks};

use runner::SessionRunner;

// ── SessionHandle ────────────────────────────────────────────────

/// Completion signal for one started session.
#[derive(Debug)]
pub struct SessionHandle {
    outcome: oneshot::Receiver<SessionOutcome>,
}

impl SessionHandle {
    /// Wait for the session to end.
    ///
    /// A session torn down without reporting (its task panicked or the
    /// runtime shut down) reads as [`SessionOutcome::Cancelled`].
    pub async fn outcome(self) -> SessionOutcome {
        self.outcome.await.unwrap_or(SessionOutcome::Cancelled)
    }
}

// ── SessionController ────────────────────────────────────────────

struct ActiveSession {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Drives verification sessions against one service, one at a time.
pub struct SessionController {
    config: Arc<SessionConfig>,
    source: Arc<dyn CaptureSource>,
    connector: Arc<dyn ChannelConnector>,
    sink: Arc<dyn PresentationSink>,
    hooks: SessionHooks,
    active: Option<ActiveSession>,
}

impl SessionController {
    /// Build a controller. Fails on a config the loop cannot run with.
    pub fn new(
        config: SessionConfig,
        source: Arc<dyn CaptureSource>,
        connector: Arc<dyn ChannelConnector>,
        sink: Arc<dyn PresentationSink>,
    ) -> Result<Self, LivenessError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            source,
            connector,
            sink,
            hooks: SessionHooks::default(),
            active: None,
        })
    }

    /// Install completion callbacks for sessions started from now on.
    pub fn with_hooks(mut self, hooks: SessionHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether a session task is still running.
    pub fn is_live(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.task.is_finished())
    }

    /// Start a new session.
    ///
    /// Resets the presentation to the initializing frame before
    /// returning. Must be called from within a Tokio runtime. Fails with
    /// [`LivenessError::SessionActive`] while another session is live;
    /// call [`stop`](Self::stop) or [`retry`](Self::retry) first.
    pub fn start(&mut self) -> Result<SessionHandle, LivenessError> {
        if self.is_live() {
            return Err(LivenessError::SessionActive);
        }
        self.active = None;

        self.sink.hide_start_control();
        self.sink.clear_terminal_result();
        RenderInstruction::initializing(self.config.total_steps).apply(self.sink.as_ref());

        let cancel = CancellationToken::new();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let runner = SessionRunner {
            config: self.config.clone(),
            source: self.source.clone(),
            connector: self.connector.clone(),
            sink: self.sink.clone(),
            hooks: self.hooks.clone(),
            cancel: cancel.clone(),
        };

        info!(address = %self.config.address, "starting liveness session");
        let task = tokio::spawn(async move {
            let outcome = runner.run().await;
            // The host may have dropped its handle.
            let _ = outcome_tx.send(outcome);
        });

        self.active = Some(ActiveSession { cancel, task });
        Ok(SessionHandle {
            outcome: outcome_rx,
        })
    }

    /// Stop the current session, if any, and return the presentation to
    /// its ready-to-start state.
    ///
    /// Releases the camera and closes the channel before returning. No
    /// frame is sent afterwards and no hook fires. Safe to call at any
    /// time, any number of times.
    pub async fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            if let Err(e) = active.task.await {
                warn!("session task ended abnormally: {e}");
            }
        }
        self.sink.reset_to_idle();
        self.sink.show_start_control();
    }

    /// Stop whatever is running, then start afresh.
    pub async fn retry(&mut self) -> Result<SessionHandle, LivenessError> {
        self.stop().await;
        self.start()
    }

    /// Stop and release everything the controller holds.
    pub async fn dispose(mut self) {
        self.stop().await;
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        // Cannot await here; the task tears itself down on cancel.
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
        }
    }
}
