//! Session configuration and completion hooks.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::capture::CaptureConstraints;
use crate::encoder::DEFAULT_QUALITY;
use crate::error::LivenessError;
use crate::labels::LabelTable;
use crate::render::MAX_STEPS;
use crate::state::SessionOutcome;

// ── SessionConfig ────────────────────────────────────────────────

/// Configuration for one [`SessionController`](super::SessionController).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Channel address, e.g. `wss://host/ws`.
    pub address: String,
    /// Delay between a reply and the next frame.
    pub frame_interval: Duration,
    /// JPEG quality as a fraction in `(0, 1]`.
    pub jpeg_quality: f32,
    /// Dots to draw until the service reports its own total.
    pub total_steps: u32,
    /// Fail the session when the service is silent this long.
    /// `None` waits forever.
    pub idle_timeout: Option<Duration>,
    /// Camera constraints.
    pub constraints: CaptureConstraints,
    /// Direction labels.
    pub labels: LabelTable,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            address: "ws://127.0.0.1:8000/ws".into(),
            frame_interval: Duration::from_millis(150),
            jpeg_quality: DEFAULT_QUALITY,
            total_steps: 3,
            idle_timeout: Some(Duration::from_secs(15)),
            constraints: CaptureConstraints::default(),
            labels: LabelTable::default(),
        }
    }
}

impl SessionConfig {
    /// Create a config for `address` with every other value defaulted.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Reject values the session loop cannot work with.
    pub fn validate(&self) -> Result<(), LivenessError> {
        if self.address.trim().is_empty() {
            return Err(LivenessError::InvalidConfig("channel address is empty"));
        }
        if self.frame_interval.is_zero() {
            return Err(LivenessError::InvalidConfig("frame interval must be non-zero"));
        }
        if !(self.jpeg_quality > 0.0 && self.jpeg_quality <= 1.0) {
            return Err(LivenessError::InvalidConfig("jpeg quality must be in (0, 1]"));
        }
        if !(1..=MAX_STEPS).contains(&self.total_steps) {
            return Err(LivenessError::InvalidConfig("total steps must be in 1..=16"));
        }
        if self.idle_timeout.is_some_and(|t| t.is_zero()) {
            return Err(LivenessError::InvalidConfig("idle timeout must be non-zero"));
        }
        if !self.constraints.is_valid() {
            return Err(LivenessError::InvalidConfig(
                "capture size must be in 1..=8192 on each side",
            ));
        }
        Ok(())
    }
}

// ── SessionHooks ─────────────────────────────────────────────────

type SuccessHook = Arc<dyn Fn() + Send + Sync>;
type FailHook = Arc<dyn Fn(Option<&str>, Option<&str>) + Send + Sync>;

/// Optional callbacks fired when the service delivers a verdict.
///
/// Each fires at most once per session, after the camera is released and
/// the channel closed. Connection loss and cancellation fire neither;
/// await [`SessionHandle::outcome`](super::SessionHandle::outcome) for
/// those.
#[derive(Clone, Default)]
pub struct SessionHooks {
    on_success: Option<SuccessHook>,
    on_fail: Option<FailHook>,
}

impl SessionHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(f));
        self
    }

    /// `f(reason, message)`, both exactly as the service sent them.
    pub fn on_fail(mut self, f: impl Fn(Option<&str>, Option<&str>) + Send + Sync + 'static) -> Self {
        self.on_fail = Some(Arc::new(f));
        self
    }

    pub(crate) fn notify(&self, outcome: &SessionOutcome) {
        match outcome {
            SessionOutcome::Verified => {
                if let Some(f) = &self.on_success {
                    f();
                }
            }
            SessionOutcome::Failed { reason, message } => {
                if let Some(f) = &self.on_fail {
                    f(reason.as_deref(), message.as_deref());
                }
            }
            _ => {}
        }
    }
}

impl fmt::Debug for SessionHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHooks")
            .field("on_success", &self.on_success.is_some())
            .field("on_fail", &self.on_fail.is_some())
            .finish()
    }
}
