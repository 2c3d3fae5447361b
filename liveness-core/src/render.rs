//! Declarative presentation model.
//!
//! The session controller never touches widgets directly. It computes a
//! [`RenderInstruction`] per protocol message and pushes it into a
//! [`PresentationSink`]; the sink owns nothing the controller reads back.

use std::sync::Mutex;

// ── Status text ──────────────────────────────────────────────────

pub const STATUS_POSITION_FACE: &str = "Position your face in the oval";
pub const STATUS_NO_FACE: &str = "No face detected";
pub const STATUS_WRONG_DIRECTION: &str = "Wrong direction!";
pub const STATUS_CENTER_FACE: &str = "Center your face";
pub const STATUS_FOLLOW_PROMPT: &str = "Move your head as shown";
pub const STATUS_MOVE_NOW: &str = "Move your head now!";
pub const STATUS_STEP_PASSED: &str = "Good! Look back at the camera";
pub const STATUS_CONNECTED: &str = "Connected...";
pub const STATUS_CONNECTION_ERROR: &str = "Connection error";
pub const STATUS_CONNECTION_LOST: &str = "Connection lost";
pub const STATUS_CONNECTION_TIMEOUT: &str = "Connection timed out";
pub const STATUS_BAD_MESSAGE: &str = "Unexpected response from server";
pub const INSTRUCTION_INITIALIZING: &str = "Initializing...";
pub const RESULT_VERIFIED: &str = "Liveness Verified!";
pub const RESULT_FAILED: &str = "Verification failed";

/// Status line shown when the camera cannot be acquired.
pub fn camera_error_status(detail: &str) -> String {
    format!("Camera error: {detail}")
}

// ── Value types ──────────────────────────────────────────────────

/// Visual weight of the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Severity {
    #[default]
    Normal,
    Error,
}

/// Highlight of the video frame border.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Highlight {
    /// Neutral border.
    #[default]
    Idle,
    /// A movement is expected right now.
    Active,
    /// The last movement was accepted.
    Ok,
}

/// State of a single progress dot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DotState {
    #[default]
    Neutral,
    Done,
    Current,
}

/// Most dots a progress row will draw.
pub const MAX_STEPS: u32 = 16;

/// Dot-progress derived from the latest step count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DotProgress {
    passed: u32,
    total: u32,
    /// Whether the next dot is marked as current.
    marked: bool,
}

impl DotProgress {
    /// `total` is clamped to [`MAX_STEPS`] and `passed` to `total`.
    pub fn new(passed: u32, total: u32) -> Self {
        let total = total.min(MAX_STEPS);
        Self {
            passed: passed.min(total),
            total,
            marked: true,
        }
    }

    /// All dots neutral.
    pub fn cleared(total: u32) -> Self {
        Self {
            passed: 0,
            total: total.min(MAX_STEPS),
            marked: false,
        }
    }

    pub fn passed(&self) -> u32 {
        self.passed
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    /// Dots `[0, passed)` are done, dot `passed` is current, the rest
    /// are neutral.
    pub fn states(&self) -> Vec<DotState> {
        (0..self.total)
            .map(|i| match i.cmp(&self.passed) {
                std::cmp::Ordering::Less => DotState::Done,
                std::cmp::Ordering::Equal if self.marked => DotState::Current,
                _ => DotState::Neutral,
            })
            .collect()
    }
}

/// Everything the presentation needs for one protocol step.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderInstruction {
    pub instruction: String,
    pub status: String,
    pub severity: Severity,
    pub highlight: Highlight,
    pub progress: Option<DotProgress>,
}

impl RenderInstruction {
    /// The blank "initializing" frame shown while the session starts up.
    pub fn initializing(total: u32) -> Self {
        Self {
            instruction: INSTRUCTION_INITIALIZING.to_string(),
            status: String::new(),
            severity: Severity::Normal,
            highlight: Highlight::Idle,
            progress: Some(DotProgress::cleared(total)),
        }
    }

    /// Push every field into `sink`. Status goes last, so a sink that
    /// redraws on status sees the rest already updated.
    pub fn apply(&self, sink: &dyn PresentationSink) {
        if let Some(progress) = self.progress {
            sink.set_progress(progress);
        }
        sink.set_instruction(&self.instruction);
        sink.set_highlight(self.highlight);
        sink.set_status(&self.status, self.severity);
    }
}

// ── PresentationSink ─────────────────────────────────────────────

/// Receiver of render instructions.
///
/// Methods take `&self` so a sink can be shared between the host and
/// the session task; implementations use interior mutability.
pub trait PresentationSink: Send + Sync {
    fn set_instruction(&self, text: &str);
    fn set_status(&self, text: &str, severity: Severity);
    fn set_highlight(&self, mode: Highlight);
    fn set_progress(&self, progress: DotProgress);
    /// Show the terminal overlay.
    fn show_terminal_result(&self, ok: bool, text: &str);
    /// Remove the terminal overlay, if shown.
    fn clear_terminal_result(&self);
    /// Back to the "ready to start" presentation.
    fn reset_to_idle(&self);
    fn show_start_control(&self);
    fn hide_start_control(&self);
}

// ── RecordingSink ────────────────────────────────────────────────

/// One call made on a [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Instruction(String),
    Status(String, Severity),
    Highlight(Highlight),
    Progress(DotProgress),
    TerminalResult { ok: bool, text: String },
    ClearTerminalResult,
    ResetToIdle,
    StartControl { visible: bool },
}

/// Latest value of every widget, as a headless host would draw it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SinkSnapshot {
    pub instruction: String,
    pub status: String,
    pub severity: Severity,
    pub highlight: Highlight,
    pub dots: Vec<DotState>,
    pub terminal: Option<(bool, String)>,
    pub start_visible: bool,
}

#[derive(Debug, Default)]
struct Recorded {
    events: Vec<SinkEvent>,
    snapshot: SinkSnapshot,
}

/// In-memory sink that records every call and tracks current widget
/// state.
#[derive(Debug, Default)]
pub struct RecordingSink {
    inner: Mutex<Recorded>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call so far, in order.
    pub fn events(&self) -> Vec<SinkEvent> {
        self.lock().events.clone()
    }

    /// Current widget state.
    pub fn snapshot(&self) -> SinkSnapshot {
        self.lock().snapshot.clone()
    }

    /// Number of terminal overlays shown so far.
    pub fn terminal_count(&self) -> usize {
        self.lock()
            .events
            .iter()
            .filter(|e| matches!(e, SinkEvent::TerminalResult { .. }))
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn record(&self, event: SinkEvent) {
        let mut rec = self.lock();
        match &event {
            SinkEvent::Instruction(text) => rec.snapshot.instruction = text.clone(),
            SinkEvent::Status(text, severity) => {
                rec.snapshot.status = text.clone();
                rec.snapshot.severity = *severity;
            }
            SinkEvent::Highlight(mode) => rec.snapshot.highlight = *mode,
            SinkEvent::Progress(progress) => rec.snapshot.dots = progress.states(),
            SinkEvent::TerminalResult { ok, text } => {
                rec.snapshot.terminal = Some((*ok, text.clone()))
            }
            SinkEvent::ClearTerminalResult => rec.snapshot.terminal = None,
            SinkEvent::ResetToIdle => {
                let start_visible = rec.snapshot.start_visible;
                let dots = rec.snapshot.dots.len();
                rec.snapshot = SinkSnapshot {
                    dots: vec![DotState::Neutral; dots],
                    start_visible,
                    ..SinkSnapshot::default()
                };
            }
            SinkEvent::StartControl { visible } => rec.snapshot.start_visible = *visible,
        }
        rec.events.push(event);
    }
}

impl PresentationSink for RecordingSink {
    fn set_instruction(&self, text: &str) {
        self.record(SinkEvent::Instruction(text.to_string()));
    }

    fn set_status(&self, text: &str, severity: Severity) {
        self.record(SinkEvent::Status(text.to_string(), severity));
    }

    fn set_highlight(&self, mode: Highlight) {
        self.record(SinkEvent::Highlight(mode));
    }

    fn set_progress(&self, progress: DotProgress) {
        self.record(SinkEvent::Progress(progress));
    }

    fn show_terminal_result(&self, ok: bool, text: &str) {
        self.record(SinkEvent::TerminalResult {
            ok,
            text: text.to_string(),
        });
    }

    fn clear_terminal_result(&self) {
        self.record(SinkEvent::ClearTerminalResult);
    }

    fn reset_to_idle(&self) {
        self.record(SinkEvent::ResetToIdle);
    }

    fn show_start_control(&self) {
        self.record(SinkEvent::StartControl { visible: true });
    }

    fn hide_start_control(&self) {
        self.record(SinkEvent::StartControl { visible: false });
    }
}

// ── Tests ────────────────────────────────────────────────────────
