//! Terminal presentation: one line per status change.
//!
//! ```text
//! [◉○○]    Look at the camera | Position your face in the oval
//! [●◉○] >> Turn head LEFT | Move your head now!
//! [●●●] ** Liveness Verified!
//! ```

use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};

use liveness_core::{DotProgress, DotState, Highlight, PresentationSink, Severity};

struct Screen<W> {
    out: W,
    instruction: String,
    highlight: Highlight,
    dots: Vec<DotState>,
    last_line: String,
}

/// Sink that writes the session's progress to a terminal.
pub struct ConsoleSink<W: Write + Send = io::Stdout> {
    screen: Mutex<Screen<W>>,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            screen: Mutex::new(Screen {
                out,
                instruction: String::new(),
                highlight: Highlight::Idle,
                dots: Vec::new(),
                last_line: String::new(),
            }),
        }
    }

    /// Give back the writer.
    pub fn into_inner(self) -> W {
        match self.screen.into_inner() {
            Ok(screen) => screen.out,
            Err(poisoned) => poisoned.into_inner().out,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Screen<W>> {
        self.screen.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl<W: Write> Screen<W> {
    fn dots(&self) -> String {
        self.dots
            .iter()
            .map(|d| match d {
                DotState::Done => '●',
                DotState::Current => '◉',
                DotState::Neutral => '○',
            })
            .collect()
    }

    /// Print `line` unless it repeats the previous one.
    fn emit(&mut self, line: String) {
        if line == self.last_line {
            return;
        }
        if let Err(e) = writeln!(self.out, "{line}").and_then(|_| self.out.flush()) {
            tracing::debug!("console write failed: {e}");
        }
        self.last_line = line;
    }
}

impl<W: Write + Send> PresentationSink for ConsoleSink<W> {
    fn set_instruction(&self, text: &str) {
        self.lock().instruction = text.to_string();
    }

    fn set_status(&self, text: &str, severity: Severity) {
        let mut screen = self.lock();
        let marker = match (severity, screen.highlight) {
            (Severity::Error, _) => "!!",
            (_, Highlight::Active) => ">>",
            (_, Highlight::Ok) => "ok",
            (_, Highlight::Idle) => "  ",
        };
        let mut line = format!("[{}] {marker} {}", screen.dots(), screen.instruction);
        if !text.is_empty() {
            line.push_str(" | ");
            line.push_str(text);
        }
        screen.emit(line);
    }

    fn set_highlight(&self, mode: Highlight) {
        self.lock().highlight = mode;
    }

    fn set_progress(&self, progress: DotProgress) {
        self.lock().dots = progress.states();
    }

    fn show_terminal_result(&self, ok: bool, text: &str) {
        let mut screen = self.lock();
        let marker = if ok { "**" } else { "xx" };
        let line = format!("[{}] {marker} {text}", screen.dots());
        screen.emit(line);
    }

    fn clear_terminal_result(&self) {}

    fn reset_to_idle(&self) {
        let mut screen = self.lock();
        screen.instruction.clear();
        screen.highlight = Highlight::Idle;
        screen.dots.fill(DotState::Neutral);
        screen.last_line.clear();
    }

    fn show_start_control(&self) {}

    fn hide_start_control(&self) {}
}
