//! Session channel: a message-oriented, bidirectional link to the
//! liveness service.
//!
//! A [`ChannelConnector`] opens a [`ChannelHandle`]. The handle is a pair
//! of mpsc queues fed by background tasks, so the controller only ever
//! sees three kinds of event (ready, message, closed/error) and a
//! fire-and-forget `send`.

pub mod memory;
pub mod ws;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::LivenessError;
use crate::protocol::OutboundFrame;

pub use memory::{MemoryConnector, RemotePeer};
pub use ws::{DEFAULT_CONNECT_TIMEOUT, WsConnector};

/// Depth of the outbound command queue.
pub(crate) const COMMAND_QUEUE: usize = 32;
/// Depth of the inbound event queue.
pub(crate) const EVENT_QUEUE: usize = 64;

// ── Events and commands ──────────────────────────────────────────

/// Something the channel observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The channel is open and may be written to.
    Ready,
    /// One inbound text payload.
    Message(String),
    /// The channel closed. No further events follow.
    Closed { reason: String },
    /// Transport failure; a `Closed` usually follows.
    Error(String),
}

/// Instruction for the writer side of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelCommand {
    /// Send one text payload.
    Send(String),
    /// Close the channel gracefully.
    Close,
}

// ── ChannelHandle ────────────────────────────────────────────────

/// The controller's end of an open session channel.
#[derive(Debug)]
pub struct ChannelHandle {
    commands: mpsc::Sender<ChannelCommand>,
    events: mpsc::Receiver<ChannelEvent>,
    open: bool,
    closed: bool,
    reader: Option<JoinHandle<()>>,
}

impl ChannelHandle {
    /// Assemble a handle from its queues. `reader` is aborted when the
    /// handle is closed or dropped.
    pub fn from_parts(
        commands: mpsc::Sender<ChannelCommand>,
        events: mpsc::Receiver<ChannelEvent>,
        reader: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            commands,
            events,
            open: false,
            closed: false,
            reader,
        }
    }

    /// Whether the channel reported ready and has not closed since.
    pub fn is_open(&self) -> bool {
        self.open && !self.closed
    }

    /// Next event, or `None` once every producer is gone.
    ///
    /// Cancel-safe: dropping the future loses no event.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        let event = self.events.recv().await;
        match &event {
            Some(ChannelEvent::Ready) => self.open = !self.closed,
            Some(ChannelEvent::Closed { .. }) | Some(ChannelEvent::Error(_)) | None => {
                self.open = false
            }
            Some(ChannelEvent::Message(_)) => {}
        }
        event
    }

    /// Queue one frame for sending.
    ///
    /// Returns [`LivenessError::ChannelClosed`] when the channel is not
    /// open; callers check [`is_open`](Self::is_open) first.
    pub async fn send(&self, frame: &OutboundFrame) -> Result<(), LivenessError> {
        if !self.is_open() {
            return Err(LivenessError::ChannelClosed);
        }
        self.commands
            .send(ChannelCommand::Send(frame.to_json()?))
            .await?;
        Ok(())
    }

    /// Close the channel. Safe to call more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.open = false;
        if self.commands.try_send(ChannelCommand::Close).is_err() {
            debug!("channel writer already gone");
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.close();
    }
}

// ── ChannelConnector ─────────────────────────────────────────────

/// Opens session channels.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    /// Open a channel to `address`.
    ///
    /// The returned handle emits [`ChannelEvent::Ready`] once writable.
    async fn open(&self, address: &str) -> Result<ChannelHandle, LivenessError>;
}

// ── Tests ────────────────────────────────────────────────────────
