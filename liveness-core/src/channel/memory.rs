//! In-process session channel.
//!
//! Every `open` on a [`MemoryConnector`] yields a [`ChannelHandle`] for
//! the controller and a [`RemotePeer`] for whoever plays the service:
//! an embedding host that relays messages itself, or a test.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::channel::{
    COMMAND_QUEUE, ChannelCommand, ChannelConnector, ChannelEvent, ChannelHandle, EVENT_QUEUE,
};
use crate::error::LivenessError;
use crate::protocol::{InboundMessage, OutboundFrame};

/// Connector whose channels terminate in this process.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<RemotePeer>,
}

impl MemoryConnector {
    /// Returns the connector and the queue on which each opened
    /// channel's service end is delivered.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RemotePeer>) {
        let (peers, accepted) = mpsc::unbounded_channel();
        (Self { peers }, accepted)
    }
}

#[async_trait]
impl ChannelConnector for MemoryConnector {
    async fn open(&self, address: &str) -> Result<ChannelHandle, LivenessError> {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);

        let peer = RemotePeer {
            address: address.to_string(),
            events: event_tx,
            commands: cmd_rx,
            closed_by_client: false,
        };
        self.peers
            .send(peer)
            .map_err(|_| LivenessError::Connect(format!("{address}: nobody listening")))?;

        Ok(ChannelHandle::from_parts(cmd_tx, event_rx, None))
    }
}

/// The service end of an in-process channel.
#[derive(Debug)]
pub struct RemotePeer {
    address: String,
    events: mpsc::Sender<ChannelEvent>,
    commands: mpsc::Receiver<ChannelCommand>,
    closed_by_client: bool,
}

impl RemotePeer {
    /// Address the client asked for.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Report the channel as open.
    pub async fn ready(&self) -> Result<(), LivenessError> {
        self.emit(ChannelEvent::Ready).await
    }

    /// Deliver a protocol message.
    pub async fn send_message(&self, msg: &InboundMessage) -> Result<(), LivenessError> {
        self.send_text(serde_json::to_string(msg)?).await
    }

    /// Deliver a raw text payload, well-formed or not.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), LivenessError> {
        self.emit(ChannelEvent::Message(text.into())).await
    }

    /// Close from the service side.
    pub async fn close(&self, reason: impl Into<String>) -> Result<(), LivenessError> {
        self.emit(ChannelEvent::Closed {
            reason: reason.into(),
        })
        .await
    }

    /// Report a transport error.
    pub async fn fail(&self, detail: impl Into<String>) -> Result<(), LivenessError> {
        self.emit(ChannelEvent::Error(detail.into())).await
    }

    async fn emit(&self, event: ChannelEvent) -> Result<(), LivenessError> {
        Ok(self.events.send(event).await?)
    }

    /// Wait for the next frame the client sends.
    ///
    /// Returns `None` once the client closes the channel or drops it.
    pub async fn next_frame(&mut self) -> Option<OutboundFrame> {
        while let Some(command) = self.commands.recv().await {
            if let Some(frame) = self.absorb(command) {
                return Some(frame);
            }
        }
        None
    }

    /// A frame the client has already sent, without waiting.
    pub fn try_next_frame(&mut self) -> Option<OutboundFrame> {
        while let Ok(command) = self.commands.try_recv() {
            if let Some(frame) = self.absorb(command) {
                return Some(frame);
            }
        }
        None
    }

    /// Drain every frame queued so far and return how many there were.
    pub fn drain_frames(&mut self) -> usize {
        std::iter::from_fn(|| self.try_next_frame()).count()
    }

    fn absorb(&mut self, command: ChannelCommand) -> Option<OutboundFrame> {
        match command {
            ChannelCommand::Send(text) => serde_json::from_str(&text).ok(),
            ChannelCommand::Close => {
                self.closed_by_client = true;
                None
            }
        }
    }

    /// Whether the client has sent its close command. Frames still
    /// queued ahead of it are discarded.
    pub fn closed_by_client(&mut self) -> bool {
        while let Ok(command) = self.commands.try_recv() {
            self.absorb(command);
        }
        self.closed_by_client
    }

    /// Whether the client end has been dropped.
    pub fn is_client_gone(&self) -> bool {
        self.events.is_closed()
    }
}
