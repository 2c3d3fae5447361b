//! WebSocket session channel.
//!
//! Splits the socket into a writer task (commands → frames) and a reader
//! task (frames → events). The controller never touches the socket
//! itself.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::channel::{
    COMMAND_QUEUE, ChannelCommand, ChannelConnector, ChannelEvent, ChannelHandle, EVENT_QUEUE,
};
use crate::error::LivenessError;

/// Default limit on the opening handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens session channels over `ws://` / `wss://`.
#[derive(Debug, Clone, Copy)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl WsConnector {
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl ChannelConnector for WsConnector {
    async fn open(&self, address: &str) -> Result<ChannelHandle, LivenessError> {
        info!(%address, "opening session channel");
        let connecting = tokio_tungstenite::connect_async(address);
        let (socket, _response) = match tokio::time::timeout(self.connect_timeout, connecting).await
        {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => return Err(LivenessError::Connect(format!("{address}: {e}"))),
            Err(_) => return Err(LivenessError::Timeout(self.connect_timeout)),
        };
        let (mut net_writer, mut net_reader) = socket.split();

        // User -> Network
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<ChannelCommand>(COMMAND_QUEUE);

        // Network -> User
        let (event_tx, event_rx) = mpsc::channel::<ChannelEvent>(EVENT_QUEUE);
        event_tx.try_send(ChannelEvent::Ready).map_err(|_| LivenessError::ChannelClosed)?;

        // Writer task: User -> Network
        tokio::spawn(async move {
            while let Some(command) = cmd_rx.recv().await {
                match command {
                    ChannelCommand::Send(text) => {
                        if let Err(e) = net_writer.send(Message::Text(text)).await {
                            warn!("channel write error: {e}");
                            break;
                        }
                    }
                    ChannelCommand::Close => {
                        if let Err(e) = net_writer.send(Message::Close(None)).await {
                            debug!("close frame not sent: {e}");
                        }
                        break;
                    }
                }
            }
            let _ = net_writer.close().await;
        });

        // Reader task: Network -> User
        let reader = tokio::spawn(async move {
            let mut reason = String::from("stream ended");
            while let Some(result) = net_reader.next().await {
                let event = match result {
                    Ok(Message::Text(text)) => ChannelEvent::Message(text),
                    // Invalid UTF-8 still reaches the session, which reports
                    // it as malformed and keeps pacing frames.
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => ChannelEvent::Message(text),
                        Err(e) => {
                            warn!("non-utf8 binary message");
                            let text = String::from_utf8_lossy(e.as_bytes()).into_owned();
                            ChannelEvent::Message(text)
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        reason = frame
                            .map(|f| format!("{} {}", u16::from(f.code), f.reason))
                            .unwrap_or_else(|| "closed by peer".to_string());
                        break;
                    }
                    // Ping / pong are handled by tungstenite.
                    Ok(_) => continue,
                    Err(e) => {
                        reason = e.to_string();
                        if event_tx.send(ChannelEvent::Error(e.to_string())).await.is_err() {
                            return;
                        }
                        break;
                    }
                };
                if event_tx.send(event).await.is_err() {
                    // Handle was dropped, stop reading.
                    return;
                }
            }
            debug!(%reason, "session channel closed");
            let _ = event_tx.send(ChannelEvent::Closed { reason }).await;
        });

        Ok(ChannelHandle::from_parts(cmd_tx, event_rx, Some(reader)))
    }
}

// ── Tests ────────────────────────────────────────────────────────
