//! The bidirectional execution channel.
//!
//! Events arrive as JSON text frames; cancel requests and file read
//! responses go back over the same channel. [`WsChannel`] is the WebSocket
//! transport used against a real backend, [`MemoryChannel`] an in-process
//! pair for embedding and tests.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::ChannelError;
use crate::protocol::{AgentEvent, OutboundMessage};

/// A live event source for one workflow run.
#[async_trait]
pub trait EventChannel: Send {
    /// Receive the next event.
    ///
    /// Returns `None` once the channel has closed. Must be cancel-safe: the
    /// dispatcher polls it inside `tokio::select!`.
    async fn next_event(&mut self) -> Option<Result<AgentEvent, ChannelError>>;

    /// Send a message back to the agent.
    async fn send(&mut self, message: &OutboundMessage) -> Result<(), ChannelError>;

    /// Whether the channel is still open for sending.
    fn is_open(&self) -> bool;

    /// Close the channel. Idempotent.
    async fn close(&mut self);
}

/// WebSocket transport.
pub struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

impl WsChannel {
    /// Connect to a `ws://` or `wss://` URL.
    pub async fn connect(url: &str) -> Result<Self, ChannelError> {
        tracing::debug!(url = %url, "Opening event channel");
        let (stream, _) =
            connect_async(url).await.map_err(|e| ChannelError::Connect(e.to_string()))?;
        Ok(Self { stream, closed: false })
    }
}

#[async_trait]
impl EventChannel for WsChannel {
    async fn next_event(&mut self) -> Option<Result<AgentEvent, ChannelError>> {
        if self.closed {
            return None;
        }
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Some(AgentEvent::from_json(&text).map_err(ChannelError::from));
                }
                Some(Ok(Message::Close(_))) | None => {
                    self.closed = true;
                    return None;
                }
                // ping, pong, binary and raw frames carry no events
                Some(Ok(_)) => continue,
                Some(Err(err)) => {
                    self.closed = true;
                    return match ChannelError::from(err) {
                        ChannelError::Closed => None,
                        other => Some(Err(other)),
                    };
                }
            }
        }
    }

    async fn send(&mut self, message: &OutboundMessage) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        self.stream.send(Message::Text(message.to_json())).await.map_err(ChannelError::from)
    }

    fn is_open(&self) -> bool {
        !self.closed
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            if let Err(e) = self.stream.close(None).await {
                tracing::debug!(error = %e, "Event channel close handshake failed");
            }
        }
    }
}

/// In-process channel end held by the dispatcher.
pub struct MemoryChannel {
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    closed: bool,
}

/// The remote end of a [`MemoryChannel`], playing the agent's role.
pub struct MemoryRemote {
    events: Option<mpsc::UnboundedSender<String>>,
    outbound: mpsc::UnboundedReceiver<OutboundMessage>,
}

/// Create a connected in-process channel pair.
pub fn memory_channel() -> (MemoryChannel, MemoryRemote) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    (
        MemoryChannel { inbound: event_rx, outbound: out_tx, closed: false },
        MemoryRemote { events: Some(event_tx), outbound: out_rx },
    )
}

impl MemoryRemote {
    /// Deliver an event. Returns false if the channel is gone.
    pub fn send_event(&self, event: &AgentEvent) -> bool {
        self.send_raw(event.to_json())
    }

    /// Deliver a raw text frame.
    pub fn send_raw(&self, frame: impl Into<String>) -> bool {
        self.events.as_ref().is_some_and(|tx| tx.send(frame.into()).is_ok())
    }

    /// Close the inbound side; the dispatcher observes channel closure once
    /// queued events are drained.
    pub fn close(&mut self) {
        self.events = None;
    }

    /// Next message the client sent, waiting for one.
    pub async fn recv(&mut self) -> Option<OutboundMessage> {
        self.outbound.recv().await
    }

    /// Next message the client sent, if one is already queued.
    pub fn try_recv(&mut self) -> Option<OutboundMessage> {
        self.outbound.try_recv().ok()
    }
}

#[async_trait]
impl EventChannel for MemoryChannel {
    async fn next_event(&mut self) -> Option<Result<AgentEvent, ChannelError>> {
        if self.closed {
            return None;
        }
        match self.inbound.recv().await {
            Some(frame) => Some(AgentEvent::from_json(&frame).map_err(ChannelError::from)),
            None => {
                self.closed = true;
                None
            }
        }
    }

    async fn send(&mut self, message: &OutboundMessage) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        self.outbound.send(message.clone()).map_err(|_| ChannelError::Closed)
    }

    fn is_open(&self) -> bool {
        !self.closed
    }

    async fn close(&mut self) {
        self.closed = true;
        self.inbound.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ThoughtData, FileReadResponse};

    #[tokio::test]
    async fn test_memory_channel_round_trip() {
        let (mut channel, mut remote) = memory_channel();
        let event = AgentEvent::Thought(ThoughtData { content: "hmm".to_string() });
        assert!(remote.send_event(&event));

        assert_eq!(channel.next_event().await.unwrap().unwrap(), event);

        let reply = OutboundMessage::FileReadResponse(FileReadResponse::success("r1", "x"));
        channel.send(&reply).await.unwrap();
        assert_eq!(remote.recv().await, Some(reply));
    }

    #[tokio::test]
    async fn test_memory_channel_close_drains_then_ends() {
        let (mut channel, mut remote) = memory_channel();
        remote.send_raw(r#"{"type":"thought","data":{"content":"last"}}"#);
        remote.close();

        assert!(channel.next_event().await.unwrap().is_ok());
        assert!(channel.next_event().await.is_none());
        assert!(!channel.is_open());
        assert!(matches!(
            channel.send(&OutboundMessage::Cancel).await,
            Err(ChannelError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_memory_channel_malformed_frame() {
        let (mut channel, remote) = memory_channel();
        remote.send_raw("not json");
        assert!(matches!(channel.next_event().await, Some(Err(ChannelError::Malformed(_)))));
    }
}
