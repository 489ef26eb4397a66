//! WebSocket connection from an editing session to the coordinator.
//!
//! The connection owns two background tasks: a writer draining an outbound
//! channel and a reader decoding inbound frames into an event channel. The
//! session never touches the socket directly; a send/receive failure
//! surfaces as [`Event::Disconnected`] and the session keeps editing
//! locally.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::protocol::{Message, ProtocolError};

/// How long the initial dial may take before giving up.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(120);

/// Where and how to dial the coordinator.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// `host:port` of the coordinator.
    pub server: String,
    /// `wss://` instead of `ws://`.
    pub secure: bool,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        ConnectConfig {
            server: "localhost:8080".to_string(),
            secure: false,
        }
    }
}

impl ConnectConfig {
    pub fn url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}/", self.server)
    }
}

/// What the session sees from the wire.
#[derive(Debug)]
pub enum Event {
    Message(Message),
    /// The socket died; no reconnection is attempted.
    Disconnected,
}

/// A live connection to the coordinator.
pub struct Connection {
    out_tx: mpsc::UnboundedSender<Message>,
    events: Option<mpsc::UnboundedReceiver<Event>>,
}

impl Connection {
    /// Dial the coordinator and spawn the reader/writer tasks.
    pub async fn connect(config: &ConnectConfig) -> Result<Self, ProtocolError> {
        let url = config.url();
        let (ws, _) = timeout(HANDSHAKE_TIMEOUT, tokio_tungstenite::connect_async(&url))
            .await
            .map_err(|_| ProtocolError::Timeout)?
            .map_err(|e| {
                log::error!("failed to dial {url}: {e}");
                ProtocolError::ConnectionClosed
            })?;
        log::info!("connected to {url}");

        let (mut sink, mut reader) = ws.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let frame = match msg.encode() {
                    Ok(frame) => frame,
                    Err(e) => {
                        log::error!("failed to encode outbound message: {e}");
                        continue;
                    }
                };
                if let Err(e) = sink.send(WsMessage::Text(frame.into())).await {
                    log::error!("websocket write failed: {e}");
                    break;
                }
            }
            // Outbound queue gone: close the socket so the coordinator
            // notices immediately instead of at its next write.
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => match Message::decode(text.as_str()) {
                        Ok(msg) => {
                            log::debug!("message received: {:?}", msg.kind);
                            if event_tx.send(Event::Message(msg)).is_err() {
                                return;
                            }
                        }
                        // A malformed frame costs one message, not the
                        // session.
                        Err(e) => log::warn!("dropping malformed message: {e}"),
                    },
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        log::error!("websocket error: {e}");
                        break;
                    }
                }
            }
            let _ = event_tx.send(Event::Disconnected);
        });

        Ok(Connection {
            out_tx,
            events: Some(event_rx),
        })
    }

    /// Take the inbound event stream (once).
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<Event>> {
        self.events.take()
    }

    /// A clonable handle to the outbound queue, for callers that outlive
    /// this struct.
    pub fn sender(&self) -> mpsc::UnboundedSender<Message> {
        self.out_tx.clone()
    }

    /// Queue a message for the writer task.
    pub fn send(&self, msg: Message) -> Result<(), ProtocolError> {
        self.out_tx
            .send(msg)
            .map_err(|_| ProtocolError::ConnectionClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_scheme_follows_secure_flag() {
        let mut config = ConnectConfig::default();
        assert_eq!(config.url(), "ws://localhost:8080/");
        config.secure = true;
        config.server = "example.com:443".to_string();
        assert_eq!(config.url(), "wss://example.com:443/");
    }

    #[tokio::test]
    async fn connect_to_nothing_fails() {
        let config = ConnectConfig {
            server: "127.0.0.1:1".to_string(),
            secure: false,
        };
        assert!(Connection::connect(&config).await.is_err());
    }
}
