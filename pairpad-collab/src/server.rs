//! The session coordinator: accepts WebSocket connections, assigns site
//! ids, relays operations, and brokers the bootstrap snapshot handshake.
//!
//! ```text
//! Client A ──reader──┐                         ┌──writer── Client A
//! Client B ──reader──┼── operation stream ──┐  ├──writer── Client B
//! Client C ──reader──┘                      │  └──writer── Client C
//!                        sync stream ───────┤
//!                                           ▼
//!                                     relay pumps ── registry actor
//! ```
//!
//! Each connection gets one reader task and one writer task; the writer is
//! the sole owner of its socket half, so the bootstrap fan-out never
//! interleaves bytes with a relayed message. All roster access goes through
//! the registry actor.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use uuid::Uuid;

use crate::protocol::{Message, MessageType};
use crate::registry::Registry;

/// A client that cannot drain a frame in this window is dropped rather
/// than allowed to wedge the coordinator.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to; a bare `:port` binds every interface.
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            addr: ":8080".to_string(),
        }
    }
}

/// The coordinator. One instance serves one document session.
pub struct CollabServer {
    config: ServerConfig,
}

impl CollabServer {
    pub fn new(config: ServerConfig) -> Self {
        CollabServer { config }
    }

    /// Bind and serve forever. Only a listen failure escapes.
    pub async fn run(&self) -> io::Result<()> {
        let addr = normalize_addr(&self.config.addr);
        let listener = TcpListener::bind(&addr).await?;
        log::info!("listening on {addr}");
        self.serve(listener).await
    }

    /// Serve on an already-bound listener (tests bind port 0 themselves).
    pub async fn serve(&self, listener: TcpListener) -> io::Result<()> {
        let registry = Registry::spawn();
        let (op_tx, op_rx) = mpsc::unbounded_channel();
        let (sync_tx, sync_rx) = mpsc::unbounded_channel();
        let router = Router {
            registry,
            sync_tx: sync_tx.clone(),
        };

        tokio::spawn(relay_operations(op_rx, router.clone()));
        tokio::spawn(relay_sync(sync_rx, router.clone()));

        loop {
            let (stream, addr) = listener.accept().await?;
            let router = router.clone();
            let op_tx = op_tx.clone();
            let sync_tx = sync_tx.clone();
            tokio::spawn(async move {
                handle_connection(stream, addr, router, op_tx, sync_tx).await;
            });
        }
    }
}

/// Go-style `:port` listen addresses bind every interface.
fn normalize_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}

/// Message routing over the roster. Clonable; shared by the pumps, the
/// connection handlers, and the writer tasks.
#[derive(Clone)]
struct Router {
    registry: Registry,
    sync_tx: mpsc::UnboundedSender<Message>,
}

impl Router {
    /// Evict a client and, if it was still present, announce the shrunken
    /// user list. Idempotent across racing reader/writer failures.
    async fn drop_client(&self, id: Uuid) {
        if let Some(entry) = self.registry.remove(id).await {
            log::info!("removing {} ({id}) from the roster", entry.username);
            self.send_usernames().await;
        }
    }

    /// Queue the comma-separated user list for everyone via the sync pump.
    async fn send_usernames(&self) {
        let users = self.registry.usernames().await.join(",");
        let _ = self.sync_tx.send(Message::users(users));
    }

    async fn broadcast_one(&self, msg: Message, to: Uuid) {
        match self.registry.get(to).await {
            Some(entry) => {
                if entry.outbound.send(msg).is_err() {
                    self.drop_client(to).await;
                }
            }
            None => log::warn!("no client {to} to route to"),
        }
    }

    /// Deliver to the first reachable peer other than `except`; one
    /// snapshot reply is enough.
    async fn broadcast_one_except(&self, msg: Message, except: Uuid) {
        for entry in self.registry.list().await {
            if entry.id == except {
                continue;
            }
            if entry.outbound.send(msg.clone()).is_ok() {
                return;
            }
            self.drop_client(entry.id).await;
        }
    }

    async fn broadcast_all(&self, msg: &Message) {
        for entry in self.registry.list().await {
            if entry.outbound.send(msg.clone()).is_err() {
                self.drop_client(entry.id).await;
            }
        }
    }

    async fn broadcast_all_except(&self, msg: &Message, except: Uuid) {
        for entry in self.registry.list().await {
            if entry.id == except {
                continue;
            }
            if entry.outbound.send(msg.clone()).is_err() {
                self.drop_client(entry.id).await;
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    router: Router,
    op_tx: mpsc::UnboundedSender<Message>,
    sync_tx: mpsc::UnboundedSender<Message>,
) {
    let ws = match timeout(WRITE_TIMEOUT, tokio_tungstenite::accept_async(stream)).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            log::warn!("websocket upgrade failed for {addr}: {e}");
            return;
        }
        Err(_) => {
            log::warn!("websocket upgrade timed out for {addr}");
            return;
        }
    };
    let (mut sink, mut reader) = ws.split();

    let client_id = Uuid::new_v4();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
    let site_id = router.registry.add(client_id, out_tx).await;
    log::info!("client {client_id} connected from {addr}, assigned site id {site_id}");

    // Writer: sole owner of the outbound socket half.
    let writer_router = router.clone();
    tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let frame = match msg.encode() {
                Ok(frame) => frame,
                Err(e) => {
                    log::error!("failed to encode outbound message: {e}");
                    continue;
                }
            };
            match timeout(WRITE_TIMEOUT, sink.send(WsMessage::Text(frame.into()))).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    log::warn!("write to {client_id} failed: {e}");
                    break;
                }
                Err(_) => {
                    log::warn!("write to {client_id} timed out");
                    break;
                }
            }
        }
        // Eviction drops the roster's sender; close the socket so the
        // client's reader sees the disconnect right away.
        let _ = sink.close().await;
        writer_router.drop_client(client_id).await;
    });

    // Bootstrap: the newcomer learns its site id, one existing peer is
    // asked to snapshot its document, and everyone sees the new roster.
    router
        .broadcast_one(Message::site_id(site_id, client_id), client_id)
        .await;
    router
        .broadcast_one_except(Message::doc_req(client_id), client_id)
        .await;
    router.send_usernames().await;

    while let Some(frame) = reader.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => match Message::decode(text.as_str()) {
                Ok(msg) if msg.kind == MessageType::DocSync => {
                    // The snapshotting peer preserved the requester's id;
                    // route it straight to the sync pump.
                    let _ = sync_tx.send(msg);
                }
                Ok(mut msg) => {
                    msg.id = client_id;
                    let _ = op_tx.send(msg);
                }
                Err(e) => {
                    log::warn!("malformed message from {client_id}, closing: {e}");
                    break;
                }
            },
            Ok(WsMessage::Close(_)) => {
                log::info!("client {client_id} closed the connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!("read error from {client_id}: {e}");
                break;
            }
        }
    }

    router.drop_client(client_id).await;
}

/// Operation pump: joins and edits fan out to everyone but the sender.
async fn relay_operations(mut rx: mpsc::UnboundedReceiver<Message>, router: Router) {
    while let Some(msg) = rx.recv().await {
        match msg.kind {
            MessageType::Join => {
                router.registry.rename(msg.id, msg.username.clone());
                log::info!("{} {} (ID: {})", msg.username, msg.text, msg.id);
                router.broadcast_all_except(&msg, msg.id).await;
                router.send_usernames().await;
            }
            MessageType::Operation => {
                log::debug!(
                    "operation {:?} at {} from {}",
                    msg.operation.kind,
                    msg.operation.position,
                    msg.id
                );
                router.broadcast_all_except(&msg, msg.id).await;
            }
            other => {
                log::warn!("unhandled message type {other:?} from {}", msg.id);
                router.send_usernames().await;
            }
        }
    }
}

/// Sync pump: snapshots go to exactly the requester, user lists go to
/// everyone.
async fn relay_sync(mut rx: mpsc::UnboundedReceiver<Message>, router: Router) {
    while let Some(msg) = rx.recv().await {
        match msg.kind {
            MessageType::DocSync => {
                log::debug!("routing document snapshot to {}", msg.id);
                let to = msg.id;
                router.broadcast_one(msg, to).await;
            }
            MessageType::Users => {
                log::debug!("usernames: {}", msg.text);
                router.broadcast_all(&msg).await;
            }
            other => log::warn!("unexpected message type {other:?} on the sync stream"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_addr_binds_every_interface() {
        assert_eq!(ServerConfig::default().addr, ":8080");
        assert_eq!(normalize_addr(":8080"), "0.0.0.0:8080");
        assert_eq!(normalize_addr("127.0.0.1:9000"), "127.0.0.1:9000");
    }
}
