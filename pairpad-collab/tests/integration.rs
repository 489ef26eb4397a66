//! End-to-end tests for the coordinator: a real server on an ephemeral
//! port, real WebSocket clients, and the full join/sync/relay pipeline.

use pairpad_collab::client::{ConnectConfig, Connection, Event};
use pairpad_collab::protocol::{EditOperation, Message, MessageType};
use pairpad_collab::server::{CollabServer, ServerConfig};
use pairpad_crdt::Replica;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

/// Boot a server on a free port, return its `host:port`.
async fn start_test_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let server = CollabServer::new(ServerConfig::default());
        server.serve(listener).await.unwrap();
    });
    format!("127.0.0.1:{}", addr.port())
}

struct TestClient {
    conn: Connection,
    events: mpsc::UnboundedReceiver<Event>,
}

async fn connect(server: &str) -> TestClient {
    let mut conn = Connection::connect(&ConnectConfig {
        server: server.to_string(),
        secure: false,
    })
    .await
    .expect("client should connect");
    let events = conn.take_events().unwrap();
    TestClient { conn, events }
}

impl TestClient {
    /// Receive frames until one of the wanted kind arrives.
    async fn expect(&mut self, kind: MessageType) -> Message {
        loop {
            let event = timeout(Duration::from_secs(2), self.events.recv())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for {kind:?}"))
                .expect("event stream ended");
            match event {
                Event::Message(msg) if msg.kind == kind => return msg,
                Event::Message(_) => continue,
                Event::Disconnected => panic!("disconnected while waiting for {kind:?}"),
            }
        }
    }

    /// Receive `users` frames until the predicate holds.
    async fn expect_users(&mut self, predicate: impl Fn(&str) -> bool) -> String {
        loop {
            let msg = self.expect(MessageType::Users).await;
            if predicate(&msg.text) {
                return msg.text;
            }
        }
    }
}

#[tokio::test]
async fn site_ids_are_assigned_in_connection_order() {
    let server = start_test_server().await;

    let mut first = connect(&server).await;
    let site1 = first.expect(MessageType::SiteId).await;
    assert_eq!(site1.text, "1");

    let mut second = connect(&server).await;
    let site2 = second.expect(MessageType::SiteId).await;
    assert_eq!(site2.text, "2");
}

#[tokio::test]
async fn join_flow_ships_a_snapshot_to_the_newcomer() {
    let server = start_test_server().await;

    // First participant holds "HELLO".
    let mut u1 = connect(&server).await;
    let site = u1.expect(MessageType::SiteId).await;
    u1.conn.send(Message::join("U1")).unwrap();

    let mut replica = Replica::new();
    replica.set_site_id(site.text.parse().unwrap());
    for (i, ch) in "HELLO".chars().enumerate() {
        replica.insert(i + 1, ch.to_string()).unwrap();
    }

    // Newcomer connects; the coordinator asks U1 for its document.
    let mut u2 = connect(&server).await;
    let doc_req = u1.expect(MessageType::DocReq).await;
    u1.conn
        .send(Message::doc_sync(replica.document.clone(), doc_req.id))
        .unwrap();

    let site2 = u2.expect(MessageType::SiteId).await;
    assert_eq!(site2.text, "2");
    let snapshot = u2.expect(MessageType::DocSync).await;
    assert_eq!(snapshot.document.content(), "HELLO");

    // Once both have joined, everyone sees both names.
    u2.conn.send(Message::join("U2")).unwrap();
    let users = u2
        .expect_users(|text| text.contains("U1") && text.contains("U2"))
        .await;
    let mut names: Vec<&str> = users.split(',').collect();
    names.sort_unstable();
    assert_eq!(names, ["U1", "U2"]);
}

#[tokio::test]
async fn join_is_announced_to_existing_peers() {
    let server = start_test_server().await;

    let mut u1 = connect(&server).await;
    u1.expect(MessageType::SiteId).await;
    u1.conn.send(Message::join("U1")).unwrap();

    let mut u2 = connect(&server).await;
    u2.expect(MessageType::SiteId).await;
    u2.conn.send(Message::join("U2")).unwrap();

    let join = u1.expect(MessageType::Join).await;
    assert_eq!(join.username, "U2");
    assert_eq!(join.text, "has joined the session.");
}

#[tokio::test]
async fn operations_reach_peers_but_not_the_sender() {
    let server = start_test_server().await;

    let mut u1 = connect(&server).await;
    u1.expect(MessageType::SiteId).await;
    u1.conn.send(Message::join("U1")).unwrap();

    let mut u2 = connect(&server).await;
    u2.expect(MessageType::SiteId).await;
    u2.conn.send(Message::join("U2")).unwrap();

    // Let the join traffic settle on both sides.
    u1.expect(MessageType::Join).await;
    u2.expect_users(|text| text.contains("U1") && text.contains("U2"))
        .await;

    u2.conn
        .send(Message::operation("U2", EditOperation::insert(1, "A")))
        .unwrap();

    let op = u1.expect(MessageType::Operation).await;
    assert_eq!(op.username, "U2");
    assert_eq!(op.operation.position, 1);
    assert_eq!(op.operation.value, "A");

    // The sender must not hear its own operation echoed back.
    let echoed = timeout(Duration::from_millis(300), async {
        loop {
            match u2.events.recv().await {
                Some(Event::Message(msg)) if msg.kind == MessageType::Operation => return msg,
                Some(_) => continue,
                None => std::future::pending().await,
            }
        }
    })
    .await;
    assert!(echoed.is_err(), "operation was echoed to its sender");
}

#[tokio::test]
async fn disconnect_removes_the_client_and_refreshes_the_roster() {
    let server = start_test_server().await;

    let mut u1 = connect(&server).await;
    u1.expect(MessageType::SiteId).await;
    u1.conn.send(Message::join("U1")).unwrap();

    let mut u2 = connect(&server).await;
    u2.expect(MessageType::SiteId).await;
    u2.conn.send(Message::join("U2")).unwrap();
    u2.expect_users(|text| text.contains("U1") && text.contains("U2"))
        .await;

    drop(u1);

    let after = u2.expect_users(|text| !text.contains("U1")).await;
    assert!(after.contains("U2"));
}

#[tokio::test]
async fn malformed_frames_drop_the_client() {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    let server = start_test_server().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{server}/"))
        .await
        .unwrap();

    ws.send(WsMessage::Text("not json".into())).await.unwrap();

    // The coordinator closes the connection; the stream ends within the
    // timeout instead of idling.
    let closed = timeout(Duration::from_secs(2), async {
        loop {
            match ws.next().await {
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(_)) => break,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "connection should be closed by the server");
}

#[tokio::test]
async fn first_client_gets_no_snapshot_request() {
    let server = start_test_server().await;

    let mut u1 = connect(&server).await;
    u1.expect(MessageType::SiteId).await;

    // With no peers to ask, the accept flow sends only the site id and the
    // user list; a docReq must never arrive.
    let unexpected = timeout(Duration::from_millis(300), async {
        loop {
            match u1.events.recv().await {
                Some(Event::Message(msg)) if msg.kind == MessageType::DocReq => return,
                Some(_) => continue,
                None => std::future::pending().await,
            }
        }
    })
    .await;
    assert!(unexpected.is_err(), "newcomer with no peers got a docReq");
}
