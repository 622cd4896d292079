//! End-to-end relay scenarios over real WebSocket connections.
//!
//! Each test starts a relay on an ephemeral port and drives it with
//! tokio-tungstenite clients.

use cliprelay::config::Config;
use cliprelay::server::{self, ClipRelay};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestRelay {
    relay: Arc<ClipRelay>,
    addr: std::net::SocketAddr,
    _stop: oneshot::Sender<()>,
}

impl TestRelay {
    async fn start(config: Config) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let relay = Arc::new(ClipRelay::new(config));
        let (stop, stopped) = oneshot::channel::<()>();
        tokio::spawn(server::run(relay.clone(), listener, async move {
            let _ = stopped.await;
        }));
        Self {
            relay,
            addr,
            _stop: stop,
        }
    }

    fn ws_url(&self) -> String {
        format!("ws://{}{}", self.addr, self.relay.config().websocket.path)
    }

    async fn connect(&self) -> Client {
        let (client, _) = connect_async(self.ws_url()).await.unwrap();
        client
    }

    async fn wait_for_live(&self, expected: usize) {
        for _ in 0..200 {
            if self.relay.hub().live_count().await.unwrap() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("live count never reached {}", expected);
    }
}

async fn send(client: &mut Client, frame: Value) {
    client.send(Message::Text(frame.to_string())).await.unwrap();
}

/// Read the next `n` JSON frames, splitting coalesced text frames.
async fn recv(client: &mut Client, n: usize) -> Vec<Value> {
    let mut out = Vec::new();
    while out.len() < n {
        let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for frame")
            .expect("connection closed")
            .unwrap();
        if let Message::Text(text) = msg {
            for line in text.split('\n') {
                out.push(serde_json::from_str(line).unwrap());
            }
        }
    }
    out
}

async fn register(client: &mut Client, key: &str) {
    send(client, json!({"type": "register", "keyHash": key})).await;
    let reply = recv(client, 1).await;
    assert_eq!(reply[0]["type"], "register_success");
}

// ============================================================================
// Registration and relay
// ============================================================================

#[tokio::test]
async fn message_reaches_every_other_group_member() {
    let relay = TestRelay::start(Config::default()).await;
    let mut a = relay.connect().await;
    let mut b = relay.connect().await;
    let mut c = relay.connect().await;

    register(&mut a, "abc").await;
    register(&mut b, "abc").await;
    register(&mut c, "abc").await;

    send(
        &mut a,
        json!({"type": "message", "keyHash": "abc", "encryptedMessage": "X"}),
    )
    .await;

    for peer in [&mut b, &mut c] {
        let got = recv(peer, 1).await;
        assert_eq!(got[0], json!({"type": "message", "encryptedMessage": "X"}));
    }
}

#[tokio::test]
async fn groups_are_isolated() {
    let relay = TestRelay::start(Config::default()).await;
    let mut a = relay.connect().await;
    let mut b = relay.connect().await;
    let mut other = relay.connect().await;

    register(&mut a, "abc").await;
    register(&mut b, "abc").await;
    register(&mut other, "xyz").await;

    send(
        &mut a,
        json!({"type": "message", "keyHash": "abc", "encryptedMessage": "for-abc"}),
    )
    .await;
    assert_eq!(recv(&mut b, 1).await[0]["encryptedMessage"], "for-abc");

    // Nothing for the other group: its next frame is its own error reply.
    send(&mut other, json!({"type": "nope"})).await;
    assert_eq!(recv(&mut other, 1).await[0]["type"], "error");
}

#[tokio::test]
async fn copy_is_relayed_and_acknowledged() {
    let relay = TestRelay::start(Config::default()).await;
    let mut a = relay.connect().await;
    let mut b = relay.connect().await;
    register(&mut a, "abc").await;
    register(&mut b, "abc").await;

    send(
        &mut a,
        json!({
            "type": "copy",
            "keyHash": "abc",
            "encryptedContent": "aW1hZ2U=",
            "contentType": "image",
        }),
    )
    .await;

    let ack = recv(&mut a, 1).await;
    assert_eq!(ack[0]["type"], "copy_response");
    assert_eq!(ack[0]["success"], true);

    let relayed = recv(&mut b, 1).await;
    assert_eq!(
        relayed[0],
        json!({"type": "copy", "encryptedContent": "aW1hZ2U=", "contentType": "image"})
    );
}

#[tokio::test]
async fn reregister_moves_connection_to_new_group() {
    let relay = TestRelay::start(Config::default()).await;
    let mut a = relay.connect().await;
    let mut old_peer = relay.connect().await;
    let mut new_peer = relay.connect().await;

    register(&mut a, "old").await;
    register(&mut old_peer, "old").await;
    register(&mut new_peer, "new").await;
    register(&mut a, "new").await;

    send(
        &mut new_peer,
        json!({"type": "message", "keyHash": "new", "encryptedMessage": "hi"}),
    )
    .await;
    assert_eq!(recv(&mut a, 1).await[0]["encryptedMessage"], "hi");

    send(
        &mut old_peer,
        json!({"type": "message", "keyHash": "old", "encryptedMessage": "stale"}),
    )
    .await;
    // The hub applies old_peer's commands in order, so once its error reply
    // arrives the broadcast has been handled.
    send(&mut old_peer, json!({"type": "sync"})).await;
    assert_eq!(recv(&mut old_peer, 1).await[0]["type"], "error");

    send(&mut a, json!({"type": "ping-me"})).await;
    // The unknown-type error is the only thing `a` receives.
    assert_eq!(recv(&mut a, 1).await[0]["type"], "error");
}

// ============================================================================
// Rejections keep the connection open
// ============================================================================

#[tokio::test]
async fn rejected_requests_get_error_frames() {
    let relay = TestRelay::start(Config::default()).await;
    let mut a = relay.connect().await;

    send(
        &mut a,
        json!({"type": "message", "keyHash": "abc", "encryptedMessage": "X"}),
    )
    .await;
    assert_eq!(
        recv(&mut a, 1).await[0],
        json!({"type": "error", "message": "register first"})
    );

    send(&mut a, json!({"type": "register", "keyHash": ""})).await;
    assert_eq!(
        recv(&mut a, 1).await[0],
        json!({"type": "error", "message": "key hash must not be empty"})
    );

    register(&mut a, "abc").await;
    send(
        &mut a,
        json!({"type": "message", "keyHash": "xyz", "encryptedMessage": "X"}),
    )
    .await;
    assert_eq!(
        recv(&mut a, 1).await[0],
        json!({"type": "error", "message": "key mismatch"})
    );

    send(&mut a, json!({"type": "teleport"})).await;
    assert_eq!(
        recv(&mut a, 1).await[0],
        json!({"type": "error", "message": "unknown message type"})
    );

    // Malformed frames are dropped without a reply.
    a.send(Message::Text("{not json".into())).await.unwrap();
    register(&mut a, "abc").await;
}

// ============================================================================
// Lifecycle and admission
// ============================================================================

#[tokio::test]
async fn closing_client_is_unregistered() {
    let relay = TestRelay::start(Config::default()).await;
    let mut a = relay.connect().await;
    let b = relay.connect().await;
    register(&mut a, "abc").await;
    relay.wait_for_live(2).await;

    drop(b);
    relay.wait_for_live(1).await;

    a.close(None).await.unwrap();
    relay.wait_for_live(0).await;
}

#[tokio::test]
async fn upgrades_beyond_max_connections_are_refused() {
    let mut config = Config::default();
    config.websocket.max_connections = 1;
    let relay = TestRelay::start(config).await;

    let _first = relay.connect().await;
    relay.wait_for_live(1).await;

    match connect_async(relay.ws_url()).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 503),
        other => panic!("Expected HTTP 503, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn concurrent_upgrades_respect_max_connections() {
    let mut config = Config::default();
    config.websocket.max_connections = 1;
    config.limits.connections_per_ip = 100;
    let relay = TestRelay::start(config).await;

    let attempts: Vec<_> = (0..8)
        .map(|_| tokio::spawn(connect_async(relay.ws_url())))
        .collect();

    let mut accepted = Vec::new();
    let mut refused = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok((client, _)) => accepted.push(client),
            Err(tungstenite::Error::Http(response)) => {
                assert_eq!(response.status(), 503);
                refused += 1;
            }
            Err(e) => panic!("Unexpected connect error: {}", e),
        }
    }

    assert_eq!(accepted.len(), 1);
    assert_eq!(refused, 7);
    relay.wait_for_live(1).await;
    assert_eq!(relay.relay.available_slots(), 0);

    // The slot comes back once the admitted client leaves.
    drop(accepted);
    relay.wait_for_live(0).await;
    for _ in 0..200 {
        if relay.relay.available_slots() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let _next = relay.connect().await;
}

#[tokio::test]
async fn health_reports_live_clients() {
    let relay = TestRelay::start(Config::default()).await;
    let mut a = relay.connect().await;
    register(&mut a, "abc").await;

    let mut stream = TcpStream::connect(relay.addr).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"));
    let body = &response[response.find("\r\n\r\n").unwrap() + 4..];
    let health: Value = serde_json::from_str(body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["clients"], 1);
    assert_eq!(health["groups"], 1);
}
