//! End-to-end tests using real WebSocket clients.
//!
//! Each "node" is a full server with its own bridge and registry. Nodes that
//! share one `MemoryBroker` behave like separate processes on one bus.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chatterbox_bus::{MemoryBroker, MemoryConnector};
use chatterbox_core::{RoomId, UserId};
use chatterbox_server::bridge::BroadcastBridge;
use chatterbox_server::config::{BridgeConfig, ServerConfig};
use async_trait::async_trait;
use chatterbox_server::directory::{
    DirectoryError, MemoryMessageStore, MessageStore, StaticDirectory,
};
use chatterbox_server::room::RoomRegistry;
use chatterbox_server::server::ChatServer;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(300);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct Node {
    addr: SocketAddr,
    server: ChatServer,
}

impl Node {
    fn url(&self, room: &str, user: i64) -> String {
        format!("ws://{}/ws/{room}/{user}", self.addr)
    }

    fn bridge(&self) -> &Arc<BroadcastBridge> {
        self.server.bridge()
    }

    fn registry(&self) -> &Arc<RoomRegistry> {
        self.server.registry()
    }

    async fn stop(self) {
        let _ = self.server.shutdown().shutdown(TIMEOUT).await;
    }
}

fn bridge_config() -> BridgeConfig {
    BridgeConfig {
        poll_timeout: Duration::from_millis(50),
        error_backoff: Duration::from_millis(20),
        restart_backoff: Duration::from_millis(20),
        ..BridgeConfig::default()
    }
}

fn build_server(broker: &MemoryBroker) -> ChatServer {
    let bridge = Arc::new(BroadcastBridge::new(
        Arc::new(MemoryConnector::new(broker.clone())),
        Arc::new(RoomRegistry::new()),
        bridge_config(),
    ));
    ChatServer::new(ServerConfig::default(), bridge)
}

/// Boot a node on an ephemeral port.
async fn boot(server: ChatServer) -> Node {
    let addr = server.listen().await.unwrap();
    Node { addr, server }
}

async fn boot_node(broker: &MemoryBroker) -> Node {
    boot(build_server(broker)).await
}

/// Next text frame, skipping control frames.
async fn next_text(ws: &mut WsStream) -> String {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("read error");
        match msg {
            Message::Text(t) => return t.as_str().to_owned(),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn next_json(ws: &mut WsStream) -> Value {
    serde_json::from_str(&next_text(ws).await).expect("frame is not JSON")
}

/// Assert no text frame arrives for a while.
async fn expect_quiet(ws: &mut WsStream) {
    loop {
        match timeout(QUIET, ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Text(t)))) => panic!("unexpected frame: {t}"),
            Ok(Some(Ok(_))) => {}
            Ok(_) => return,
        }
    }
}

/// Connect and consume the join handshake: `connected_users` then the
/// client's own `user_joined` echo. Returns the sorted snapshot.
async fn join(node: &Node, room: &str, user: i64) -> (WsStream, Vec<i64>) {
    let (mut ws, _) = connect_async(node.url(room, user)).await.unwrap();

    let first = next_json(&mut ws).await;
    assert_eq!(first["type"], "connected_users");
    let mut snapshot: Vec<i64> = first["user_ids"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_i64().unwrap())
        .collect();
    snapshot.sort_unstable();

    let echo = next_json(&mut ws).await;
    assert_eq!(echo, json!({"type": "user_joined", "user_ids": [user]}));
    (ws, snapshot)
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    timeout(TIMEOUT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached");
}

// ── Join / presence ──────────────────────────────────────────────────

#[tokio::test]
async fn first_frame_lists_existing_users() {
    let node = boot_node(&MemoryBroker::new()).await;

    let (mut ws7, snap7) = join(&node, "r1", 7).await;
    assert!(snap7.is_empty());

    let (mut ws9, snap9) = join(&node, "r1", 9).await;
    assert_eq!(snap9, vec![7]);
    assert_eq!(next_json(&mut ws7).await, json!({"type": "user_joined", "user_ids": [9]}));

    let (mut ws42, snap42) = join(&node, "r1", 42).await;
    assert_eq!(snap42, vec![7, 9]);

    let joined = json!({"type": "user_joined", "user_ids": [42]});
    assert_eq!(next_json(&mut ws7).await, joined);
    assert_eq!(next_json(&mut ws9).await, joined);
    expect_quiet(&mut ws42).await;

    node.stop().await;
}

#[tokio::test]
async fn rooms_are_isolated() {
    let node = boot_node(&MemoryBroker::new()).await;
    let (mut ws_a, _) = join(&node, "r1", 1).await;
    let (mut ws_b, snapshot) = join(&node, "r2", 2).await;
    assert!(snapshot.is_empty());

    ws_a.send(Message::text("only r1".to_string())).await.unwrap();
    assert_eq!(next_text(&mut ws_a).await, "only r1");
    expect_quiet(&mut ws_b).await;

    node.stop().await;
}

// ── Messages ─────────────────────────────────────────────────────────

#[tokio::test]
async fn message_fans_out_verbatim_including_sender() {
    let node = boot_node(&MemoryBroker::new()).await;
    let (mut ws7, _) = join(&node, "r1", 7).await;
    let (mut ws9, _) = join(&node, "r1", 9).await;
    let _ = next_json(&mut ws7).await; // user_joined [9]

    let raw = r#"{"text":"hello","client_ts":1}"#;
    ws7.send(Message::text(raw.to_string())).await.unwrap();

    assert_eq!(next_text(&mut ws7).await, raw);
    assert_eq!(next_text(&mut ws9).await, raw);
    expect_quiet(&mut ws9).await;

    node.stop().await;
}

#[tokio::test]
async fn utf8_binary_frames_are_text() {
    let node = boot_node(&MemoryBroker::new()).await;
    let (mut ws, _) = join(&node, "r1", 7).await;

    ws.send(Message::binary(b"from binary".to_vec())).await.unwrap();
    assert_eq!(next_text(&mut ws).await, "from binary");

    ws.send(Message::binary(vec![0xff, 0xfe])).await.unwrap();
    expect_quiet(&mut ws).await;

    node.stop().await;
}

#[tokio::test]
async fn per_sender_order_preserved() {
    let node = boot_node(&MemoryBroker::new()).await;
    let (mut ws7, _) = join(&node, "r1", 7).await;
    let (mut ws9, _) = join(&node, "r1", 9).await;
    let _ = next_json(&mut ws7).await;

    for i in 0..20 {
        ws7.send(Message::text(format!("m{i}"))).await.unwrap();
    }
    for i in 0..20 {
        assert_eq!(next_text(&mut ws9).await, format!("m{i}"));
    }

    node.stop().await;
}

#[tokio::test]
async fn messages_are_stored_by_sender_node() {
    let store = Arc::new(MemoryMessageStore::new());
    let server = build_server(&MemoryBroker::new()).with_message_store(store.clone());
    let node = boot(server).await;
    let (mut ws, _) = join(&node, "r1", 7).await;

    ws.send(Message::text("keep me".to_string())).await.unwrap();
    assert_eq!(next_text(&mut ws).await, "keep me");
    wait_until(|| store.messages().len() == 1).await;

    let history = store.room_history(&RoomId::from("r1"));
    assert_eq!(history[0].user_id, UserId(7));
    assert_eq!(history[0].text, "keep me");

    node.stop().await;
}

/// Store whose backend rejects every write.
#[derive(Default)]
struct RejectingStore {
    attempts: AtomicUsize,
}

#[async_trait]
impl MessageStore for RejectingStore {
    async fn store_message(&self, _: &RoomId, _: UserId, _: &str) -> Result<(), DirectoryError> {
        let _ = self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(DirectoryError::Backend("disk full".into()))
    }
}

#[tokio::test]
async fn store_failure_does_not_block_delivery() {
    let store = Arc::new(RejectingStore::default());
    let server = build_server(&MemoryBroker::new()).with_message_store(store.clone());
    let node = boot(server).await;
    let (mut ws, _) = join(&node, "r1", 7).await;

    ws.send(Message::text("first".to_string())).await.unwrap();
    assert_eq!(next_text(&mut ws).await, "first");
    ws.send(Message::text("second".to_string())).await.unwrap();
    assert_eq!(next_text(&mut ws).await, "second");
    wait_until(|| store.attempts.load(Ordering::SeqCst) == 2).await;

    node.stop().await;
}

// ── Cross-process ────────────────────────────────────────────────────

#[tokio::test]
async fn two_nodes_share_room_traffic() {
    let broker = MemoryBroker::new();
    let a = boot_node(&broker).await;
    let b = boot_node(&broker).await;

    let (mut ws1, _) = join(&a, "r1", 1).await;
    // Registries are per node: user 1 is not in node B's snapshot.
    let (mut ws2, snapshot) = join(&b, "r1", 2).await;
    assert!(snapshot.is_empty());
    assert_eq!(next_json(&mut ws1).await, json!({"type": "user_joined", "user_ids": [2]}));

    ws1.send(Message::text("across".to_string())).await.unwrap();
    assert_eq!(next_text(&mut ws1).await, "across");
    assert_eq!(next_text(&mut ws2).await, "across");

    ws2.close(None).await.unwrap();
    assert_eq!(next_json(&mut ws1).await, json!({"type": "user_left", "user_ids": [2]}));

    a.stop().await;
    b.stop().await;
}

// ── Disconnect ───────────────────────────────────────────────────────

#[tokio::test]
async fn close_frame_yields_one_user_left() {
    let node = boot_node(&MemoryBroker::new()).await;
    let (mut ws7, _) = join(&node, "r1", 7).await;
    let (mut ws9, _) = join(&node, "r1", 9).await;
    let _ = next_json(&mut ws7).await;

    ws9.close(None).await.unwrap();
    assert_eq!(next_json(&mut ws7).await, json!({"type": "user_left", "user_ids": [9]}));
    expect_quiet(&mut ws7).await;

    let registry = node.registry().clone();
    wait_until(|| registry.connection_count() == 1).await;
    assert_eq!(registry.members(&RoomId::from("r1")), vec![UserId(7)]);

    node.stop().await;
}

#[tokio::test]
async fn dropped_socket_yields_one_user_left() {
    let node = boot_node(&MemoryBroker::new()).await;
    let (mut ws7, _) = join(&node, "r1", 7).await;
    let (ws9, _) = join(&node, "r1", 9).await;
    let _ = next_json(&mut ws7).await;

    drop(ws9);
    assert_eq!(next_json(&mut ws7).await, json!({"type": "user_left", "user_ids": [9]}));
    expect_quiet(&mut ws7).await;

    node.stop().await;
}

#[tokio::test]
async fn emptied_room_keeps_subscription() {
    let node = boot_node(&MemoryBroker::new()).await;
    let (mut ws7, _) = join(&node, "r1", 7).await;
    let (mut ws9, _) = join(&node, "r1", 9).await;
    let _ = next_json(&mut ws7).await;

    ws7.close(None).await.unwrap();
    ws9.close(None).await.unwrap();

    let registry = node.registry().clone();
    wait_until(|| registry.room_count() == 0).await;
    assert_eq!(node.bridge().subscription_count(), 1);
    assert!(node.bridge().subscriptions().contains(&RoomId::from("r1")));

    node.stop().await;
}

#[tokio::test]
async fn same_user_may_hold_two_sockets() {
    let node = boot_node(&MemoryBroker::new()).await;
    let (mut first, _) = join(&node, "r1", 7).await;
    let (mut second, snapshot) = join(&node, "r1", 7).await;
    assert_eq!(snapshot, vec![7]);
    let _ = next_json(&mut first).await;

    second.close(None).await.unwrap();
    assert_eq!(next_json(&mut first).await, json!({"type": "user_left", "user_ids": [7]}));

    first.send(Message::text("still here".to_string())).await.unwrap();
    assert_eq!(next_text(&mut first).await, "still here");

    node.stop().await;
}

// ── Membership ───────────────────────────────────────────────────────

#[tokio::test]
async fn directory_gates_connections() {
    let directory = Arc::new(StaticDirectory::new());
    directory.set_members(RoomId::from("r1"), [UserId(7)]);
    let server = build_server(&MemoryBroker::new()).with_directory(directory);
    let node = boot(server).await;

    let (_ws, snapshot) = join(&node, "r1", 7).await;
    assert!(snapshot.is_empty());

    let refused = connect_async(node.url("r1", 42)).await;
    assert!(refused.is_err());
    assert_eq!(node.registry().connection_count(), 1);

    node.stop().await;
}

// ── Health ───────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_live_counts() {
    let node = boot_node(&MemoryBroker::new()).await;
    let (_ws7, _) = join(&node, "r1", 7).await;
    let (_ws9, _) = join(&node, "r2", 9).await;

    let registry = node.registry().clone();
    wait_until(|| registry.connection_count() == 2).await;
    assert_eq!(registry.room_count(), 2);
    assert_eq!(node.bridge().subscription_count(), 2);

    node.stop().await;
}
