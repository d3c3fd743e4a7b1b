//! WebSocket session lifecycle: handles a single room connection from
//! upgrade through disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use chatterbox_core::{Envelope, RoomId, ServerFrame, UserId};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::SessionContext;
use super::state::{ConnectionState, Lifecycle};
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::room::ClientConnection;

/// Run a room session for a connected client.
///
/// 1. Registers the socket and sends `connected_users` (who was already here)
/// 2. Subscribes the room channel and announces `user_joined`
/// 3. Publishes every inbound text frame as a chat message
/// 4. Pings periodically and drops unresponsive clients
/// 5. On any exit path: deregisters and announces `user_left` once
#[instrument(skip_all, fields(room_id = %room_id, user_id = %user_id))]
pub async fn run_room_session(ws: WebSocket, room_id: RoomId, user_id: UserId, ctx: SessionContext) {
    let lifecycle = Lifecycle::new();
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, send_rx) = mpsc::channel::<Arc<str>>(ctx.send_queue_capacity);
    let connection = Arc::new(ClientConnection::new(room_id.clone(), user_id, send_tx));
    let conn_id = connection.id.clone();
    let connection_start = Instant::now();

    // ── Connecting → Joined ─────────────────────────────────────────

    let present = ctx.registry.register(connection.clone());
    info!(conn_id = %conn_id, present = present.len(), "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    // Written directly so it precedes anything already queued by fan-out.
    match (ServerFrame::ConnectedUsers { user_ids: present }).to_json() {
        Ok(json) => {
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                debug!(conn_id = %conn_id, "socket closed before connected_users");
                connection.close();
            }
        }
        Err(e) => warn!(conn_id = %conn_id, error = %e, "failed to encode connected_users"),
    }

    if let Err(e) = ctx.bridge.ensure_subscribed(&room_id).await {
        warn!(conn_id = %conn_id, error = %e, "failed to subscribe room channel");
    }
    let _ = ctx
        .bridge
        .publish(&Envelope::user_joined(room_id.clone(), user_id))
        .await;
    advance(&lifecycle, ConnectionState::Joined);

    let writer = spawn_writer(
        ws_tx,
        send_rx,
        connection.clone(),
        ctx.heartbeat_interval,
        ctx.heartbeat_timeout,
    );

    // ── Joined → Receiving ──────────────────────────────────────────

    advance(&lifecycle, ConnectionState::Receiving);
    loop {
        let frame = tokio::select! {
            () = connection.closed() => {
                debug!(conn_id = %conn_id, "connection closed by server");
                break;
            }
            frame = ws_rx.next() => frame,
        };

        let msg = match frame {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                info!(conn_id = %conn_id, error = %e, "websocket read error");
                break;
            }
            None => break,
        };
        connection.mark_alive();

        // Binary frames carrying UTF-8 are treated as text
        let text = match msg {
            Message::Text(t) => t.as_str().to_owned(),
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(s) => s.to_owned(),
                Err(_) => {
                    info!(conn_id = %conn_id, len = data.len(), "ignoring non-UTF8 binary frame");
                    continue;
                }
            },
            Message::Close(_) => {
                info!(conn_id = %conn_id, "client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        let _ = ctx
            .bridge
            .publish(&Envelope::message(room_id.clone(), text.as_str()))
            .await;

        if let Some(store) = &ctx.store {
            if let Err(e) = store.store_message(&room_id, user_id, &text).await {
                warn!(conn_id = %conn_id, error = %e, "failed to store message");
            }
        }
    }

    // ── Receiving → Closed ──────────────────────────────────────────

    if lifecycle.close() {
        let _ = ctx.registry.deregister(&room_id, &conn_id);
        connection.close();
        let _ = ctx
            .bridge
            .publish(&Envelope::user_left(room_id.clone(), user_id))
            .await;

        info!(conn_id = %conn_id, dropped = connection.drop_count(), "client disconnected");
        counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection_start.elapsed().as_secs_f64());
    }
    writer.abort();
}

fn advance(lifecycle: &Lifecycle, next: ConnectionState) {
    if let Err(e) = lifecycle.advance(next) {
        debug!(error = %e, "state transition skipped");
    }
}

/// Drain the outbound queue into the socket and send periodic Pings.
///
/// Exits when the queue closes, the socket fails, the connection is closed,
/// or the client stays silent past `timeout`. Closing the connection on exit
/// wakes the read loop.
fn spawn_writer(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<Arc<str>>,
    connection: Arc<ClientConnection>,
    interval: Duration,
    timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(interval.max(Duration::from_millis(1)));
        // Skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                () = connection.closed() => break,
                msg = send_rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(Message::Text(String::from(&*text).into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if !connection.check_alive() && connection.last_pong_elapsed() > timeout {
                        warn!(conn_id = %connection.id, "client unresponsive for {:?}, disconnecting", timeout);
                        break;
                    }
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }

        connection.close();
        let _ = ws_tx.close().await;
    })
}
