//! Room → local connections map.
//!
//! Every mutation and iteration happens under one process-wide lock. The lock
//! is never held across an `.await`; sends are non-blocking enqueues.

use std::collections::HashMap;
use std::sync::Arc;

use chatterbox_core::{ConnectionId, RoomId, UserId};
use metrics::counter;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::connection::ClientConnection;
use crate::metrics::FANOUT_SEND_FAILURES_TOTAL;

/// Tracks which sockets on this process are attached to which room.
///
/// A room entry exists only while it has at least one connection. Entries are
/// matched by [`ConnectionId`], so one user may hold several sockets.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<RoomId, Vec<Arc<ClientConnection>>>>,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `conn` to its room.
    ///
    /// Returns the users that were already present, taken before the insert
    /// and deduplicated in arrival order.
    pub fn register(&self, conn: Arc<ClientConnection>) -> Vec<UserId> {
        let mut rooms = self.rooms.lock();
        let members = rooms.entry(conn.room_id.clone()).or_default();

        let mut existing: Vec<UserId> = Vec::with_capacity(members.len());
        for member in members.iter() {
            if !existing.contains(&member.user_id) {
                existing.push(member.user_id);
            }
        }

        debug!(
            room_id = %conn.room_id,
            user_id = %conn.user_id,
            conn_id = %conn.id,
            present = existing.len(),
            "connection registered"
        );
        members.push(conn);
        existing
    }

    /// Detach the connection `conn_id` from `room_id`.
    ///
    /// Returns `false` (and does nothing) when the connection is not
    /// registered, e.g. on a second call for the same connection.
    pub fn deregister(&self, room_id: &RoomId, conn_id: &ConnectionId) -> bool {
        let mut rooms = self.rooms.lock();
        let Some(members) = rooms.get_mut(room_id) else {
            debug!(room_id = %room_id, conn_id = %conn_id, "deregister: room not present");
            return false;
        };
        let Some(pos) = members.iter().position(|c| &c.id == conn_id) else {
            debug!(room_id = %room_id, conn_id = %conn_id, "deregister: connection not present");
            return false;
        };
        let _ = members.remove(pos);
        if members.is_empty() {
            let _ = rooms.remove(room_id);
            debug!(room_id = %room_id, "room emptied");
        }
        debug!(room_id = %room_id, conn_id = %conn_id, "connection deregistered");
        true
    }

    /// Deliver `payload` to every local connection in `room_id`.
    ///
    /// Sends are attempted for every connection first. Connections whose send
    /// failed are then deregistered and told to close. Returns the number of
    /// successful deliveries.
    pub fn fan_out_local(&self, room_id: &RoomId, payload: &str) -> usize {
        let payload: Arc<str> = Arc::from(payload);
        let mut delivered = 0;
        let mut failed: Vec<Arc<ClientConnection>> = Vec::new();

        {
            let rooms = self.rooms.lock();
            let Some(members) = rooms.get(room_id) else {
                return 0;
            };
            for conn in members {
                if conn.send(payload.clone()) {
                    delivered += 1;
                } else {
                    failed.push(conn.clone());
                }
            }
        }

        for conn in failed {
            warn!(
                room_id = %room_id,
                user_id = %conn.user_id,
                conn_id = %conn.id,
                dropped = conn.drop_count(),
                "send failed, dropping connection"
            );
            counter!(FANOUT_SEND_FAILURES_TOTAL).increment(1);
            let _ = self.deregister(room_id, &conn.id);
            conn.close();
        }

        delivered
    }

    /// Users currently attached to `room_id`, in arrival order.
    pub fn members(&self, room_id: &RoomId) -> Vec<UserId> {
        self.rooms
            .lock()
            .get(room_id)
            .map(|members| members.iter().map(|c| c.user_id).collect())
            .unwrap_or_default()
    }

    /// Whether `room_id` has at least one local connection.
    pub fn contains_room(&self, room_id: &RoomId) -> bool {
        self.rooms.lock().contains_key(room_id)
    }

    /// Number of rooms with at least one local connection.
    pub fn room_count(&self) -> usize {
        self.rooms.lock().len()
    }

    /// Total local connections across all rooms.
    pub fn connection_count(&self) -> usize {
        self.rooms.lock().values().map(Vec::len).sum()
    }
}
