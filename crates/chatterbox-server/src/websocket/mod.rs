//! WebSocket connection lifecycle.

pub mod session;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use crate::bridge::BroadcastBridge;
use crate::config::ServerConfig;
use crate::directory::MessageStore;
use crate::room::RoomRegistry;

pub use session::run_room_session;
pub use state::{ConnectionState, Lifecycle, TransitionError};

/// Everything a session needs from the server.
#[derive(Clone)]
pub struct SessionContext {
    /// Local room membership.
    pub registry: Arc<RoomRegistry>,
    /// Bus bridge for publishing and subscriptions.
    pub bridge: Arc<BroadcastBridge>,
    /// Optional message history sink.
    pub store: Option<Arc<dyn MessageStore>>,
    /// Outbound queue capacity.
    pub send_queue_capacity: usize,
    /// Interval between Ping frames.
    pub heartbeat_interval: Duration,
    /// Silence after which the client is dropped.
    pub heartbeat_timeout: Duration,
}

impl SessionContext {
    /// Build a context from server configuration.
    pub fn new(
        config: &ServerConfig,
        bridge: Arc<BroadcastBridge>,
        store: Option<Arc<dyn MessageStore>>,
    ) -> Self {
        Self {
            registry: bridge.registry().clone(),
            bridge,
            store,
            send_queue_capacity: config.send_queue_capacity.max(1),
            heartbeat_interval: config.heartbeat_interval(),
            heartbeat_timeout: config.heartbeat_timeout(),
        }
    }
}
