//! Server configuration.

use std::time::Duration;

use chatterbox_settings::{BusSettings, ServerSettings};
use serde::{Deserialize, Serialize};

/// Configuration for the chat server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Origins allowed by CORS.
    pub cors_origins: Vec<String>,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close a connection after this many seconds without a Pong.
    pub heartbeat_timeout_secs: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound queue capacity per connection.
    pub send_queue_capacity: usize,
}

impl ServerConfig {
    /// Interval between server Ping frames.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Silence after which a client is considered dead.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            cors_origins: Vec::new(),
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 64 * 1024,
            send_queue_capacity: 256,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            cors_origins: s.cors_origins.clone(),
            heartbeat_interval_secs: s.heartbeat_interval_secs,
            heartbeat_timeout_secs: s.heartbeat_timeout_secs,
            max_message_size: s.max_message_size,
            send_queue_capacity: s.send_queue_capacity,
        }
    }
}

/// Timing and naming for the broadcast bridge.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Channel name prefix.
    pub channel_prefix: String,
    /// Maximum wait per listener poll.
    pub poll_timeout: Duration,
    /// Pause after a failed poll.
    pub error_backoff: Duration,
    /// Pause before respawning a crashed listener.
    pub restart_backoff: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::from(&BusSettings::default())
    }
}

impl From<&BusSettings> for BridgeConfig {
    fn from(s: &BusSettings) -> Self {
        Self {
            channel_prefix: s.channel_prefix.clone(),
            poll_timeout: Duration::from_millis(s.poll_timeout_ms),
            error_backoff: Duration::from_millis(s.error_backoff_ms),
            restart_backoff: Duration::from_millis(s.restart_backoff_ms),
        }
    }
}
