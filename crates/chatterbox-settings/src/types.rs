//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`,
//! so a settings file may contain any subset of fields.

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9000 },
///   "bus": { "backend": "memory" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatterboxSettings {
    /// HTTP / WebSocket server settings.
    pub server: ServerSettings,
    /// Shared broadcast bus settings.
    pub bus: BusSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

/// HTTP / WebSocket server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` for auto-assign).
    pub port: u16,
    /// Origins allowed by CORS.
    pub cors_origins: Vec<String>,
    /// Interval between server Ping frames.
    pub heartbeat_interval_secs: u64,
    /// Close a connection after this long without a Pong.
    pub heartbeat_timeout_secs: u64,
    /// Maximum inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Capacity of each connection's outbound queue.
    pub send_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 64 * 1024,
            send_queue_capacity: 256,
        }
    }
}

/// Which bus implementation to connect to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    /// Redis pub/sub (multi-process).
    Redis,
    /// In-process broker (single process only).
    Memory,
}

impl BusBackend {
    /// Parse a backend name (case-insensitive).
    pub fn parse(val: &str) -> Option<Self> {
        match val.to_lowercase().as_str() {
            "redis" => Some(Self::Redis),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// Shared broadcast bus settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusSettings {
    /// Bus implementation.
    pub backend: BusBackend,
    /// Redis connection URL.
    pub url: String,
    /// Channel name prefix (`<prefix>:<room_id>`).
    pub channel_prefix: String,
    /// Maximum wait per listener poll, in milliseconds.
    pub poll_timeout_ms: u64,
    /// Pause after a failed poll before retrying, in milliseconds.
    pub error_backoff_ms: u64,
    /// Pause before respawning a crashed listener, in milliseconds.
    pub restart_backoff_ms: u64,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            backend: BusBackend::Redis,
            url: "redis://localhost:6379".to_string(),
            channel_prefix: "chat".to_string(),
            poll_timeout_ms: 1000,
            error_backoff_ms: 500,
            restart_backoff_ms: 1000,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of the compact human format.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
