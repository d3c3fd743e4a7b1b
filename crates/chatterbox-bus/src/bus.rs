//! Bus traits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::BusError;

/// A message received from a subscribed channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusMessage {
    /// Channel the message was published on.
    pub channel: String,
    /// Raw payload text.
    pub payload: String,
}

impl BusMessage {
    /// Create a message.
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

/// One live connection to the shared publish/subscribe bus.
///
/// A publisher that is itself subscribed to a channel receives its own
/// messages back through [`Bus::next_message`].
#[async_trait]
pub trait Bus: Send + Sync {
    /// Publish `payload` on `channel`.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError>;

    /// Subscribe to `channel`. Subscribing twice is harmless.
    async fn subscribe(&self, channel: &str) -> Result<(), BusError>;

    /// Wait at most `wait` for the next message on any subscribed channel.
    ///
    /// Returns `Ok(None)` when the wait elapses with nothing received.
    async fn next_message(&self, wait: Duration) -> Result<Option<BusMessage>, BusError>;

    /// Unsubscribe from everything and release the connection.
    async fn close(&self) -> Result<(), BusError>;
}

/// Establishes bus connections.
#[async_trait]
pub trait BusConnector: Send + Sync {
    /// Open a new connection.
    async fn connect(&self) -> Result<Arc<dyn Bus>, BusError>;
}
