//! Bus error types.

use thiserror::Error;

/// Errors raised by a bus connection.
#[derive(Debug, Error)]
pub enum BusError {
    /// Could not establish a connection.
    #[error("failed to connect to bus: {0}")]
    Connect(String),
    /// A publish was rejected or the connection failed mid-publish.
    #[error("failed to publish to {channel}: {message}")]
    Publish {
        /// Target channel.
        channel: String,
        /// Underlying error text.
        message: String,
    },
    /// A subscribe was rejected.
    #[error("failed to subscribe to {channel}: {message}")]
    Subscribe {
        /// Target channel.
        channel: String,
        /// Underlying error text.
        message: String,
    },
    /// Receiving the next message failed but the connection may recover.
    #[error("failed to receive from bus: {0}")]
    Receive(String),
    /// The connection is gone and must be re-established.
    #[error("bus connection closed")]
    Closed,
}

impl BusError {
    /// Whether the connection must be replaced before it can be used again.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Closed)
    }
}
