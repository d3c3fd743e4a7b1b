//! Server-to-client JSON frames.

use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// A structured frame pushed to a WebSocket client.
///
/// Chat messages are not frames; they reach clients as raw text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// First frame on a new connection: who was already in the room.
    ConnectedUsers {
        /// Existing participants, excluding the new client.
        user_ids: Vec<UserId>,
    },
    /// Users attached to the room.
    UserJoined {
        /// Affected users.
        user_ids: Vec<UserId>,
    },
    /// Users detached from the room.
    UserLeft {
        /// Affected users.
        user_ids: Vec<UserId>,
    },
}

impl ServerFrame {
    /// Serialize to JSON text.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
