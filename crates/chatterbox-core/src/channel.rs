//! Mapping between room IDs and bus channel names (`<prefix>:<room_id>`).

use crate::ids::RoomId;

/// Default channel prefix.
pub const DEFAULT_CHANNEL_PREFIX: &str = "chat";

/// Builds and parses bus channel names for rooms.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelNamer {
    prefix: String,
}

impl ChannelNamer {
    /// Create a namer with a custom prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// The configured prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Channel name for a room.
    pub fn channel_for(&self, room_id: &RoomId) -> String {
        format!("{}:{}", self.prefix, room_id)
    }

    /// Recover the room ID from a channel name.
    ///
    /// Splits on the first `:` only, so room IDs may contain colons.
    /// Returns `None` for channels with a different prefix or an empty room.
    pub fn room_for(&self, channel: &str) -> Option<RoomId> {
        let (prefix, room) = channel.split_once(':')?;
        (prefix == self.prefix && !room.is_empty()).then(|| RoomId::from(room))
    }
}

impl Default for ChannelNamer {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_PREFIX)
    }
}
