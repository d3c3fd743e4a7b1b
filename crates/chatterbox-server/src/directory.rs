//! Collaborators owned by the persistence layer.
//!
//! The core never talks to a database itself. Membership checks and message
//! history are delegated through these traits; both are optional.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chatterbox_core::{RoomId, UserId};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;

/// Errors returned by persistence collaborators.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The backing store could not be reached.
    #[error("directory unavailable: {0}")]
    Unavailable(String),
    /// The store rejected the operation.
    #[error("directory error: {0}")]
    Backend(String),
}

/// Looks up who belongs to a room.
#[async_trait]
pub trait MembershipDirectory: Send + Sync {
    /// All users allowed in `room_id`. Unknown rooms have no members.
    async fn lookup_room_members(&self, room_id: &RoomId) -> Result<HashSet<UserId>, DirectoryError>;
}

/// Persists chat messages after they have been published.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Record `text` sent by `user_id` in `room_id`.
    async fn store_message(
        &self,
        room_id: &RoomId,
        user_id: UserId,
        text: &str,
    ) -> Result<(), DirectoryError>;
}

/// Fixed in-memory membership table.
#[derive(Default)]
pub struct StaticDirectory {
    rooms: RwLock<HashMap<RoomId, HashSet<UserId>>>,
}

impl StaticDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the members of `room_id`.
    pub fn set_members(&self, room_id: RoomId, members: impl IntoIterator<Item = UserId>) {
        let _ = self
            .rooms
            .write()
            .insert(room_id, members.into_iter().collect());
    }
}

#[async_trait]
impl MembershipDirectory for StaticDirectory {
    async fn lookup_room_members(&self, room_id: &RoomId) -> Result<HashSet<UserId>, DirectoryError> {
        Ok(self.rooms.read().get(room_id).cloned().unwrap_or_default())
    }
}

/// A message recorded by [`MemoryMessageStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredMessage {
    /// Room the message was sent to.
    pub room_id: RoomId,
    /// Sender.
    pub user_id: UserId,
    /// Raw text.
    pub text: String,
    /// When the store accepted it.
    pub stored_at: DateTime<Utc>,
}

/// Message history kept in memory.
#[derive(Default)]
pub struct MemoryMessageStore {
    messages: Mutex<Vec<StoredMessage>>,
}

impl MemoryMessageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything stored so far, oldest first.
    pub fn messages(&self) -> Vec<StoredMessage> {
        self.messages.lock().clone()
    }

    /// Messages stored for `room_id`, oldest first.
    pub fn room_history(&self, room_id: &RoomId) -> Vec<StoredMessage> {
        self.messages
            .lock()
            .iter()
            .filter(|m| &m.room_id == room_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn store_message(
        &self,
        room_id: &RoomId,
        user_id: UserId,
        text: &str,
    ) -> Result<(), DirectoryError> {
        self.messages.lock().push(StoredMessage {
            room_id: room_id.clone(),
            user_id,
            text: text.to_owned(),
            stored_at: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_directory_lookup() {
        let dir = StaticDirectory::new();
        dir.set_members(RoomId::from("r1"), [UserId(7), UserId(9)]);

        let members = dir.lookup_room_members(&RoomId::from("r1")).await.unwrap();
        assert!(members.contains(&UserId(7)));
        assert!(members.contains(&UserId(9)));
        assert!(!members.contains(&UserId(42)));
    }

    #[tokio::test]
    async fn unknown_room_has_no_members() {
        let dir = StaticDirectory::new();
        let members = dir.lookup_room_members(&RoomId::from("nope")).await.unwrap();
        assert!(members.is_empty());
    }

    #[tokio::test]
    async fn set_members_replaces() {
        let dir = StaticDirectory::new();
        dir.set_members(RoomId::from("r1"), [UserId(1)]);
        dir.set_members(RoomId::from("r1"), [UserId(2)]);
        let members = dir.lookup_room_members(&RoomId::from("r1")).await.unwrap();
        assert_eq!(members.len(), 1);
        assert!(members.contains(&UserId(2)));
    }

    #[tokio::test]
    async fn message_store_keeps_order_per_room() {
        let store = MemoryMessageStore::new();
        store.store_message(&RoomId::from("r1"), UserId(1), "a").await.unwrap();
        store.store_message(&RoomId::from("r2"), UserId(2), "b").await.unwrap();
        store.store_message(&RoomId::from("r1"), UserId(3), "c").await.unwrap();

        let history: Vec<String> = store
            .room_history(&RoomId::from("r1"))
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(history, vec!["a", "c"]);
        let all = store.messages();
        assert_eq!(all.len(), 3);
        assert!(all[0].stored_at <= all[2].stored_at);
    }

    #[test]
    fn error_display() {
        let err = DirectoryError::Unavailable("db down".into());
        assert_eq!(err.to_string(), "directory unavailable: db down");
        let err = DirectoryError::Backend("disk full".into());
        assert_eq!(err.to_string(), "directory error: disk full");
    }
}
