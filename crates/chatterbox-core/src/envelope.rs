//! Bus envelope: the unit every process publishes and consumes.
//!
//! Wire format (one JSON object per bus message):
//!
//! ```text
//! {"kind":"message","roomId":"r1","payload":"hi"}
//! {"kind":"user_joined","roomId":"r1","payload":[42]}
//! {"kind":"user_left","roomId":"r1","payload":[42]}
//! ```
//!
//! A `message` payload is opaque client text and is forwarded to sockets
//! verbatim. Presence payloads carry the affected user IDs and are rendered
//! to clients as [`ServerFrame`]s.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frames::ServerFrame;
use crate::ids::{RoomId, UserId};

/// Errors raised while encoding or decoding an [`Envelope`].
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The envelope could not be serialized.
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),
    /// The bus payload was not a well-formed envelope.
    #[error("malformed envelope: {0}")]
    Decode(#[source] serde_json::Error),
    /// A presence envelope arrived with no user IDs.
    #[error("presence envelope for room {room_id} carries no user ids")]
    EmptyPresence {
        /// Room named by the envelope.
        room_id: RoomId,
    },
}

/// Discriminant of an [`Envelope`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    /// Chat text.
    Message,
    /// A user attached to the room.
    UserJoined,
    /// A user detached from the room.
    UserLeft,
}

impl EnvelopeKind {
    /// Wire name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::UserJoined => "user_joined",
            Self::UserLeft => "user_left",
        }
    }
}

/// The structured unit exchanged over the bus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Envelope {
    /// Chat text, passed through unchanged.
    Message {
        /// Target room.
        room_id: RoomId,
        /// Raw client text.
        payload: String,
    },
    /// Presence: users joined.
    UserJoined {
        /// Target room.
        room_id: RoomId,
        /// Affected users (one in practice).
        payload: Vec<UserId>,
    },
    /// Presence: users left.
    UserLeft {
        /// Target room.
        room_id: RoomId,
        /// Affected users (one in practice).
        payload: Vec<UserId>,
    },
}

impl Envelope {
    /// Build a chat message envelope.
    pub fn message(room_id: RoomId, text: impl Into<String>) -> Self {
        Self::Message {
            room_id,
            payload: text.into(),
        }
    }

    /// Build a `user_joined` envelope for a single user.
    pub fn user_joined(room_id: RoomId, user_id: UserId) -> Self {
        Self::UserJoined {
            room_id,
            payload: vec![user_id],
        }
    }

    /// Build a `user_left` envelope for a single user.
    pub fn user_left(room_id: RoomId, user_id: UserId) -> Self {
        Self::UserLeft {
            room_id,
            payload: vec![user_id],
        }
    }

    /// The envelope kind.
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Self::Message { .. } => EnvelopeKind::Message,
            Self::UserJoined { .. } => EnvelopeKind::UserJoined,
            Self::UserLeft { .. } => EnvelopeKind::UserLeft,
        }
    }

    /// The room this envelope targets.
    pub fn room_id(&self) -> &RoomId {
        match self {
            Self::Message { room_id, .. }
            | Self::UserJoined { room_id, .. }
            | Self::UserLeft { room_id, .. } => room_id,
        }
    }

    /// Serialize to the JSON wire format.
    pub fn encode(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(self).map_err(EnvelopeError::Encode)
    }

    /// Parse a bus payload.
    ///
    /// Fails if the JSON is invalid, the kind is unknown, the payload shape
    /// does not match the kind, or a presence payload is empty.
    pub fn decode(raw: &str) -> Result<Self, EnvelopeError> {
        let envelope: Self = serde_json::from_str(raw).map_err(EnvelopeError::Decode)?;
        match &envelope {
            Self::UserJoined { room_id, payload } | Self::UserLeft { room_id, payload }
                if payload.is_empty() =>
            {
                Err(EnvelopeError::EmptyPresence {
                    room_id: room_id.clone(),
                })
            }
            _ => Ok(envelope),
        }
    }

    /// Render the text pushed to WebSocket clients.
    ///
    /// Chat messages are delivered verbatim; presence events become
    /// `{"type": "...", "user_ids": [...]}`.
    pub fn to_client_text(&self) -> Result<String, EnvelopeError> {
        let frame = match self {
            Self::Message { payload, .. } => return Ok(payload.clone()),
            Self::UserJoined { payload, .. } => ServerFrame::UserJoined {
                user_ids: payload.clone(),
            },
            Self::UserLeft { payload, .. } => ServerFrame::UserLeft {
                user_ids: payload.clone(),
            },
        };
        frame.to_json().map_err(EnvelopeError::Encode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::Value;

    #[test]
    fn message_wire_format() {
        let env = Envelope::message(RoomId::from("r1"), "hi");
        let json: Value = serde_json::from_str(&env.encode().unwrap()).unwrap();
        assert_eq!(json["kind"], "message");
        assert_eq!(json["roomId"], "r1");
        assert_eq!(json["payload"], "hi");
    }

    #[test]
    fn presence_wire_format() {
        let env = Envelope::user_joined(RoomId::from("r1"), UserId(42));
        let json: Value = serde_json::from_str(&env.encode().unwrap()).unwrap();
        assert_eq!(json["kind"], "user_joined");
        assert_eq!(json["roomId"], "r1");
        assert_eq!(json["payload"], serde_json::json!([42]));
    }

    #[test]
    fn decode_literal_message() {
        let env = Envelope::decode(r#"{"kind":"message","roomId":"r1","payload":"hi"}"#).unwrap();
        assert_eq!(env.kind(), EnvelopeKind::Message);
        assert_eq!(env.room_id().as_str(), "r1");
        assert_eq!(env, Envelope::message(RoomId::from("r1"), "hi"));
    }

    #[test]
    fn decode_reproduces_every_kind() {
        let room = RoomId::from("room:with:colons");
        for env in [
            Envelope::message(room.clone(), r#"{"already":"json"}"#),
            Envelope::user_joined(room.clone(), UserId(7)),
            Envelope::user_left(room.clone(), UserId(-3)),
        ] {
            let back = Envelope::decode(&env.encode().unwrap()).unwrap();
            assert_eq!(back, env);
        }
    }

    #[test]
    fn decode_rejects_invalid_json() {
        assert_matches!(Envelope::decode("not json"), Err(EnvelopeError::Decode(_)));
    }

    #[test]
    fn decode_rejects_unknown_kind() {
        let raw = r#"{"kind":"typing","roomId":"r1","payload":"x"}"#;
        assert_matches!(Envelope::decode(raw), Err(EnvelopeError::Decode(_)));
    }

    #[test]
    fn decode_rejects_mismatched_payload() {
        let raw = r#"{"kind":"user_joined","roomId":"r1","payload":"42"}"#;
        assert_matches!(Envelope::decode(raw), Err(EnvelopeError::Decode(_)));
        let raw = r#"{"kind":"message","roomId":"r1","payload":[1]}"#;
        assert_matches!(Envelope::decode(raw), Err(EnvelopeError::Decode(_)));
    }

    #[test]
    fn decode_rejects_missing_room() {
        let raw = r#"{"kind":"message","payload":"hi"}"#;
        assert_matches!(Envelope::decode(raw), Err(EnvelopeError::Decode(_)));
    }

    #[test]
    fn decode_rejects_empty_presence() {
        let raw = r#"{"kind":"user_left","roomId":"r1","payload":[]}"#;
        assert_matches!(
            Envelope::decode(raw),
            Err(EnvelopeError::EmptyPresence { room_id }) if room_id.as_str() == "r1"
        );
    }

    #[test]
    fn message_client_text_is_verbatim() {
        let env = Envelope::message(RoomId::from("r1"), "  raw text  ");
        assert_eq!(env.to_client_text().unwrap(), "  raw text  ");
    }

    #[test]
    fn presence_client_text_is_frame() {
        let env = Envelope::user_left(RoomId::from("r1"), UserId(9));
        let json: Value = serde_json::from_str(&env.to_client_text().unwrap()).unwrap();
        assert_eq!(json["type"], "user_left");
        assert_eq!(json["user_ids"], serde_json::json!([9]));
    }

    #[test]
    fn kind_names_match_wire() {
        for kind in [
            EnvelopeKind::Message,
            EnvelopeKind::UserJoined,
            EnvelopeKind::UserLeft,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }
}
