//! # chatterbox-core
//!
//! Shared vocabulary for the Chatterbox chat backend.
//!
//! - **IDs**: `RoomId`, `UserId`, `ConnectionId` as newtypes for type safety
//! - **Envelope**: the unit published on the shared bus (`message`, `user_joined`, `user_left`)
//! - **Server frames**: JSON pushed to WebSocket clients (`connected_users`, presence events)
//! - **Channels**: mapping between room IDs and bus channel names
//! - **Logging**: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod channel;
pub mod envelope;
pub mod frames;
pub mod ids;
pub mod logging;

pub use channel::ChannelNamer;
pub use envelope::{Envelope, EnvelopeError, EnvelopeKind};
pub use frames::ServerFrame;
pub use ids::{ConnectionId, RoomId, UserId};
