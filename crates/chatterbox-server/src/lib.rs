//! # chatterbox-server
//!
//! Real-time room fan-out for Chatterbox.
//!
//! - [`room::RoomRegistry`]: which local sockets are attached to which room
//! - [`bridge::BroadcastBridge`]: publishes envelopes to the shared bus and runs
//!   the supervised listener that fans bus traffic back out to local sockets
//! - [`websocket`]: the per-connection lifecycle (`Connecting → Joined →
//!   Receiving → Closed`)
//! - [`server::ChatServer`]: axum router, health, metrics and CORS

#![deny(unsafe_code)]

pub mod bridge;
pub mod config;
pub mod directory;
pub mod health;
pub mod metrics;
pub mod room;
pub mod server;
pub mod shutdown;
pub mod websocket;
