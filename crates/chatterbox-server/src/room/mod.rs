//! Local room membership: which sockets on this process belong to which room.

pub mod connection;
pub mod registry;

pub use connection::ClientConnection;
pub use registry::RoomRegistry;
