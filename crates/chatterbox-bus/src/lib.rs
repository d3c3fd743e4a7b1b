//! # chatterbox-bus
//!
//! The shared broadcast bus that lets every server process see the same
//! room traffic.
//!
//! - [`Bus`]: one live connection (publish, subscribe, bounded-wait poll, close)
//! - [`BusConnector`]: establishes a [`Bus`] connection
//! - [`memory`]: in-process broker, used by tests and single-node deployments
//! - [`redis`]: Redis pub/sub backend

#![deny(unsafe_code)]

pub mod bus;
pub mod errors;
pub mod memory;
pub mod redis;

pub use bus::{Bus, BusConnector, BusMessage};
pub use errors::BusError;
pub use memory::{MemoryBroker, MemoryBus, MemoryConnector};
pub use self::redis::{RedisBus, RedisConnector};
