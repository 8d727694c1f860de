//! Store boundary and shared data model for `Driftchat`.
//!
//! Defines the message/user types, the visibility rule, the
//! [`store::MessageStore`] boundary trait with its change-stream
//! subscription, an in-memory TTL-backed implementation, and the wire
//! protocol spoken between clients and the store server.

pub mod codec;
pub mod event;
pub mod memory;
pub mod message;
pub mod store;
pub mod wire;
