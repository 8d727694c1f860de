//! `Driftchat` store service library.
//!
//! Exposes the store server for use in tests and embedding. The server
//! hosts one in-memory TTL message store and serves it to chat clients
//! over WebSocket: inserts, visibility queries, user registration, and a
//! live change-event stream per subscribed connection.

pub mod config;
pub mod server;
