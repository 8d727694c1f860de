//! `Driftchat` — ephemeral single-room terminal chat client library.

pub mod config;
pub mod remote;
pub mod render;
pub mod session;
