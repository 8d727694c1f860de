//! Serialization for the store wire protocol.
//!
//! postcard encode/decode for [`ClientRequest`] and [`ServerReply`].
//! WebSocket binary frames preserve message boundaries, so no length
//! framing is needed.

use crate::wire::{ClientRequest, ServerReply};

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Encodes a [`ClientRequest`] into a byte vector using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the request cannot be serialized.
pub fn encode_request(request: &ClientRequest) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(request).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`ClientRequest`] from a byte slice using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the bytes cannot be deserialized.
pub fn decode_request(bytes: &[u8]) -> Result<ClientRequest, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Encodes a [`ServerReply`] into a byte vector using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the reply cannot be serialized.
pub fn encode_reply(reply: &ServerReply) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(reply).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`ServerReply`] from a byte slice using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the bytes cannot be deserialized.
pub fn decode_reply(bytes: &[u8]) -> Result<ServerReply, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}
