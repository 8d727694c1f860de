//! Wire protocol spoken between chat clients and the store server.
//!
//! Requests and replies are postcard-encoded and carried in WebSocket
//! binary frames. Requests on one connection are answered in order;
//! [`ServerReply::Change`] frames are unsolicited and may interleave with
//! request replies once a [`ClientRequest::Subscribe`] has been
//! acknowledged.

use serde::{Deserialize, Serialize};

use crate::event::ChangeEvent;
use crate::message::{Message, MessageDraft, User, Username};

/// Requests a client sends to the store server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientRequest {
    /// Ensure the uniqueness constraint and TTL policy exist.
    /// Answered with [`ServerReply::SchemaReady`].
    EnsureSchema,

    /// Register a participant. Answered with [`ServerReply::UserCreated`]
    /// or [`ServerReply::DuplicateUser`].
    CreateUser {
        /// The handle to register.
        username: Username,
    },

    /// Persist a draft. Answered with [`ServerReply::Inserted`].
    Insert {
        /// The draft to persist; the server assigns id and timestamp.
        draft: MessageDraft,
    },

    /// Fetch all unexpired messages visible to the viewer, ascending by
    /// timestamp. Answered with [`ServerReply::Messages`].
    QueryVisible {
        /// The viewer whose visibility applies.
        viewer: Username,
    },

    /// Start streaming change events on this connection. Answered with
    /// [`ServerReply::Subscribed`], after which [`ServerReply::Change`]
    /// frames flow until the connection closes.
    Subscribe,
}

/// Replies the store server sends to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerReply {
    /// Schema setup completed (idempotent).
    SchemaReady,

    /// The participant was registered.
    UserCreated {
        /// The newly created participant.
        user: User,
    },

    /// The handle was already registered. Clients treat this as a
    /// successful rejoin.
    DuplicateUser {
        /// The handle that was already taken.
        username: Username,
    },

    /// The draft was persisted.
    Inserted {
        /// The stored message with server-assigned id and timestamp.
        message: Message,
    },

    /// Result of a visibility query, ascending by timestamp.
    Messages {
        /// The visible, unexpired messages.
        messages: Vec<Message>,
    },

    /// The change subscription is active on this connection.
    Subscribed,

    /// An unsolicited change notification, delivered in occurrence order.
    Change {
        /// The change that was applied to the collection.
        event: ChangeEvent,
    },

    /// The server could not process a request.
    Error {
        /// Human-readable error description.
        reason: String,
    },
}
