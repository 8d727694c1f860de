//! The store boundary consumed by the chat core.
//!
//! Defines the [`MessageStore`] trait that all store adapters must satisfy.
//! Concrete implementations include:
//! - [`crate::memory::MemoryStore`] — in-process TTL store for tests, the
//!   client's offline mode, and the server
//! - the client's WebSocket-backed remote adapter
//!
//! The boundary deliberately does not assume a specific notification
//! transport: any store offering ordered, releasable change notifications
//! satisfies the contract.

use crate::event::ChangeEvent;
use crate::message::{Message, MessageDraft, User, Username, ValidationError};

/// Errors that can occur at the store boundary.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying store cannot be reached for a read or write.
    ///
    /// Callers recover locally: report, then continue. No retry is performed
    /// inside the adapter.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The draft is malformed and was rejected without being sent.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The change subscription could not be established, or terminated
    /// mid-stream. Terminal for the subscription; the adapter does not
    /// auto-recover.
    #[error("change stream unavailable: {0}")]
    StreamUnavailable(String),

    /// The handle is already registered. Callers treat this as a successful
    /// rejoin, not a failure.
    #[error("user '{0}' already exists")]
    DuplicateUser(Username),
}

/// A live, order-preserving sequence of [`ChangeEvent`]s.
///
/// The subscription is a scoped resource: it must be released via
/// [`close`](Self::close) (or by dropping the stream) on every exit path,
/// after which no further events are delivered.
pub trait ChangeStream: Send {
    /// Waits for the next change event.
    ///
    /// Returns `Ok(Some(event))` for each change in occurrence order,
    /// `Ok(None)` when the stream has ended cleanly (store shut down).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StreamUnavailable`] when the stream terminated
    /// abnormally. This is terminal: subsequent calls will not yield events.
    fn next_event(
        &mut self,
    ) -> impl std::future::Future<Output = Result<Option<ChangeEvent>, StoreError>> + Send;

    /// Releases the subscription. No events are delivered afterward.
    fn close(self) -> impl std::future::Future<Output = ()> + Send;
}

/// Async boundary to a durable, queryable, TTL-capable message store.
pub trait MessageStore: Send + Sync {
    /// The change-stream type produced by [`subscribe_changes`](Self::subscribe_changes).
    type Changes: ChangeStream + 'static;

    /// Ensures the username uniqueness constraint and the TTL policy exist.
    ///
    /// Idempotent: safe to call repeatedly and under concurrent sessions.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the store cannot be reached.
    fn ensure_schema(&self) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Registers a participant.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateUser`] if the handle is taken (callers
    /// treat this as a rejoin), or [`StoreError::Unavailable`] if the store
    /// cannot be reached.
    fn create_user(
        &self,
        username: &Username,
    ) -> impl std::future::Future<Output = Result<User, StoreError>> + Send;

    /// Persists a draft, assigning its id and timestamp.
    ///
    /// Emits a [`ChangeEvent::Inserted`] to all subscribers. No internal
    /// retry; callers decide.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for a malformed draft or
    /// [`StoreError::Unavailable`] if the store cannot be reached.
    fn insert(
        &self,
        draft: MessageDraft,
    ) -> impl std::future::Future<Output = Result<Message, StoreError>> + Send;

    /// Returns all unexpired messages visible to `viewer`, ascending by
    /// timestamp.
    ///
    /// Snapshot read: concurrent inserts during the scan may or may not be
    /// included; monotonic timestamp order among returned rows is the only
    /// consistency guarantee.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the store cannot be reached.
    fn query_visible(
        &self,
        viewer: &Username,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, StoreError>> + Send;

    /// Opens a live subscription to changes across the whole message
    /// collection (not pre-filtered by visibility).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StreamUnavailable`] if the subscription cannot
    /// be established.
    fn subscribe_changes(
        &self,
    ) -> impl std::future::Future<Output = Result<Self::Changes, StoreError>> + Send;
}
