//! Change notifications emitted by the message collection.

use serde::{Deserialize, Serialize};

use crate::message::{Message, MessageId};

/// A single change applied to the message collection, delivered to
/// subscribers in occurrence order.
///
/// Events are ephemeral: they are owned transiently by the consumer for the
/// duration of processing and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeEvent {
    /// A message was persisted. Carries a full snapshot of the document,
    /// unfiltered by visibility; filtering is the subscriber's job.
    Inserted(Message),
    /// A message was removed, either by TTL expiry or explicitly. Carries
    /// only the identity of the removed document.
    Deleted(MessageId),
}
