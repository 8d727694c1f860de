//! Core data model for `Driftchat`: users, messages, and the visibility rule.
//!
//! Messages are addressed either to the single public room or directly to one
//! user. The visibility predicate [`Message::is_visible_to`] is the single
//! source of truth applied by both the history backfill and the live feed —
//! the two paths must never diverge.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum allowed message body size in bytes (64 KB).
pub const MAX_BODY_SIZE: usize = 64 * 1024;

/// Maximum allowed username length in bytes.
pub const MAX_USERNAME_LEN: usize = 64;

/// Canonical name of the single public room, as it appears on the wire and
/// in user-facing addressing.
pub const PUBLIC_ROOM: &str = "all";

/// Error returned when a draft or username fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Message body is empty or whitespace-only.
    #[error("message body is empty")]
    EmptyBody,

    /// Message body exceeds the maximum allowed size.
    #[error("message body too large ({size} bytes, max {max} bytes)")]
    BodyTooLarge {
        /// Actual size of the body in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },

    /// Username is empty, too long, or contains whitespace.
    #[error("invalid username: {0}")]
    BadUsername(String),
}

/// A participant's unique handle.
///
/// Non-empty, at most [`MAX_USERNAME_LEN`] bytes, no interior whitespace.
/// Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Username(String);

impl Username {
    /// Parses and validates a username.
    ///
    /// Leading and trailing whitespace is trimmed before validation.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::BadUsername`] if the trimmed name is empty,
    /// longer than [`MAX_USERNAME_LEN`] bytes, contains whitespace, or is the
    /// reserved public-room name.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(ValidationError::BadUsername("name is empty".into()));
        }
        if name.len() > MAX_USERNAME_LEN {
            return Err(ValidationError::BadUsername(format!(
                "name exceeds {MAX_USERNAME_LEN} bytes"
            )));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(ValidationError::BadUsername(
                "name contains whitespace".into(),
            ));
        }
        if name == PUBLIC_ROOM {
            return Err(ValidationError::BadUsername(format!(
                "'{PUBLIC_ROOM}' is reserved for the public room"
            )));
        }
        Ok(Self(name.to_string()))
    }

    /// Returns the handle as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Username {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Millisecond-precision UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Unique identifier for a message, based on UUID v7 for time-ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new time-ordered message identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `MessageId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// The participant's unique handle.
    pub username: Username,
    /// When the participant first joined.
    pub created_at: Timestamp,
}

/// Where a message is addressed.
///
/// Every message has exactly one recipient: the public room or one user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Recipient {
    /// The single shared broadcast destination, visible to every participant.
    Room,
    /// Direct addressing: visible only to the named user (and the sender's
    /// own rendering of what they typed).
    User(Username),
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Room => write!(f, "{PUBLIC_ROOM}"),
            Self::User(name) => write!(f, "{name}"),
        }
    }
}

/// A message as composed by a sender, before the store assigns identity.
///
/// The store assigns [`MessageId`] and [`Timestamp`] at insert time; drafts
/// carry only the caller-controlled fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDraft {
    /// The author's handle.
    pub sender: Username,
    /// Where the message is addressed.
    pub recipient: Recipient,
    /// The text content.
    pub body: String,
}

impl MessageDraft {
    /// Creates a draft addressed to the public room.
    #[must_use]
    pub fn to_room(sender: Username, body: impl Into<String>) -> Self {
        Self {
            sender,
            recipient: Recipient::Room,
            body: body.into(),
        }
    }

    /// Creates a draft addressed directly to one user.
    #[must_use]
    pub fn to_user(sender: Username, recipient: Username, body: impl Into<String>) -> Self {
        Self {
            sender,
            recipient: Recipient::User(recipient),
            body: body.into(),
        }
    }

    /// Validates this draft for insertion.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyBody`] if the body is empty or
    /// whitespace-only, or [`ValidationError::BodyTooLarge`] if it exceeds
    /// [`MAX_BODY_SIZE`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.body.trim().is_empty() {
            return Err(ValidationError::EmptyBody);
        }
        let size = self.body.len();
        if size > MAX_BODY_SIZE {
            return Err(ValidationError::BodyTooLarge {
                size,
                max: MAX_BODY_SIZE,
            });
        }
        Ok(())
    }
}

/// A persisted message with store-assigned identity and timestamp.
///
/// Never updated in place; removed by the store once its age exceeds the
/// retention window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned unique identifier.
    pub id: MessageId,
    /// The author's handle.
    pub sender: Username,
    /// Where the message is addressed.
    pub recipient: Recipient,
    /// The text content.
    pub body: String,
    /// Store-assigned creation time; orders the feed and drives expiry.
    pub timestamp: Timestamp,
}

impl Message {
    /// Whether `viewer` may see this message.
    ///
    /// True for public-room messages and for direct messages addressed to
    /// the viewer. Both the history backfill and the live feed apply this
    /// exact predicate.
    #[must_use]
    pub fn is_visible_to(&self, viewer: &Username) -> bool {
        match &self.recipient {
            Recipient::Room => true,
            Recipient::User(name) => name == viewer,
        }
    }

    /// Whether this message has outlived `retention` as of `now`.
    #[must_use]
    pub fn is_expired(&self, retention: std::time::Duration, now: Timestamp) -> bool {
        let retention_ms = u64::try_from(retention.as_millis()).unwrap_or(u64::MAX);
        let cutoff = now.as_millis().saturating_sub(retention_ms);
        self.timestamp.as_millis() <= cutoff
    }
}
