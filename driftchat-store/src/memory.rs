//! In-process implementation of the [`MessageStore`] boundary.
//!
//! Backs the store server, the client's offline mode, and the test suite.
//! Messages live in a shared vector guarded by an async `RwLock`; change
//! notifications fan out through a `tokio::sync::broadcast` channel; a
//! background sweeper enforces the retention window and emits `Deleted`
//! events for everything it removes.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock, broadcast};

use crate::event::ChangeEvent;
use crate::message::{Message, MessageDraft, MessageId, Timestamp, User, Username};
use crate::store::{ChangeStream, MessageStore, StoreError};

/// Default cadence of the retention sweeper (the original store's TTL
/// cleaner ran roughly once a minute).
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Default capacity of the change broadcast channel.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Shared state behind every handle to one store.
struct Inner {
    retention: Duration,
    sweep_interval: Duration,
    users: RwLock<HashMap<Username, User>>,
    messages: RwLock<Vec<Message>>,
    changes: broadcast::Sender<ChangeEvent>,
    /// Sweeper task handle; `Some` once `ensure_schema` has run.
    sweeper: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

/// In-memory TTL store with live change notifications.
///
/// Cheaply cloneable: every clone is a handle to the same collection, so a
/// server can share one store across connections and tests can observe what
/// a session wrote.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Creates a store with the given retention window and default sweeper
    /// cadence and channel capacity.
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self::with_options(retention, DEFAULT_SWEEP_INTERVAL, DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a store with explicit sweeper cadence and broadcast capacity.
    ///
    /// Short intervals and small capacities are useful in tests.
    #[must_use]
    pub fn with_options(
        retention: Duration,
        sweep_interval: Duration,
        channel_capacity: usize,
    ) -> Self {
        let (changes, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                retention,
                sweep_interval,
                users: RwLock::new(HashMap::new()),
                messages: RwLock::new(Vec::new()),
                changes,
                sweeper: Mutex::new(None),
            }),
        }
    }

    /// Returns the configured retention window.
    #[must_use]
    pub fn retention(&self) -> Duration {
        self.inner.retention
    }

    /// Removes expired messages and broadcasts a `Deleted` event for each.
    ///
    /// Called by the sweeper task; exposed for tests that want deterministic
    /// expiry without waiting out the sweep interval.
    pub async fn sweep_expired(&self) -> usize {
        Inner::sweep_expired(&self.inner).await
    }
}

impl Inner {
    async fn sweep_expired(inner: &Arc<Self>) -> usize {
        let now = Timestamp::now();
        let mut messages = inner.messages.write().await;
        let mut removed: Vec<MessageId> = Vec::new();
        messages.retain(|m| {
            if m.is_expired(inner.retention, now) {
                removed.push(m.id.clone());
                false
            } else {
                true
            }
        });
        // Emit while still holding the write lock so deletes are ordered
        // against concurrent inserts.
        for id in &removed {
            let _ = inner.changes.send(ChangeEvent::Deleted(id.clone()));
        }
        drop(messages);

        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "swept expired messages");
        }
        removed.len()
    }
}

impl MessageStore for MemoryStore {
    type Changes = BroadcastChanges;

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        // Uniqueness is structural (HashMap keyed by username); the TTL
        // policy is the sweeper task. Starting it twice would double-emit
        // deletes, hence the guard.
        let mut sweeper = self.inner.sweeper.lock().await;
        if sweeper.is_none() {
            let weak: Weak<Inner> = Arc::downgrade(&self.inner);
            let interval = self.inner.sweep_interval;
            *sweeper = Some(tokio::spawn(async move {
                let mut tick = tokio::time::interval(interval);
                loop {
                    tick.tick().await;
                    let Some(inner) = weak.upgrade() else {
                        break;
                    };
                    Inner::sweep_expired(&inner).await;
                }
            }));
            tracing::debug!(interval = ?interval, "retention sweeper started");
        }
        Ok(())
    }

    async fn create_user(&self, username: &Username) -> Result<User, StoreError> {
        let mut users = self.inner.users.write().await;
        if users.contains_key(username) {
            return Err(StoreError::DuplicateUser(username.clone()));
        }
        let user = User {
            username: username.clone(),
            created_at: Timestamp::now(),
        };
        users.insert(username.clone(), user.clone());
        Ok(user)
    }

    async fn insert(&self, draft: MessageDraft) -> Result<Message, StoreError> {
        draft.validate()?;
        let message = Message {
            id: MessageId::new(),
            sender: draft.sender,
            recipient: draft.recipient,
            body: draft.body,
            timestamp: Timestamp::now(),
        };
        let mut messages = self.inner.messages.write().await;
        messages.push(message.clone());
        // Send under the lock: emission order must match store order.
        let _ = self
            .inner
            .changes
            .send(ChangeEvent::Inserted(message.clone()));
        drop(messages);
        Ok(message)
    }

    async fn query_visible(&self, viewer: &Username) -> Result<Vec<Message>, StoreError> {
        let now = Timestamp::now();
        let messages = self.inner.messages.read().await;
        let mut visible: Vec<Message> = messages
            .iter()
            .filter(|m| !m.is_expired(self.inner.retention, now))
            .filter(|m| m.is_visible_to(viewer))
            .cloned()
            .collect();
        drop(messages);
        // Insert order already tracks assignment order; the stable sort
        // guards against wall-clock regressions.
        visible.sort_by_key(|m| m.timestamp);
        Ok(visible)
    }

    async fn subscribe_changes(&self) -> Result<Self::Changes, StoreError> {
        Ok(BroadcastChanges::new(self.inner.changes.subscribe()))
    }
}

/// Change stream over a `tokio::sync::broadcast` receiver.
///
/// Used by [`MemoryStore`] and by any adapter that fans change events out
/// locally (the client's remote store adapter routes server-sent events
/// through the same shape).
pub struct BroadcastChanges {
    rx: broadcast::Receiver<ChangeEvent>,
}

impl BroadcastChanges {
    /// Wraps a broadcast receiver as a [`ChangeStream`].
    #[must_use]
    pub const fn new(rx: broadcast::Receiver<ChangeEvent>) -> Self {
        Self { rx }
    }
}

impl ChangeStream for BroadcastChanges {
    async fn next_event(&mut self) -> Result<Option<ChangeEvent>, StoreError> {
        match self.rx.recv().await {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::RecvError::Closed) => Ok(None),
            Err(broadcast::error::RecvError::Lagged(missed)) => Err(StoreError::StreamUnavailable(
                format!("subscriber lagged by {missed} events"),
            )),
        }
    }

    async fn close(self) {
        // Dropping the receiver releases the subscription.
        drop(self);
    }
}
