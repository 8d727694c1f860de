//! Live feed listener: turns the store's change stream into rendered chat
//! lines for one viewer.
//!
//! Lifecycle: `Subscribing -> Listening -> (Stopped | Failed)`. While
//! listening, the task waits for the next change event or the shared
//! shutdown signal, whichever comes first. The subscription is released on
//! every exit path.

use std::sync::Arc;

use tokio::sync::watch;

use driftchat_store::event::ChangeEvent;
use driftchat_store::message::Username;
use driftchat_store::store::{ChangeStream, MessageStore, StoreError};

use crate::render::Render;

/// Terminal state of a feed listener.
#[derive(Debug)]
pub enum FeedOutcome {
    /// Shutdown was observed; the subscription was released and nothing
    /// further was rendered.
    Stopped,
    /// The subscription could not be established or terminated mid-stream.
    /// Fatal to the session: a live input loop over a dead feed would be a
    /// misleading half-broken state.
    Failed(StoreError),
}

/// Listens to the store's change stream and renders visible inserts.
pub struct FeedListener<S: MessageStore, R: Render> {
    store: S,
    render: Arc<R>,
    viewer: Username,
    shutdown: watch::Receiver<bool>,
}

impl<S: MessageStore, R: Render> FeedListener<S, R> {
    /// Creates a listener for `viewer` observing the given shutdown signal.
    pub const fn new(
        store: S,
        render: Arc<R>,
        viewer: Username,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            render,
            viewer,
            shutdown,
        }
    }

    /// Runs the listener to its terminal state.
    ///
    /// Consumes `self`; the subscription is released before returning, on
    /// every path.
    pub async fn run(self) -> FeedOutcome {
        let Self {
            store,
            render,
            viewer,
            mut shutdown,
        } = self;

        // Level-triggered: a shutdown raised before we subscribe still stops us.
        if *shutdown.borrow() {
            return FeedOutcome::Stopped;
        }

        let mut changes = match store.subscribe_changes().await {
            Ok(changes) => changes,
            Err(e) => {
                tracing::warn!(error = %e, "could not subscribe to change stream");
                return FeedOutcome::Failed(e);
            }
        };
        // Only the subscription is needed from here on.
        drop(store);
        tracing::debug!(viewer = %viewer, "live feed listening");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    // A closed shutdown channel means the coordinator is
                    // gone; stop either way.
                    if changed.is_err() || *shutdown.borrow() {
                        changes.close().await;
                        tracing::debug!(viewer = %viewer, "live feed stopped");
                        return FeedOutcome::Stopped;
                    }
                }
                event = changes.next_event() => match event {
                    Ok(Some(ChangeEvent::Inserted(message))) => {
                        // Visibility is evaluated once, at delivery time.
                        // Non-visible inserts are dropped, not buffered.
                        if message.is_visible_to(&viewer) {
                            render.message(&message);
                        }
                    }
                    Ok(Some(ChangeEvent::Deleted(_))) => {
                        // Expiry is silent by default: deletions are
                        // consumed and intentionally not surfaced.
                    }
                    Ok(None) => {
                        tracing::warn!(viewer = %viewer, "change stream ended");
                        return FeedOutcome::Failed(StoreError::StreamUnavailable(
                            "change stream ended".to_string(),
                        ));
                    }
                    Err(e) => {
                        tracing::warn!(viewer = %viewer, error = %e, "change stream failed");
                        changes.close().await;
                        return FeedOutcome::Failed(e);
                    }
                }
            }
        }
    }
}
