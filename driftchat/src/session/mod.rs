//! Session coordination: one participant's history backfill, live feed,
//! and input loop, joined by a shared cancellation signal.
//!
//! The coordinator runs the backfill once, then races the feed listener
//! against the input loop. Whichever reaches a terminal state first, the
//! shared `watch` shutdown signal is raised (idempotent) and the remaining
//! task gets a bounded grace period to observe it and release its
//! resources. Ctrl-C is treated as an implicit quit.

pub mod feed;
pub mod history;
pub mod input;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use driftchat_store::message::Username;
use driftchat_store::store::{MessageStore, StoreError};

use crate::render::Render;

use feed::{FeedListener, FeedOutcome};
use input::InputLoop;

/// Farewell rendered when a session ends.
const FAREWELL: &str = "Goodbye!";

/// Tunables for one session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Maximum number of backfilled messages shown on join.
    pub history_limit: usize,
    /// How long to wait for the remaining task after shutdown is raised.
    pub shutdown_grace: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            history_limit: 30,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// How a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// The user quit (command, end of input, or interrupt).
    Quit,
    /// The live feed failed; the session ended because a dead feed with a
    /// live input loop would be a misleading half-broken state.
    FeedFailed(StoreError),
}

/// Runs one chat session to completion.
///
/// 1. Ensures store preconditions (idempotent under concurrent sessions).
/// 2. Registers the user, tolerating reconnects.
/// 3. Backfills recent history.
/// 4. Races the feed listener against the input loop, sharing one
///    cancellation signal; Ctrl-C counts as quit.
/// 5. Raises shutdown, drains the remaining task within the grace period,
///    and renders a farewell.
///
/// # Errors
///
/// Returns [`StoreError`] when the store cannot be reached during setup or
/// backfill. Failures after the tasks start are reported through
/// [`SessionEnd`] instead.
pub async fn run_session<S, R>(
    store: S,
    render: Arc<R>,
    username: Username,
    lines: mpsc::Receiver<String>,
    options: SessionOptions,
) -> Result<SessionEnd, StoreError>
where
    S: MessageStore + Clone + 'static,
    R: Render + 'static,
{
    store.ensure_schema().await?;

    match store.create_user(&username).await {
        Ok(user) => {
            tracing::info!(username = %user.username, "registered new user");
        }
        Err(StoreError::DuplicateUser(name)) => {
            // A rejoin, not a failure.
            tracing::debug!(username = %name, "user already registered, rejoining");
        }
        Err(e) => return Err(e),
    }

    history::load_recent(&store, render.as_ref(), &username, options.history_limit).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let listener = FeedListener::new(
        store.clone(),
        Arc::clone(&render),
        username.clone(),
        shutdown_rx.clone(),
    );
    let mut feed_task = tokio::spawn(listener.run());

    let input_loop = InputLoop::new(
        store.clone(),
        Arc::clone(&render),
        username.clone(),
        lines,
        shutdown_rx,
    );
    let mut input_task = tokio::spawn(input_loop.run());

    // Wait for the first terminal state, then raise shutdown (idempotent)
    // and drain the other side.
    let end = tokio::select! {
        feed_result = &mut feed_task => {
            shutdown_tx.send_replace(true);
            let end = match feed_result {
                Ok(FeedOutcome::Failed(e)) => {
                    render.error(&format!("live feed ended: {e}"));
                    SessionEnd::FeedFailed(e)
                }
                Ok(FeedOutcome::Stopped) => SessionEnd::Quit,
                Err(e) => {
                    tracing::error!(error = %e, "feed task ended abnormally");
                    SessionEnd::Quit
                }
            };
            drain(&mut input_task, options.shutdown_grace, "input").await;
            end
        }
        input_result = &mut input_task => {
            shutdown_tx.send_replace(true);
            if let Err(e) = input_result {
                tracing::error!(error = %e, "input task ended abnormally");
            }
            drain(&mut feed_task, options.shutdown_grace, "feed").await;
            SessionEnd::Quit
        }
        () = interrupted() => {
            tracing::info!("interrupt received, shutting down");
            shutdown_tx.send_replace(true);
            drain(&mut feed_task, options.shutdown_grace, "feed").await;
            drain(&mut input_task, options.shutdown_grace, "input").await;
            SessionEnd::Quit
        }
    };

    render.status(FAREWELL);
    Ok(end)
}

/// Completes when an external interrupt (Ctrl-C) arrives.
///
/// If the signal handler cannot be installed, logs and never completes, so
/// the session is driven by the feed and input tasks alone.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not install interrupt handler");
        std::future::pending::<()>().await;
    }
}

/// Waits for a task to observe shutdown, aborting it if the grace period
/// elapses.
async fn drain<T>(task: &mut tokio::task::JoinHandle<T>, grace: Duration, name: &str) {
    match tokio::time::timeout(grace, &mut *task).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            tracing::warn!(task = name, error = %e, "session task ended abnormally");
        }
        Err(_) => {
            tracing::warn!(task = name, "session task ignored shutdown, aborting");
            task.abort();
        }
    }
}
