//! Input/send loop: local lines in, store inserts out.
//!
//! Blocking stdin reads never touch the async runtime: a dedicated reader
//! thread pumps lines into an mpsc channel, and the loop here selects
//! between the next line and the shared shutdown signal. A failed insert is
//! reported and the loop continues; only `/quit`, end of input, or shutdown
//! end it.

use std::io::{BufRead, Write};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use driftchat_store::message::{MessageDraft, Username};
use driftchat_store::store::MessageStore;

use crate::render::Render;

/// The reserved command that ends the session.
pub const QUIT_COMMAND: &str = "/quit";

/// Prefix of the direct-message command: `/msg <user> <text>`.
const MSG_COMMAND: &str = "/msg";

/// Why the input loop terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    /// The user quit (`/quit` or end of input).
    Quit,
    /// The shared shutdown signal was observed.
    Cancelled,
}

/// Reads local lines and forwards non-empty text to the store.
pub struct InputLoop<S: MessageStore, R: Render> {
    store: S,
    render: Arc<R>,
    username: Username,
    lines: mpsc::Receiver<String>,
    shutdown: watch::Receiver<bool>,
}

impl<S: MessageStore, R: Render> InputLoop<S, R> {
    /// Creates an input loop fed by `lines`.
    pub const fn new(
        store: S,
        render: Arc<R>,
        username: Username,
        lines: mpsc::Receiver<String>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            render,
            username,
            lines,
            shutdown,
        }
    }

    /// Runs the loop until quit, end of input, or shutdown.
    pub async fn run(mut self) -> InputOutcome {
        if *self.shutdown.borrow() {
            return InputOutcome::Cancelled;
        }

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        tracing::debug!("input loop cancelled");
                        return InputOutcome::Cancelled;
                    }
                }
                line = self.lines.recv() => match line {
                    // Channel closed: end of input, treated as quit.
                    None => {
                        tracing::debug!("input closed");
                        return InputOutcome::Quit;
                    }
                    Some(raw) => {
                        if self.handle_line(&raw).await == LineAction::Quit {
                            return InputOutcome::Quit;
                        }
                    }
                }
            }
        }
    }

    /// Processes one raw input line.
    async fn handle_line(&self, raw: &str) -> LineAction {
        let line = raw.trim();

        if line == QUIT_COMMAND {
            return LineAction::Quit;
        }
        if line.is_empty() {
            // Early mirror of the store's empty-body rejection: skip the
            // round trip entirely.
            return LineAction::Continue;
        }

        if let Some(rest) = line.strip_prefix(MSG_COMMAND) {
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                self.send_direct(rest.trim_start()).await;
                return LineAction::Continue;
            }
            // Fall through: something like "/msgs" is an unknown command.
        }

        if line.starts_with('/') {
            let command = line.split_whitespace().next().unwrap_or(line);
            self.render.error(&format!("unknown command: {command}"));
            return LineAction::Continue;
        }

        self.insert(MessageDraft::to_room(self.username.clone(), line))
            .await;
        LineAction::Continue
    }

    /// Handles the body of a `/msg <user> <text>` command.
    async fn send_direct(&self, rest: &str) {
        let Some((name, text)) = rest.split_once(char::is_whitespace) else {
            self.render.error("usage: /msg <user> <text>");
            return;
        };
        let recipient = match Username::parse(name) {
            Ok(recipient) => recipient,
            Err(e) => {
                self.render.error(&format!("cannot send to '{name}': {e}"));
                return;
            }
        };
        let text = text.trim();
        if text.is_empty() {
            self.render.error("usage: /msg <user> <text>");
            return;
        }
        self.insert(MessageDraft::to_user(
            self.username.clone(),
            recipient,
            text,
        ))
        .await;
    }

    /// Inserts a draft; failures are reported and do not end the loop.
    async fn insert(&self, draft: MessageDraft) {
        if let Err(e) = self.store.insert(draft).await {
            tracing::warn!(error = %e, "send failed");
            self.render.error(&format!("send failed: {e}"));
        }
    }
}

/// What to do after processing one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineAction {
    Continue,
    Quit,
}

/// Spawns the blocking stdin reader thread.
///
/// Prompts with `"> "` before each line and forwards every line read into
/// the returned channel. The channel closes on end of input (Ctrl-D) or
/// when the receiving side is dropped, so the input loop observes EOF as a
/// closed channel.
#[must_use]
pub fn spawn_stdin_pump(buffer: usize) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        loop {
            {
                let mut out = std::io::stdout().lock();
                let _ = write!(out, "> ");
                let _ = out.flush();
            }
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
    });
    rx
}
