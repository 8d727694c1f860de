//! WebSocket-backed store adapter.
//!
//! Implements the [`MessageStore`] boundary over a connection to a
//! `driftchat-server` instance. One request is in flight at a time and
//! replies are read in order; unsolicited `Change` frames are routed by a
//! background reader task into a broadcast fan-out that backs the change
//! stream, so they can interleave with request replies without confusing
//! the pairing.
//!
//! A dropped connection is terminal: pending and future requests fail with
//! `Unavailable`, and open change streams end, which the session treats as
//! mid-stream termination.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use driftchat_store::codec;
use driftchat_store::event::ChangeEvent;
use driftchat_store::memory::BroadcastChanges;
use driftchat_store::message::{Message as ChatMessage, MessageDraft, User, Username};
use driftchat_store::store::{MessageStore, StoreError};
use driftchat_store::wire::{ClientRequest, ServerReply};

/// Type alias for the write half of the WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of the WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Buffer for request replies routed by the reader task.
const REPLY_BUFFER: usize = 16;

/// Capacity of the local change-event fan-out.
const CHANGE_CAPACITY: usize = 256;

/// Connection tunables for [`RemoteStore::connect`].
#[derive(Debug, Clone)]
pub struct RemoteOptions {
    /// Timeout for establishing the WebSocket connection.
    pub connect_timeout: Duration,
    /// Timeout for each request's reply.
    pub request_timeout: Duration,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
        }
    }
}

struct RemoteInner {
    /// Write half, shared for concurrent sends.
    ws_sender: Mutex<WsSender>,
    /// Reply queue; locking it is also what serializes requests.
    replies: Mutex<mpsc::Receiver<ServerReply>>,
    /// Local fan-out of server-sent change events. The reader task empties
    /// the slot when the connection drops, which ends every open change
    /// stream; `None` afterward.
    changes: Arc<Mutex<Option<broadcast::Sender<ChangeEvent>>>>,
    /// Whether the connection is believed to be up.
    connected: Arc<AtomicBool>,
    request_timeout: Duration,
    /// Background reader; lives as long as the connection.
    _reader_handle: tokio::task::JoinHandle<()>,
}

/// Store adapter speaking the wire protocol to a store server.
///
/// Cheaply cloneable; all clones share one connection.
#[derive(Clone)]
pub struct RemoteStore {
    inner: Arc<RemoteInner>,
}

impl RemoteStore {
    /// Connects to a store server at `url` (`ws://host:port/ws`).
    ///
    /// Spawns the background reader task that routes replies and change
    /// events for the lifetime of the connection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the URL is not a WebSocket
    /// URL, the connection times out, or the handshake fails.
    pub async fn connect(url: &str, options: RemoteOptions) -> Result<Self, StoreError> {
        let parsed = url::Url::parse(url)
            .map_err(|e| StoreError::Unavailable(format!("invalid server url: {e}")))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(StoreError::Unavailable(format!(
                "unsupported url scheme '{}'",
                parsed.scheme()
            )));
        }

        let (ws_stream, _response) =
            tokio::time::timeout(options.connect_timeout, connect_async(url))
                .await
                .map_err(|_| {
                    tracing::warn!(url, "store server connect timed out");
                    StoreError::Unavailable("connect timed out".to_string())
                })?
                .map_err(|e| {
                    tracing::warn!(url, error = %e, "store server connect failed");
                    StoreError::Unavailable(format!("connect failed: {e}"))
                })?;

        let (ws_sender, ws_reader) = ws_stream.split();
        let (reply_tx, reply_rx) = mpsc::channel(REPLY_BUFFER);
        let (change_tx, _) = broadcast::channel(CHANGE_CAPACITY);

        let connected = Arc::new(AtomicBool::new(true));
        let changes = Arc::new(Mutex::new(Some(change_tx.clone())));

        let reader_handle = tokio::spawn(reader_task(
            ws_reader,
            reply_tx,
            change_tx,
            Arc::clone(&connected),
            Arc::clone(&changes),
        ));

        tracing::info!(url, "connected to store server");
        Ok(Self {
            inner: Arc::new(RemoteInner {
                ws_sender: Mutex::new(ws_sender),
                replies: Mutex::new(reply_rx),
                changes,
                connected,
                request_timeout: options.request_timeout,
                _reader_handle: reader_handle,
            }),
        })
    }

    /// Sends one request and waits for its reply.
    async fn request(&self, request: &ClientRequest) -> Result<ServerReply, StoreError> {
        // Holding the reply receiver serializes requests on this connection.
        let mut replies = self.inner.replies.lock().await;

        if !self.inner.connected.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection closed".to_string()));
        }

        // A previously timed-out request may have left its reply behind;
        // drop stale replies so pairing stays aligned.
        while let Ok(stale) = replies.try_recv() {
            tracing::warn!(reply = ?stale, "discarding stale reply");
        }

        let bytes = codec::encode_request(request)
            .map_err(|e| StoreError::Unavailable(format!("encode failed: {e}")))?;
        self.inner
            .ws_sender
            .lock()
            .await
            .send(Message::Binary(bytes.into()))
            .await
            .map_err(|e| StoreError::Unavailable(format!("send failed: {e}")))?;

        match tokio::time::timeout(self.inner.request_timeout, replies.recv()).await {
            Err(_) => Err(StoreError::Unavailable("request timed out".to_string())),
            Ok(None) => Err(StoreError::Unavailable("connection closed".to_string())),
            Ok(Some(reply)) => Ok(reply),
        }
    }
}

impl MessageStore for RemoteStore {
    type Changes = BroadcastChanges;

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        match self.request(&ClientRequest::EnsureSchema).await? {
            ServerReply::SchemaReady => Ok(()),
            ServerReply::Error { reason } => Err(StoreError::Unavailable(reason)),
            other => Err(unexpected_reply(&other)),
        }
    }

    async fn create_user(&self, username: &Username) -> Result<User, StoreError> {
        let request = ClientRequest::CreateUser {
            username: username.clone(),
        };
        match self.request(&request).await? {
            ServerReply::UserCreated { user } => Ok(user),
            ServerReply::DuplicateUser { username } => Err(StoreError::DuplicateUser(username)),
            ServerReply::Error { reason } => Err(StoreError::Unavailable(reason)),
            other => Err(unexpected_reply(&other)),
        }
    }

    async fn insert(&self, draft: MessageDraft) -> Result<ChatMessage, StoreError> {
        // Validation errors stay local; only well-formed drafts go out.
        draft.validate()?;
        match self.request(&ClientRequest::Insert { draft }).await? {
            ServerReply::Inserted { message } => Ok(message),
            ServerReply::Error { reason } => Err(StoreError::Unavailable(reason)),
            other => Err(unexpected_reply(&other)),
        }
    }

    async fn query_visible(&self, viewer: &Username) -> Result<Vec<ChatMessage>, StoreError> {
        let request = ClientRequest::QueryVisible {
            viewer: viewer.clone(),
        };
        match self.request(&request).await? {
            ServerReply::Messages { messages } => Ok(messages),
            ServerReply::Error { reason } => Err(StoreError::Unavailable(reason)),
            other => Err(unexpected_reply(&other)),
        }
    }

    async fn subscribe_changes(&self) -> Result<Self::Changes, StoreError> {
        // Subscribe to the local fan-out before the server acknowledges so
        // no event between the ack and the subscription is lost.
        let rx = {
            let changes = self.inner.changes.lock().await;
            match changes.as_ref() {
                Some(tx) => tx.subscribe(),
                None => {
                    return Err(StoreError::StreamUnavailable(
                        "connection closed".to_string(),
                    ));
                }
            }
        };
        match self.request(&ClientRequest::Subscribe).await {
            Ok(ServerReply::Subscribed) => Ok(BroadcastChanges::new(rx)),
            Ok(ServerReply::Error { reason }) => Err(StoreError::StreamUnavailable(reason)),
            Ok(other) => Err(StoreError::StreamUnavailable(format!(
                "unexpected reply: {other:?}"
            ))),
            Err(StoreError::Unavailable(reason)) => Err(StoreError::StreamUnavailable(reason)),
            Err(e) => Err(e),
        }
    }
}

fn unexpected_reply(reply: &ServerReply) -> StoreError {
    StoreError::Unavailable(format!("unexpected reply: {reply:?}"))
}

/// Background task: routes incoming frames for the connection's lifetime.
///
/// `Change` frames go to the broadcast fan-out; everything else is a
/// request reply. Exits when the connection drops, marking the store
/// disconnected and ending both queues.
async fn reader_task(
    mut ws_reader: WsReader,
    reply_tx: mpsc::Sender<ServerReply>,
    change_tx: broadcast::Sender<ChangeEvent>,
    connected: Arc<AtomicBool>,
    changes: Arc<Mutex<Option<broadcast::Sender<ChangeEvent>>>>,
) {
    while let Some(frame) = ws_reader.next().await {
        match frame {
            Ok(Message::Binary(data)) => match codec::decode_reply(&data) {
                Ok(ServerReply::Change { event }) => {
                    // No subscribers yet is fine; events before the first
                    // subscription are simply not retained.
                    let _ = change_tx.send(event);
                }
                Ok(reply) => {
                    if reply_tx.send(reply).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "undecodable frame from store server");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("store server closed the connection");
                break;
            }
            Ok(_) => {
                // Text, ping, and pong frames are ignored.
            }
            Err(e) => {
                tracing::warn!(error = %e, "store connection error");
                break;
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
    // Emptying the slot and dropping the local sender leaves no sender
    // alive: open change streams end, and dropping `reply_tx` wakes any
    // pending request with `None`.
    changes.lock().await.take();
    drop(change_tx);
    tracing::debug!("store reader task ended");
}
