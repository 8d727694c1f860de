//! Store server core: WebSocket handler, request dispatch, and the
//! per-connection change-event forwarder.
//!
//! Each connection speaks the request/reply protocol from
//! [`driftchat_store::wire`]. Requests are answered in order on the same
//! connection. Once a connection subscribes, change events are forwarded as
//! unsolicited [`ServerReply::Change`] frames, interleaved with request
//! replies. When the server-side change stream ends (store shut down or the
//! subscriber lagged), the connection is closed; clients observe this as
//! mid-stream termination, which the protocol defines as terminal.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use driftchat_store::codec;
use driftchat_store::memory::{BroadcastChanges, MemoryStore};
use driftchat_store::store::{ChangeStream, MessageStore, StoreError};
use driftchat_store::wire::{ClientRequest, ServerReply};

/// Handles an upgraded WebSocket connection for a single client.
///
/// The connection lifecycle:
/// 1. Spawn a writer task fed by an unbounded channel of frames.
/// 2. Read frames, decode requests, dispatch to the store, reply.
/// 3. On `Subscribe`, spawn a forwarder pumping change events into the
///    writer channel.
/// 4. On disconnect, stop the forwarder (releasing the subscription) and
///    let the writer drain.
pub async fn handle_socket(socket: WebSocket, store: MemoryStore) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Channel for frames destined to this client's WebSocket writer.
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::debug!("WebSocket write failed, stopping writer");
                break;
            }
        }
    });

    // The change forwarder for this connection, if Subscribe was requested.
    let mut forwarder: Option<tokio::task::JoinHandle<()>> = None;

    while let Some(Ok(msg)) = ws_receiver.next().await {
        match msg {
            Message::Binary(data) => {
                handle_frame(&data, &store, &tx, &mut forwarder).await;
            }
            Message::Close(_) => {
                tracing::debug!("received close frame");
                break;
            }
            _ => {
                // Text, ping, and pong frames are ignored.
            }
        }
    }

    // Stopping the forwarder drops its change stream, releasing the
    // subscription. The writer exits once all senders are gone.
    if let Some(handle) = forwarder.take() {
        handle.abort();
    }
    drop(tx);
    let _ = write_task.await;
    tracing::debug!("client disconnected");
}

/// Decodes and dispatches a single request frame.
async fn handle_frame(
    data: &[u8],
    store: &MemoryStore,
    tx: &mpsc::UnboundedSender<Message>,
    forwarder: &mut Option<tokio::task::JoinHandle<()>>,
) {
    let request = match codec::decode_request(data) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "failed to decode request frame");
            send_reply(
                tx,
                &ServerReply::Error {
                    reason: format!("undecodable request: {e}"),
                },
            );
            return;
        }
    };

    let reply = match request {
        ClientRequest::EnsureSchema => match store.ensure_schema().await {
            Ok(()) => ServerReply::SchemaReady,
            Err(e) => ServerReply::Error {
                reason: e.to_string(),
            },
        },
        ClientRequest::CreateUser { username } => match store.create_user(&username).await {
            Ok(user) => ServerReply::UserCreated { user },
            Err(StoreError::DuplicateUser(username)) => ServerReply::DuplicateUser { username },
            Err(e) => ServerReply::Error {
                reason: e.to_string(),
            },
        },
        ClientRequest::Insert { draft } => match store.insert(draft).await {
            Ok(message) => ServerReply::Inserted { message },
            Err(e) => ServerReply::Error {
                reason: e.to_string(),
            },
        },
        ClientRequest::QueryVisible { viewer } => match store.query_visible(&viewer).await {
            Ok(messages) => ServerReply::Messages { messages },
            Err(e) => ServerReply::Error {
                reason: e.to_string(),
            },
        },
        ClientRequest::Subscribe => {
            if forwarder.is_some() {
                // Already streaming on this connection; acknowledging again
                // is harmless.
                ServerReply::Subscribed
            } else {
                match store.subscribe_changes().await {
                    Ok(changes) => {
                        *forwarder = Some(spawn_change_forwarder(changes, tx.clone()));
                        ServerReply::Subscribed
                    }
                    Err(e) => ServerReply::Error {
                        reason: e.to_string(),
                    },
                }
            }
        }
    };

    send_reply(tx, &reply);
}

/// Encodes a reply and queues it on the writer channel.
fn send_reply(tx: &mpsc::UnboundedSender<Message>, reply: &ServerReply) {
    match codec::encode_reply(reply) {
        Ok(bytes) => {
            let _ = tx.send(Message::Binary(bytes.into()));
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to encode reply");
        }
    }
}

/// Spawns the task that forwards change events to one connection.
///
/// Ends when the writer side is gone, or when the change stream terminates;
/// in the latter case the connection is closed so the client observes
/// mid-stream termination rather than a silently dead feed.
fn spawn_change_forwarder(
    mut changes: BroadcastChanges,
    tx: mpsc::UnboundedSender<Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = tx.closed() => break,
                event = changes.next_event() => match event {
                    Ok(Some(event)) => send_reply(&tx, &ServerReply::Change { event }),
                    Ok(None) => {
                        tracing::debug!("change stream ended, closing connection");
                        let _ = tx.send(Message::Close(None));
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "change stream failed, closing connection");
                        let _ = tx.send(Message::Close(None));
                        break;
                    }
                }
            }
        }
        changes.close().await;
    })
}

/// Starts the store server on the given address and returns the bound
/// address and a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
    store: MemoryStore,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(store);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "store server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(store): axum::extract::State<MemoryStore>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, store))
}
