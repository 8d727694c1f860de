//! Integration tests for the remote store path: client sessions talking to
//! a real store server over WebSocket.
//!
//! Two participants in separate "processes" (separate connections) share
//! one room: history backfills across connections, live messages flow
//! through the server's change forwarder, and losing the server's change
//! stream is surfaced as a terminal feed failure.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use driftchat::remote::{RemoteOptions, RemoteStore};
use driftchat::render::BufferRender;
use driftchat::session::{self, SessionEnd, SessionOptions};
use driftchat_server::server;
use driftchat_store::memory::MemoryStore;
use driftchat_store::message::{MessageDraft, Recipient, Username};
use driftchat_store::store::{ChangeStream, MessageStore, StoreError};

fn user(name: &str) -> Username {
    Username::parse(name).unwrap()
}

fn remote_options() -> RemoteOptions {
    RemoteOptions {
        connect_timeout: Duration::from_secs(5),
        request_timeout: Duration::from_secs(5),
    }
}

/// Starts a server over the given store and returns its URL.
async fn serve(store: MemoryStore) -> String {
    let (addr, _handle) = server::start_server("127.0.0.1:0", store).await.unwrap();
    format!("ws://{addr}/ws")
}

/// Starts a server over a fresh store and returns its URL.
async fn start_server() -> String {
    serve(MemoryStore::new(Duration::from_secs(1800))).await
}

#[tokio::test]
async fn remote_insert_is_visible_to_a_second_connection() {
    let url = start_server().await;

    let alice = RemoteStore::connect(&url, remote_options()).await.unwrap();
    let bob = RemoteStore::connect(&url, remote_options()).await.unwrap();

    let stored = alice
        .insert(MessageDraft::to_room(user("alice"), "hello over the wire"))
        .await
        .unwrap();
    assert_eq!(stored.recipient, Recipient::Room);

    let visible = bob.query_visible(&user("bob")).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].body, "hello over the wire");
    assert_eq!(visible[0].id, stored.id);
}

#[tokio::test]
async fn remote_change_stream_delivers_other_writers_inserts() {
    let url = start_server().await;

    let bob = RemoteStore::connect(&url, remote_options()).await.unwrap();
    let mut changes = bob.subscribe_changes().await.unwrap();

    let alice = RemoteStore::connect(&url, remote_options()).await.unwrap();
    alice
        .insert(MessageDraft::to_room(user("alice"), "live"))
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), changes.next_event())
        .await
        .expect("change should arrive")
        .unwrap();
    match event {
        Some(driftchat_store::event::ChangeEvent::Inserted(msg)) => {
            assert_eq!(msg.body, "live");
        }
        other => panic!("expected Inserted, got: {other:?}"),
    }
}

#[tokio::test]
async fn remote_duplicate_user_maps_to_the_rejoin_error() {
    let url = start_server().await;
    let store = RemoteStore::connect(&url, remote_options()).await.unwrap();

    store.create_user(&user("alice")).await.unwrap();
    let result = store.create_user(&user("alice")).await;
    assert!(matches!(result, Err(StoreError::DuplicateUser(_))));
}

#[tokio::test]
async fn remote_validation_stays_local() {
    let url = start_server().await;
    let store = RemoteStore::connect(&url, remote_options()).await.unwrap();

    let result = store
        .insert(MessageDraft::to_room(user("alice"), "   "))
        .await;
    assert!(matches!(result, Err(StoreError::Validation(_))));
}

#[tokio::test]
async fn connect_to_nothing_reports_unavailable() {
    // Port 9 (discard) is a safe dead end on loopback.
    let result = RemoteStore::connect(
        "ws://127.0.0.1:9/ws",
        RemoteOptions {
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(2),
        },
    )
    .await;
    assert!(matches!(result, Err(StoreError::Unavailable(_))));
}

#[tokio::test]
async fn bad_url_scheme_is_rejected_before_dialing() {
    let result = RemoteStore::connect("http://127.0.0.1:9400/ws", remote_options()).await;
    assert!(matches!(result, Err(StoreError::Unavailable(_))));
}

#[tokio::test]
async fn full_session_over_the_wire() {
    let url = start_server().await;

    // Seed history through one connection.
    let seed = RemoteStore::connect(&url, remote_options()).await.unwrap();
    seed.insert(MessageDraft::to_room(user("alice"), "from before"))
        .await
        .unwrap();

    // Bob's session over its own connection.
    let bob_store = RemoteStore::connect(&url, remote_options()).await.unwrap();
    let render = Arc::new(BufferRender::new());
    let (line_tx, line_rx) = mpsc::channel(16);
    let task = tokio::spawn(session::run_session(
        bob_store,
        Arc::clone(&render),
        user("bob"),
        line_rx,
        SessionOptions {
            history_limit: 30,
            shutdown_grace: Duration::from_secs(2),
        },
    ));
    tokio::time::sleep(Duration::from_millis(150)).await;

    // A live message from Alice while Bob is connected.
    seed.insert(MessageDraft::to_room(user("alice"), "hello bob"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    line_tx.send("/quit\n".to_string()).await.unwrap();
    let end = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(matches!(end, SessionEnd::Quit));

    let messages = render.messages();
    assert_eq!(messages.len(), 2, "backfill + live line, got: {messages:?}");
    assert!(messages[0].ends_with("alice: from before"));
    assert!(messages[1].ends_with("alice: hello bob"));
}

#[tokio::test]
async fn lost_server_stream_fails_the_session_feed() {
    // A single-slot change channel on the server: a burst of direct
    // inserts overruns the connection's forwarder, which closes the
    // connection. The client sees mid-stream termination.
    let server_store =
        MemoryStore::with_options(Duration::from_secs(1800), Duration::from_secs(60), 1);
    let url = serve(server_store.clone()).await;

    let store = RemoteStore::connect(&url, remote_options()).await.unwrap();
    let render = Arc::new(BufferRender::new());
    let (_line_tx, line_rx) = mpsc::channel::<String>(16);
    let task = tokio::spawn(session::run_session(
        store,
        Arc::clone(&render),
        user("alice"),
        line_rx,
        SessionOptions {
            history_limit: 30,
            shutdown_grace: Duration::from_secs(2),
        },
    ));
    tokio::time::sleep(Duration::from_millis(150)).await;

    for i in 0..4 {
        server_store
            .insert(MessageDraft::to_room(user("bob"), format!("burst {i}")))
            .await
            .unwrap();
    }

    let end = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("session must end when the stream dies")
        .unwrap()
        .unwrap();
    assert!(matches!(end, SessionEnd::FeedFailed(_)));
}
