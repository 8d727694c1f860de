//! Integration tests for the full session lifecycle.
//!
//! Drives `run_session` end to end over an in-memory store with scripted
//! input lines: backfill on join, live rendering while connected, `/quit`
//! handling, reconnect tolerance, and subscription release at shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use driftchat::render::{BufferRender, RenderedLine};
use driftchat::session::history::HISTORY_HEADER;
use driftchat::session::{self, SessionEnd, SessionOptions};
use driftchat_store::memory::MemoryStore;
use driftchat_store::message::{MessageDraft, Username};
use driftchat_store::store::MessageStore;

fn user(name: &str) -> Username {
    Username::parse(name).unwrap()
}

fn options() -> SessionOptions {
    SessionOptions {
        history_limit: 30,
        shutdown_grace: Duration::from_secs(2),
    }
}

/// Starts a session for `name`, returning its renderer, line feeder, and
/// join handle.
fn start_session(
    store: &MemoryStore,
    name: &str,
) -> (
    Arc<BufferRender>,
    mpsc::Sender<String>,
    tokio::task::JoinHandle<Result<SessionEnd, driftchat_store::store::StoreError>>,
) {
    let render = Arc::new(BufferRender::new());
    let (line_tx, line_rx) = mpsc::channel(16);
    let task = tokio::spawn(session::run_session(
        store.clone(),
        Arc::clone(&render),
        user(name),
        line_rx,
        options(),
    ));
    (render, line_tx, task)
}

#[tokio::test]
async fn quit_ends_the_session_with_a_farewell() {
    let store = MemoryStore::new(Duration::from_secs(1800));
    let (render, line_tx, task) = start_session(&store, "alice");

    line_tx.send("/quit\n".to_string()).await.unwrap();
    let end = tokio::time::timeout(Duration::from_secs(3), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert!(matches!(end, SessionEnd::Quit));
    let lines = render.lines();
    assert_eq!(
        lines.last(),
        Some(&RenderedLine::Status("Goodbye!".to_string()))
    );
}

#[tokio::test]
async fn joining_an_empty_room_renders_no_history_section() {
    let store = MemoryStore::new(Duration::from_secs(1800));
    let (render, line_tx, task) = start_session(&store, "alice");

    line_tx.send("/quit\n".to_string()).await.unwrap();
    task.await.unwrap().unwrap();

    assert!(
        !render
            .lines()
            .contains(&RenderedLine::Status(HISTORY_HEADER.to_string())),
        "empty history must render no markers"
    );
}

#[tokio::test]
async fn session_backfills_existing_messages_then_streams_new_ones() {
    let store = MemoryStore::new(Duration::from_secs(1800));
    store
        .insert(MessageDraft::to_room(user("alice"), "from before"))
        .await
        .unwrap();

    let (render, line_tx, task) = start_session(&store, "bob");
    // Let the session finish its backfill and subscribe.
    tokio::time::sleep(Duration::from_millis(80)).await;

    store
        .insert(MessageDraft::to_room(user("alice"), "hello"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    line_tx.send("/quit\n".to_string()).await.unwrap();
    task.await.unwrap().unwrap();

    let messages = render.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].ends_with("alice: from before"));
    assert!(messages[1].ends_with("alice: hello"));
}

#[tokio::test]
async fn own_messages_echo_back_through_the_feed() {
    let store = MemoryStore::new(Duration::from_secs(1800));
    let (render, line_tx, task) = start_session(&store, "alice");
    tokio::time::sleep(Duration::from_millis(80)).await;

    line_tx.send("hello world\n".to_string()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    line_tx.send("/quit\n".to_string()).await.unwrap();
    task.await.unwrap().unwrap();

    let messages = render.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].ends_with("alice: hello world"));
}

#[tokio::test]
async fn direct_message_rendered_for_addressee_only() {
    let store = MemoryStore::new(Duration::from_secs(1800));
    let (alice_render, alice_tx, alice_task) = start_session(&store, "alice");
    let (carol_render, carol_tx, carol_task) = start_session(&store, "carol");
    tokio::time::sleep(Duration::from_millis(80)).await;

    store
        .insert(MessageDraft::to_user(user("bob"), user("alice"), "psst"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    alice_tx.send("/quit\n".to_string()).await.unwrap();
    carol_tx.send("/quit\n".to_string()).await.unwrap();
    alice_task.await.unwrap().unwrap();
    carol_task.await.unwrap().unwrap();

    assert_eq!(alice_render.messages().len(), 1);
    assert!(alice_render.messages()[0].ends_with("bob: psst"));
    assert!(carol_render.messages().is_empty());
}

#[tokio::test]
async fn subscription_is_released_after_quit() {
    let store = MemoryStore::new(Duration::from_secs(1800));
    let (render, line_tx, task) = start_session(&store, "alice");
    tokio::time::sleep(Duration::from_millis(80)).await;

    line_tx.send("/quit\n".to_string()).await.unwrap();
    task.await.unwrap().unwrap();

    let before = render.messages().len();
    store
        .insert(MessageDraft::to_room(user("bob"), "after quit"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert_eq!(render.messages().len(), before, "no events after release");
}

#[tokio::test]
async fn rejoining_with_the_same_handle_is_not_an_error() {
    let store = MemoryStore::new(Duration::from_secs(1800));

    let (_render, line_tx, task) = start_session(&store, "alice");
    line_tx.send("/quit\n".to_string()).await.unwrap();
    task.await.unwrap().unwrap();

    // Second join with the same handle: DuplicateUser is swallowed.
    let (render, line_tx, task) = start_session(&store, "alice");
    line_tx.send("/quit\n".to_string()).await.unwrap();
    let end = task.await.unwrap().unwrap();
    assert!(matches!(end, SessionEnd::Quit));
    assert!(render.errors().is_empty());
}

#[tokio::test]
async fn end_of_input_quits_like_the_command() {
    let store = MemoryStore::new(Duration::from_secs(1800));
    let (render, line_tx, task) = start_session(&store, "alice");
    tokio::time::sleep(Duration::from_millis(50)).await;

    drop(line_tx);
    let end = tokio::time::timeout(Duration::from_secs(3), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert!(matches!(end, SessionEnd::Quit));
    assert_eq!(
        render.lines().last(),
        Some(&RenderedLine::Status("Goodbye!".to_string()))
    );
}

#[tokio::test]
async fn feed_failure_ends_the_session_even_with_idle_input() {
    // A single-slot change channel: a burst of inserts overruns the
    // session's subscription, which is a terminal stream failure.
    let store = MemoryStore::with_options(Duration::from_secs(1800), Duration::from_secs(60), 1);
    let (render, _line_tx, task) = start_session(&store, "alice");
    tokio::time::sleep(Duration::from_millis(80)).await;

    for i in 0..4 {
        store
            .insert(MessageDraft::to_room(user("bob"), format!("burst {i}")))
            .await
            .unwrap();
    }

    let end = tokio::time::timeout(Duration::from_secs(3), task)
        .await
        .expect("session must end on feed failure")
        .unwrap()
        .unwrap();
    assert!(matches!(end, SessionEnd::FeedFailed(_)));
    assert!(
        render.errors().iter().any(|e| e.contains("live feed")),
        "feed failure must be reported"
    );
}
