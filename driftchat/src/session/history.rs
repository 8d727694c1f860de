//! History backfill shown to a participant on join.
//!
//! Fetches everything visible to the viewer, keeps the most recent slice,
//! and renders it bracketed by marker lines. The store already applies the
//! receiver half of the visibility contract in `query_visible`; this
//! routine exists to keep that contract in one place rather than
//! re-filtering ad hoc at call sites.

use driftchat_store::message::Username;
use driftchat_store::store::{MessageStore, StoreError};

use crate::render::Render;

/// Marker printed before the backfilled history.
pub const HISTORY_HEADER: &str = "— recent messages —";

/// Marker printed after the backfilled history.
pub const HISTORY_FOOTER: &str = "———————————————";

/// Renders the most recent messages visible to `viewer`.
///
/// Keeps at most `limit` entries, the newest ones, in ascending time order
/// (oldest of the kept set first). Renders nothing at all when no visible
/// messages exist; fewer than `limit` messages are all shown, since
/// truncation is a maximum, not a minimum.
///
/// # Errors
///
/// Returns [`StoreError::Unavailable`] if the store cannot be read.
pub async fn load_recent<S: MessageStore, R: Render + ?Sized>(
    store: &S,
    render: &R,
    viewer: &Username,
    limit: usize,
) -> Result<(), StoreError> {
    let messages = store.query_visible(viewer).await?;
    let start = messages.len().saturating_sub(limit);
    let recent = &messages[start..];

    if recent.is_empty() {
        return Ok(());
    }

    render.status(HISTORY_HEADER);
    for message in recent {
        render.message(message);
    }
    render.status(HISTORY_FOOTER);
    Ok(())
}
