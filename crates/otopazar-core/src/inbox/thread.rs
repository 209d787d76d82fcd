use serde::Serialize;
use tracing::debug;

use super::{decode_messages, ensure_id, fetch_profile};
use crate::backend::{DataService, Filter, Order, Query};
use crate::constants::{message_columns, tables};
use crate::error::InboxError;
use crate::models::{Message, Profile};

/// Full history between the viewer and one counterpart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadView {
    pub counterpart: Profile,
    pub messages: Vec<Message>,
}

fn involving(user_id: &str) -> Filter {
    Filter::or([
        Filter::eq(message_columns::SENDER_ID, user_id),
        Filter::eq(message_columns::RECIPIENT_ID, user_id),
    ])
}

/// Server-side stage: every message touching both users.
///
/// The backend cannot express the exact pair condition, so this may return
/// more than the thread; [`filter_thread`] narrows it.
pub async fn fetch_candidate_messages(
    service: &dyn DataService,
    viewer: &str,
    counterpart: &str,
) -> Result<Vec<Message>, InboxError> {
    let query = Query::table(tables::MESSAGES)
        .filter(involving(viewer))
        .filter(involving(counterpart))
        .order(Order::asc(message_columns::CREATED_AT));

    let rows = service
        .query(&query)
        .await
        .map_err(InboxError::fetch("thread"))?;
    decode_messages(rows).map_err(InboxError::fetch("thread"))
}

/// Client-side stage: keep only messages between exactly `viewer` and
/// `counterpart`, oldest first, each id once.
pub fn filter_thread(viewer: &str, counterpart: &str, candidates: Vec<Message>) -> Vec<Message> {
    let mut thread: Vec<Message> = candidates
        .into_iter()
        .filter(|m| m.involves(viewer, counterpart))
        .collect();
    thread.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
    thread.dedup_by(|a, b| a.id == b.id);
    thread
}

/// Load the thread with `counterpart` together with their profile.
///
/// Does not touch read state; callers run the unread marker afterwards.
pub async fn load_thread(
    service: &dyn DataService,
    viewer: &str,
    counterpart: &str,
) -> Result<ThreadView, InboxError> {
    ensure_id(viewer, "viewer id")?;
    ensure_id(counterpart, "counterpart id")?;
    if viewer == counterpart {
        return Err(InboxError::InvalidInput(
            "viewer and counterpart must differ".to_string(),
        ));
    }

    let profile = fetch_profile(service, counterpart).await;
    let candidates = fetch_candidate_messages(service, viewer, counterpart).await?;
    let fetched = candidates.len();
    let messages = filter_thread(viewer, counterpart, candidates);
    debug!(
        viewer,
        counterpart,
        fetched,
        kept = messages.len(),
        "Loaded thread"
    );

    Ok(ThreadView {
        counterpart: profile,
        messages,
    })
}
