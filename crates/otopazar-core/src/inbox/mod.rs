//! The messaging inbox: conversation list, thread loading, read state,
//! composing, and realtime dispatch.

pub mod aggregator;
pub mod bridge;
pub mod composer;
pub mod profiles;
pub mod summary;
pub mod thread;
pub mod unread;

pub use aggregator::{aggregate_conversations, load_conversations};
pub use bridge::{BridgeAction, BridgeState, RealtimeBridge};
pub use composer::{contact_seller, send_message, ComposeContext};
pub use profiles::{fetch_profile, ProfileCache};
pub use summary::inbox_summary;
pub use thread::{fetch_candidate_messages, filter_thread, load_thread, ThreadView};
pub use unread::mark_thread_read;

use crate::backend::Row;
use crate::error::{BackendError, InboxError};
use crate::models::Message;

pub(crate) fn ensure_id(value: &str, what: &str) -> Result<(), InboxError> {
    if value.trim().is_empty() {
        return Err(InboxError::InvalidInput(format!("{} must not be empty", what)));
    }
    Ok(())
}

pub(crate) fn decode_messages(
    rows: impl IntoIterator<Item = Row>,
) -> Result<Vec<Message>, BackendError> {
    rows.into_iter()
        .map(|row| Message::from_row(row).map_err(BackendError::from))
        .collect()
}
