use serde::Serialize;

use crate::inbox::ThreadView;
use crate::models::{Conversation, Message};

/// Notifications from the inbox runtime to a front end.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoreEvent {
    ConversationsUpdated {
        conversations: Vec<Conversation>,
        unread_total: u64,
    },
    ThreadLoaded(ThreadView),
    ThreadClosed,
    /// A feed message was placed into the open thread
    MessageAppended(Message),
    MessageSent(Message),
    /// The draft is kept by the caller
    SendFailed { code: String, message: String },
    /// Non-fatal failure; the previous view remains valid
    Notice { code: String, message: String },
    /// The change feed ended; no further realtime updates will arrive
    FeedClosed,
}

impl CoreEvent {
    pub(crate) fn notice(err: &crate::error::InboxError) -> Self {
        CoreEvent::Notice {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}
