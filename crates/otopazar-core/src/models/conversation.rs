use chrono::{DateTime, Utc};
use serde::Serialize;

/// Derived summary of every message between the viewer and one counterpart.
///
/// Never persisted; rebuilt from the message set on each refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    pub counterpart_id: String,
    pub counterpart_name: String,
    pub counterpart_avatar: Option<String>,
    /// Listing referenced by the most recent message
    pub listing_id: String,
    pub listing_title: Option<String>,
    pub last_message_body: String,
    pub last_message_at: DateTime<Utc>,
    pub unread_count: u32,
}

/// Message counters shown on the account dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct InboxSummary {
    pub unread: u64,
    pub total: u64,
}
