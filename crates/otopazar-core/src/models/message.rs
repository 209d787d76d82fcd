use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::listing::ListingRef;
use crate::backend::Row;
use crate::constants::message_columns;

/// A row of the messages table.
///
/// Immutable once written except for `is_read`, which only moves from
/// `false` to `true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "gonderen_id")]
    pub sender_id: String,
    #[serde(rename = "alici_id")]
    pub recipient_id: String,
    #[serde(rename = "arac_id")]
    pub listing_id: String,
    #[serde(rename = "icerik")]
    pub body: String,
    #[serde(rename = "okundu", default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    /// Embedded listing, present only when the query joined the listings table
    #[serde(rename = "arabalar", default, skip_serializing_if = "Option::is_none")]
    pub listing: Option<ListingRef>,
}

impl Message {
    pub fn from_row(row: Row) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(row))
    }

    /// The other participant, seen from `viewer`
    pub fn counterpart(&self, viewer: &str) -> &str {
        if self.sender_id == viewer {
            &self.recipient_id
        } else {
            &self.sender_id
        }
    }

    /// True when this message was exchanged between exactly `a` and `b`
    pub fn involves(&self, a: &str, b: &str) -> bool {
        (self.sender_id == a && self.recipient_id == b)
            || (self.sender_id == b && self.recipient_id == a)
    }

    pub fn involves_user(&self, user_id: &str) -> bool {
        self.sender_id == user_id || self.recipient_id == user_id
    }

    pub fn is_unread_for(&self, viewer: &str) -> bool {
        self.recipient_id == viewer && !self.is_read
    }

    pub fn listing_title(&self) -> Option<&str> {
        self.listing.as_ref().map(|l| l.title.as_str())
    }

    /// Total order used for threads and previews: timestamp, then id.
    pub fn order_key(&self) -> (DateTime<Utc>, &str) {
        (self.created_at, self.id.as_str())
    }
}

/// Insert payload produced by the composer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewMessage {
    #[serde(rename = "gonderen_id")]
    pub sender_id: String,
    #[serde(rename = "alici_id")]
    pub recipient_id: String,
    #[serde(rename = "arac_id")]
    pub listing_id: String,
    #[serde(rename = "icerik")]
    pub body: String,
}

impl NewMessage {
    /// Row to insert; new messages always start unread
    pub fn to_row(&self) -> Row {
        let mut row = match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => Row::new(),
        };
        row.insert(
            message_columns::IS_READ.to_string(),
            serde_json::Value::Bool(false),
        );
        row
    }
}
