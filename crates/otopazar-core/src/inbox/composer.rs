use serde_json::Value;
use tracing::{debug, warn};

use super::ensure_id;
use crate::backend::{DataService, Filter, Query};
use crate::constants::{listing_columns, tables};
use crate::error::{BackendError, InboxError};
use crate::models::{Conversation, Listing, Message, NewMessage};

/// Who a new message goes to and which listing it is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeContext {
    pub sender_id: String,
    pub recipient_id: String,
    pub listing_id: String,
}

impl ComposeContext {
    pub fn new(
        sender_id: impl Into<String>,
        recipient_id: impl Into<String>,
        listing_id: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            recipient_id: recipient_id.into(),
            listing_id: listing_id.into(),
        }
    }

    /// Reply within an existing conversation, about its latest listing
    pub fn from_conversation(viewer: &str, conversation: &Conversation) -> Self {
        Self::new(
            viewer,
            conversation.counterpart_id.clone(),
            conversation.listing_id.clone(),
        )
    }
}

/// Insert one unread message.
///
/// The returned row is informational: local views pick the message up from
/// the change feed, not from this result. On error nothing was written and
/// the caller still holds `body`.
pub async fn send_message(
    service: &dyn DataService,
    ctx: &ComposeContext,
    body: &str,
) -> Result<Message, InboxError> {
    if body.trim().is_empty() {
        return Err(InboxError::InvalidInput(
            "message body must not be empty".to_string(),
        ));
    }
    ensure_id(&ctx.sender_id, "sender id")?;
    ensure_id(&ctx.recipient_id, "recipient id")?;
    ensure_id(&ctx.listing_id, "listing id")?;
    if ctx.sender_id == ctx.recipient_id {
        return Err(InboxError::InvalidInput(
            "cannot send a message to yourself".to_string(),
        ));
    }

    let new_message = NewMessage {
        sender_id: ctx.sender_id.clone(),
        recipient_id: ctx.recipient_id.clone(),
        listing_id: ctx.listing_id.clone(),
        body: body.to_string(),
    };

    let row = service
        .insert(tables::MESSAGES, new_message.to_row())
        .await
        .map_err(|e| {
            warn!(
                sender = %ctx.sender_id,
                recipient = %ctx.recipient_id,
                error = %e,
                "Failed to send message"
            );
            InboxError::write("message")(e)
        })?;

    let message =
        Message::from_row(row).map_err(|e| InboxError::write("message")(BackendError::from(e)))?;
    debug!(id = %message.id, recipient = %message.recipient_id, "Message sent");
    Ok(message)
}

/// First contact from a listing page: message the listing's seller.
pub async fn contact_seller(
    service: &dyn DataService,
    sender: &str,
    listing_id: &str,
    body: &str,
) -> Result<Message, InboxError> {
    ensure_id(listing_id, "listing id")?;

    let query = Query::table(tables::LISTINGS)
        .filter(Filter::eq(listing_columns::ID, listing_id))
        .limit(1);
    let row = service
        .query(&query)
        .await
        .map_err(InboxError::fetch("listing"))?
        .into_iter()
        .next()
        .ok_or_else(|| InboxError::InvalidInput(format!("listing {} not found", listing_id)))?;
    let listing: Listing = serde_json::from_value(Value::Object(row))
        .map_err(|e| InboxError::fetch("listing")(BackendError::from(e)))?;

    if listing.owner_id == sender {
        return Err(InboxError::InvalidInput(
            "cannot message the seller of your own listing".to_string(),
        ));
    }

    let ctx = ComposeContext::new(sender, listing.owner_id, listing.id);
    send_message(service, &ctx, body).await
}
