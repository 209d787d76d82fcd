use serde_json::Value;
use tracing::{debug, warn};

use super::ensure_id;
use crate::backend::{DataService, Filter, Row};
use crate::constants::{message_columns, tables};
use crate::error::InboxError;

/// Flip every unread message from `sender` to `viewer` to read in one batch
/// update. Returns how many rows changed; running it again changes nothing.
pub async fn mark_thread_read(
    service: &dyn DataService,
    sender: &str,
    viewer: &str,
) -> Result<usize, InboxError> {
    ensure_id(sender, "sender id")?;
    ensure_id(viewer, "viewer id")?;

    let mut patch = Row::new();
    patch.insert(message_columns::IS_READ.to_string(), Value::Bool(true));
    let filters = [
        Filter::eq(message_columns::SENDER_ID, sender),
        Filter::eq(message_columns::RECIPIENT_ID, viewer),
        Filter::eq(message_columns::IS_READ, false),
    ];

    match service.update(tables::MESSAGES, patch, &filters).await {
        Ok(rows) => {
            debug!(sender, viewer, marked = rows.len(), "Marked messages read");
            Ok(rows.len())
        }
        Err(e) => {
            warn!(sender, viewer, error = %e, "Failed to mark messages read");
            Err(InboxError::write("read state")(e))
        }
    }
}
