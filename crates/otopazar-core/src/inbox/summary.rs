use super::ensure_id;
use crate::backend::{DataService, Filter};
use crate::constants::{message_columns, tables};
use crate::error::InboxError;
use crate::models::InboxSummary;

/// Unread and total message counts for the viewer's dashboard
pub async fn inbox_summary(
    service: &dyn DataService,
    viewer: &str,
) -> Result<InboxSummary, InboxError> {
    ensure_id(viewer, "viewer id")?;

    let total_filters = [Filter::or([
        Filter::eq(message_columns::SENDER_ID, viewer),
        Filter::eq(message_columns::RECIPIENT_ID, viewer),
    ])];
    let unread_filters = [
        Filter::eq(message_columns::RECIPIENT_ID, viewer),
        Filter::eq(message_columns::IS_READ, false),
    ];

    let (total, unread) = futures::try_join!(
        service.count(tables::MESSAGES, &total_filters),
        service.count(tables::MESSAGES, &unread_filters),
    )
    .map_err(InboxError::fetch("inbox summary"))?;

    Ok(InboxSummary { unread, total })
}
