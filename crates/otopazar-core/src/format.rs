use chrono::{DateTime, FixedOffset, Utc};

/// Conversation-list timestamp: `HH:MM` when `ts` falls on the same local day
/// as `now`, `DD.MM` otherwise.
pub fn format_timestamp(ts: DateTime<Utc>, now: DateTime<Utc>, offset: FixedOffset) -> String {
    let local = ts.with_timezone(&offset);
    if local.date_naive() == now.with_timezone(&offset).date_naive() {
        local.format("%H:%M").to_string()
    } else {
        local.format("%d.%m").to_string()
    }
}

/// Shorten a message body for list previews, on a character boundary
pub fn truncate_preview(body: &str, max_chars: usize) -> String {
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head.trim_end())
    } else {
        head
    }
}
