use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::{decode_messages, ensure_id, ProfileCache};
use crate::backend::{DataService, Embed, Filter, Order, Query};
use crate::constants::{listing_columns, message_columns, tables, DEFAULT_DISPLAY_NAME};
use crate::error::InboxError;
use crate::models::{Conversation, Message, Profile};

/// Messages joined with their listing title
fn messages_with_listing() -> Query {
    Query::table(tables::MESSAGES)
        .embed(Embed::inner(
            tables::LISTINGS,
            message_columns::LISTING_ID,
            &[listing_columns::TITLE],
        ))
        .order(Order::desc(message_columns::CREATED_AT))
}

/// Build the viewer's conversation list, newest activity first.
///
/// Sent and received messages are fetched concurrently; each distinct
/// counterpart's profile is looked up once per call.
pub async fn load_conversations(
    service: &dyn DataService,
    viewer: &str,
) -> Result<Vec<Conversation>, InboxError> {
    ensure_id(viewer, "viewer id")?;

    let sent = messages_with_listing().filter(Filter::eq(message_columns::SENDER_ID, viewer));
    let received =
        messages_with_listing().filter(Filter::eq(message_columns::RECIPIENT_ID, viewer));

    let (sent, received) = futures::try_join!(service.query(&sent), service.query(&received))
        .map_err(InboxError::fetch("conversations"))?;

    // A message to oneself shows up in both result sets
    let mut seen = HashSet::new();
    let messages: Vec<Message> = decode_messages(sent.into_iter().chain(received))
        .map_err(InboxError::fetch("conversations"))?
        .into_iter()
        .filter(|m| seen.insert(m.id.clone()))
        .collect();

    let mut profiles = ProfileCache::new();
    for message in &messages {
        profiles.resolve(service, message.counterpart(viewer)).await;
    }

    let conversations = aggregate_conversations(viewer, &messages, profiles.as_map());
    debug!(
        viewer,
        messages = messages.len(),
        conversations = conversations.len(),
        "Aggregated conversations"
    );
    Ok(conversations)
}

struct Group<'a> {
    preview: &'a Message,
    unread: u32,
}

/// Group messages by counterpart and summarize each group.
///
/// The preview is the message with the greatest `(created_at, id)`, so equal
/// timestamps resolve the same way regardless of input order. Messages that do
/// not involve `viewer` are ignored.
pub fn aggregate_conversations(
    viewer: &str,
    messages: &[Message],
    profiles: &HashMap<String, Profile>,
) -> Vec<Conversation> {
    let mut groups: HashMap<&str, Group<'_>> = HashMap::new();

    for message in messages.iter().filter(|m| m.involves_user(viewer)) {
        let unread = u32::from(message.is_unread_for(viewer));
        groups
            .entry(message.counterpart(viewer))
            .and_modify(|group| {
                if message.order_key() > group.preview.order_key() {
                    group.preview = message;
                }
                group.unread += unread;
            })
            .or_insert(Group {
                preview: message,
                unread,
            });
    }

    let mut conversations: Vec<Conversation> = groups
        .into_iter()
        .map(|(counterpart, group)| {
            let profile = profiles.get(counterpart);
            Conversation {
                counterpart_id: counterpart.to_string(),
                counterpart_name: profile
                    .map(Profile::display_name_or_default)
                    .unwrap_or(DEFAULT_DISPLAY_NAME)
                    .to_string(),
                counterpart_avatar: profile.and_then(|p| p.avatar_url.clone()),
                listing_id: group.preview.listing_id.clone(),
                listing_title: group.preview.listing_title().map(str::to_string),
                last_message_body: group.preview.body.clone(),
                last_message_at: group.preview.created_at,
                unread_count: group.unread,
            }
        })
        .collect();

    conversations.sort_by(|a, b| {
        b.last_message_at
            .cmp(&a.last_message_at)
            .then_with(|| a.counterpart_id.cmp(&b.counterpart_id))
    });
    conversations
}
