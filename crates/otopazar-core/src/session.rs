use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::{ChangeEvent, ChangeKind, DataService};
use crate::constants::tables;
use crate::error::InboxError;
use crate::events::CoreEvent;
use crate::inbox::{
    load_conversations, load_thread, mark_thread_read, send_message, BridgeAction, BridgeState,
    ComposeContext, RealtimeBridge, ThreadView,
};
use crate::models::{Conversation, Message};
use crate::store::InboxStore;

/// One viewer's inbox: the components wired over a local store.
///
/// Every operation leaves the store unchanged when its backend call fails.
pub struct InboxSession {
    service: Arc<dyn DataService>,
    bridge: RealtimeBridge,
    store: InboxStore,
}

impl InboxSession {
    pub fn new(service: Arc<dyn DataService>, viewer: impl Into<String>) -> Self {
        Self {
            service,
            bridge: RealtimeBridge::new(viewer),
            store: InboxStore::new(),
        }
    }

    pub fn viewer(&self) -> &str {
        self.bridge.viewer()
    }

    pub fn store(&self) -> &InboxStore {
        &self.store
    }

    pub fn bridge(&self) -> &RealtimeBridge {
        &self.bridge
    }

    pub fn service(&self) -> &Arc<dyn DataService> {
        &self.service
    }

    pub async fn refresh(&mut self) -> Result<&[Conversation], InboxError> {
        let conversations = load_conversations(self.service.as_ref(), self.bridge.viewer()).await?;
        self.store.replace_conversations(conversations);
        Ok(self.store.conversations())
    }

    /// Load the thread with `counterpart`, mark it read, then refresh the list.
    ///
    /// Only a failed load is an error; a failed mark or refresh is reported
    /// as a notice with the thread still open.
    pub async fn open_thread(&mut self, counterpart: &str) -> Result<Vec<CoreEvent>, InboxError> {
        let previous = self.bridge.state().clone();
        self.bridge.select(counterpart);

        let thread = match load_thread(self.service.as_ref(), self.bridge.viewer(), counterpart)
            .await
        {
            Ok(thread) => thread,
            Err(e) => {
                match previous {
                    BridgeState::Idle => self.bridge.deselect(),
                    BridgeState::ThreadOpen { counterpart } => self.bridge.select(counterpart),
                }
                return Err(e);
            }
        };

        self.store.set_thread(thread.clone());
        let mut events = vec![CoreEvent::ThreadLoaded(thread)];
        if let Err(e) = self.mark_read(counterpart).await {
            events.push(CoreEvent::notice(&e));
        }
        events.push(self.refresh_event().await);
        Ok(events)
    }

    pub fn close_thread(&mut self) {
        self.bridge.deselect();
        self.store.clear_thread();
    }

    pub fn thread(&self) -> Option<&ThreadView> {
        self.store.thread()
    }

    /// Mark `sender`'s messages to the viewer read, remotely then locally
    pub async fn mark_read(&mut self, sender: &str) -> Result<usize, InboxError> {
        let viewer = self.bridge.viewer().to_string();
        let marked = mark_thread_read(self.service.as_ref(), sender, &viewer).await?;
        self.store.mark_thread_read_locally(&viewer, sender);
        Ok(marked)
    }

    /// Reply context for `counterpart`: the listing of the conversation's
    /// latest message, or of the open thread's last message.
    pub fn compose_context(&self, counterpart: &str) -> Result<ComposeContext, InboxError> {
        let viewer = self.bridge.viewer();
        if let Some(conversation) = self.store.conversation(counterpart) {
            return Ok(ComposeContext::from_conversation(viewer, conversation));
        }
        if self.store.open_counterpart() == Some(counterpart) {
            if let Some(last) = self.store.last_thread_message() {
                return Ok(ComposeContext::new(viewer, counterpart, last.listing_id.clone()));
            }
        }
        Err(InboxError::InvalidInput(format!(
            "no listing context for a message to {}",
            counterpart
        )))
    }

    /// Send `body` into the open thread.
    ///
    /// The store is not touched here; the feed event appends the message.
    pub async fn send(&self, body: &str) -> Result<Message, InboxError> {
        let counterpart = self
            .bridge
            .open_counterpart()
            .ok_or_else(|| InboxError::InvalidInput("no conversation is open".to_string()))?;
        let ctx = self.compose_context(counterpart)?;
        send_message(self.service.as_ref(), &ctx, body).await
    }

    /// Dispatch one change-feed event and report what changed.
    pub async fn handle_change(&mut self, event: &ChangeEvent) -> Vec<CoreEvent> {
        if event.kind != ChangeKind::Insert || event.table != tables::MESSAGES {
            return Vec::new();
        }
        let message = match Message::from_row(event.new_row.clone()) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Skipping undecodable feed row");
                return Vec::new();
            }
        };

        let actions = self.bridge.on_insert(&message);
        debug!(id = %message.id, actions = actions.len(), "Feed insert");

        let mut events = Vec::new();
        for action in actions {
            match action {
                BridgeAction::AppendToThread(message) => {
                    if self.store.append_message(message.clone()) {
                        events.push(CoreEvent::MessageAppended(message));
                    }
                }
                BridgeAction::MarkRead { sender } => {
                    if let Err(e) = self.mark_read(&sender).await {
                        events.push(CoreEvent::notice(&e));
                    }
                }
                BridgeAction::RefreshConversations => events.push(self.refresh_event().await),
            }
        }
        events
    }

    /// Refresh, reporting either the new list or why it is stale
    pub async fn refresh_event(&mut self) -> CoreEvent {
        match self.refresh().await {
            Ok(_) => self.conversations_event(),
            Err(e) => {
                warn!(viewer = self.bridge.viewer(), error = %e, "Conversation refresh failed");
                CoreEvent::notice(&e)
            }
        }
    }

    pub fn conversations_event(&self) -> CoreEvent {
        CoreEvent::ConversationsUpdated {
            conversations: self.store.conversations().to_vec(),
            unread_total: self.store.unread_total(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryDataService;
    use serde_json::json;

    fn seeded() -> MemoryDataService {
        let service = MemoryDataService::new();
        service.seed("arabalar", json!({"id": "car-1", "baslik": "Golf", "kullanici_id": "bob"}));
        service.seed("profiller", json!({"id": "bob", "ad_soyad": "Bob"}));
        service.seed("profiller", json!({"id": "alice", "ad_soyad": "Alice"}));
        for (id, from, to, ts) in [
            ("m1", "alice", "bob", "2024-03-01T10:00:00Z"),
            ("m2", "bob", "alice", "2024-03-01T10:05:00Z"),
        ] {
            service.seed(
                "mesajlar",
                json!({
                    "id": id, "gonderen_id": from, "alici_id": to, "arac_id": "car-1",
                    "icerik": id, "okundu": false, "created_at": ts
                }),
            );
        }
        service
    }

    fn session(service: &MemoryDataService, viewer: &str) -> InboxSession {
        InboxSession::new(Arc::new(service.clone()), viewer)
    }

    #[tokio::test]
    async fn test_open_thread_marks_read_and_refreshes() {
        let service = seeded();
        let mut session = session(&service, "alice");
        session.refresh().await.unwrap();
        assert_eq!(session.store().unread_total(), 1);

        let events = session.open_thread("bob").await.unwrap();
        assert!(matches!(events[0], CoreEvent::ThreadLoaded(_)));
        assert!(matches!(
            events.last(),
            Some(CoreEvent::ConversationsUpdated { unread_total: 0, .. })
        ));
        assert_eq!(session.thread().unwrap().messages.len(), 2);
        assert_eq!(session.bridge().open_counterpart(), Some("bob"));
    }

    #[tokio::test]
    async fn test_failed_open_keeps_previous_state() {
        let service = seeded();
        let mut session = session(&service, "alice");
        session.open_thread("bob").await.unwrap();

        // Profile lookup degrades, so the failure lands on the message query
        service.fail_next_query();
        service.fail_next_query();
        let err = session.open_thread("carol").await.unwrap_err();
        assert_eq!(err.code(), "data_fetch");
        assert_eq!(session.bridge().open_counterpart(), Some("bob"));
        assert_eq!(session.store().open_counterpart(), Some("bob"));
    }

    #[tokio::test]
    async fn test_send_requires_open_thread() {
        let service = seeded();
        let session = session(&service, "alice");
        let err = session.send("hi").await.unwrap_err();
        assert!(matches!(err, InboxError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_sent_message_arrives_through_feed() {
        let service = seeded();
        let mut feed = service.subscribe("mesajlar", ChangeKind::Insert).await.unwrap();
        let mut session = session(&service, "alice");
        session.open_thread("bob").await.unwrap();

        let sent = session.send("Yarın görebilir miyim?").await.unwrap();
        assert_eq!(sent.listing_id, "car-1");
        // Not applied until the event is handled
        assert_eq!(session.thread().unwrap().messages.len(), 2);

        let event = feed.next().await.unwrap();
        let events = session.handle_change(&event).await;
        assert_eq!(events[0], CoreEvent::MessageAppended(sent.clone()));
        assert_eq!(session.thread().unwrap().messages.last(), Some(&sent));

        // Replayed event is ignored by the store
        let again = session.handle_change(&event).await;
        assert!(!again.iter().any(|e| matches!(e, CoreEvent::MessageAppended(_))));
    }

    #[tokio::test]
    async fn test_incoming_message_in_open_thread_is_marked_read() {
        let service = seeded();
        let mut feed = service.subscribe("mesajlar", ChangeKind::Insert).await.unwrap();
        let mut alice = session(&service, "alice");
        alice.open_thread("bob").await.unwrap();

        let bob = session(&service, "bob");
        send_message(
            bob.service().as_ref(),
            &ComposeContext::new("bob", "alice", "car-1"),
            "Evet, hala satılık",
        )
        .await
        .unwrap();

        let event = feed.next().await.unwrap();
        alice.handle_change(&event).await;
        let last = alice.thread().unwrap().messages.last().unwrap();
        assert!(last.is_read);
        assert_eq!(alice.store().unread_total(), 0);
        assert!(service.rows("mesajlar").iter().all(|r| r["alici_id"] != json!("alice")
            || r["okundu"] == json!(true)));
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_list() {
        let service = seeded();
        let mut session = session(&service, "alice");
        session.refresh().await.unwrap();

        service.fail_next_query();
        let event = session.refresh_event().await;
        assert!(matches!(event, CoreEvent::Notice { .. }));
        assert_eq!(session.store().conversations().len(), 1);
    }

    #[tokio::test]
    async fn test_close_thread() {
        let service = seeded();
        let mut session = session(&service, "alice");
        session.open_thread("bob").await.unwrap();
        session.close_thread();
        assert!(session.thread().is_none());
        assert_eq!(session.bridge().state(), &BridgeState::Idle);
    }
}
