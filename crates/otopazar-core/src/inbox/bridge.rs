use crate::models::Message;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeState {
    /// Subscribed, conversation list only
    Idle,
    /// Subscribed, with one thread on screen
    ThreadOpen { counterpart: String },
}

/// What the session must do in response to an inserted message
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeAction {
    AppendToThread(Message),
    MarkRead { sender: String },
    RefreshConversations,
}

/// Per-viewer dispatcher for message-insert events.
#[derive(Debug, Clone)]
pub struct RealtimeBridge {
    viewer: String,
    state: BridgeState,
}

impl RealtimeBridge {
    pub fn new(viewer: impl Into<String>) -> Self {
        Self {
            viewer: viewer.into(),
            state: BridgeState::Idle,
        }
    }

    pub fn viewer(&self) -> &str {
        &self.viewer
    }

    pub fn state(&self) -> &BridgeState {
        &self.state
    }

    pub fn open_counterpart(&self) -> Option<&str> {
        match &self.state {
            BridgeState::ThreadOpen { counterpart } => Some(counterpart),
            BridgeState::Idle => None,
        }
    }

    pub fn select(&mut self, counterpart: impl Into<String>) {
        self.state = BridgeState::ThreadOpen {
            counterpart: counterpart.into(),
        };
    }

    pub fn deselect(&mut self) {
        self.state = BridgeState::Idle;
    }

    /// Decide how an inserted message affects the open thread and the list.
    ///
    /// Events not involving the viewer produce nothing. A message for the open
    /// thread is appended, and marked read when the viewer is its recipient.
    /// Every relevant event refreshes the conversation list.
    pub fn on_insert(&self, message: &Message) -> Vec<BridgeAction> {
        if !message.involves_user(&self.viewer) {
            return Vec::new();
        }

        let mut actions = Vec::with_capacity(3);
        if let Some(counterpart) = self.open_counterpart() {
            if message.involves(&self.viewer, counterpart) {
                actions.push(BridgeAction::AppendToThread(message.clone()));
                if message.recipient_id == self.viewer {
                    actions.push(BridgeAction::MarkRead {
                        sender: counterpart.to_string(),
                    });
                }
            }
        }
        actions.push(BridgeAction::RefreshConversations);
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn msg(from: &str, to: &str) -> Message {
        Message {
            id: format!("{}-{}", from, to),
            sender_id: from.to_string(),
            recipient_id: to.to_string(),
            listing_id: "car-1".to_string(),
            body: "hi".to_string(),
            is_read: false,
            created_at: Utc::now(),
            listing: None,
        }
    }

    #[test]
    fn test_idle_only_refreshes() {
        let bridge = RealtimeBridge::new("alice");
        assert_eq!(
            bridge.on_insert(&msg("bob", "alice")),
            vec![BridgeAction::RefreshConversations]
        );
    }

    #[test]
    fn test_unrelated_event_is_ignored() {
        let mut bridge = RealtimeBridge::new("alice");
        bridge.select("bob");
        assert!(bridge.on_insert(&msg("bob", "carol")).is_empty());
    }

    #[test]
    fn test_incoming_message_for_open_thread() {
        let mut bridge = RealtimeBridge::new("alice");
        bridge.select("bob");
        let incoming = msg("bob", "alice");
        assert_eq!(
            bridge.on_insert(&incoming),
            vec![
                BridgeAction::AppendToThread(incoming),
                BridgeAction::MarkRead {
                    sender: "bob".to_string()
                },
                BridgeAction::RefreshConversations,
            ]
        );
    }

    #[test]
    fn test_own_message_for_open_thread_is_appended_not_marked() {
        let mut bridge = RealtimeBridge::new("alice");
        bridge.select("bob");
        let outgoing = msg("alice", "bob");
        assert_eq!(
            bridge.on_insert(&outgoing),
            vec![
                BridgeAction::AppendToThread(outgoing),
                BridgeAction::RefreshConversations,
            ]
        );
    }

    #[test]
    fn test_message_from_other_counterpart_only_refreshes() {
        let mut bridge = RealtimeBridge::new("alice");
        bridge.select("bob");
        assert_eq!(
            bridge.on_insert(&msg("carol", "alice")),
            vec![BridgeAction::RefreshConversations]
        );
    }

    #[test]
    fn test_select_and_deselect_transitions() {
        let mut bridge = RealtimeBridge::new("alice");
        assert_eq!(bridge.state(), &BridgeState::Idle);
        bridge.select("bob");
        assert_eq!(bridge.open_counterpart(), Some("bob"));
        bridge.deselect();
        assert_eq!(bridge.state(), &BridgeState::Idle);
    }
}
