use crate::inbox::ThreadView;
use crate::models::{Conversation, Message};

/// Local view state: the conversation list and at most one open thread.
#[derive(Debug, Default)]
pub struct InboxStore {
    conversations: Vec<Conversation>,
    thread: Option<ThreadView>,
}

impl InboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Getters =====

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn conversation(&self, counterpart: &str) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|c| c.counterpart_id == counterpart)
    }

    pub fn thread(&self) -> Option<&ThreadView> {
        self.thread.as_ref()
    }

    pub fn open_counterpart(&self) -> Option<&str> {
        self.thread.as_ref().map(|t| t.counterpart.id.as_str())
    }

    pub fn unread_total(&self) -> u64 {
        self.conversations
            .iter()
            .map(|c| u64::from(c.unread_count))
            .sum()
    }

    // ===== Mutations =====

    pub fn replace_conversations(&mut self, conversations: Vec<Conversation>) {
        self.conversations = conversations;
    }

    pub fn set_thread(&mut self, thread: ThreadView) {
        self.thread = Some(thread);
    }

    pub fn clear_thread(&mut self) {
        self.thread = None;
    }

    /// Insert into the open thread at its `(created_at, id)` position.
    ///
    /// Returns false when no thread is open or the id is already present.
    pub fn append_message(&mut self, message: Message) -> bool {
        let Some(thread) = self.thread.as_mut() else {
            return false;
        };
        if thread.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        let pos = thread
            .messages
            .partition_point(|m| m.order_key() <= message.order_key());
        thread.messages.insert(pos, message);
        true
    }

    /// Reflect a successful mark-read of `sender`'s messages without refetching
    pub fn mark_thread_read_locally(&mut self, viewer: &str, sender: &str) {
        if let Some(thread) = self.thread.as_mut() {
            for message in thread
                .messages
                .iter_mut()
                .filter(|m| m.sender_id == sender && m.recipient_id == viewer)
            {
                message.is_read = true;
            }
        }
        if let Some(conversation) = self
            .conversations
            .iter_mut()
            .find(|c| c.counterpart_id == sender)
        {
            conversation.unread_count = 0;
        }
    }

    /// Newest message of the open thread, for reply context
    pub fn last_thread_message(&self) -> Option<&Message> {
        self.thread.as_ref().and_then(|t| t.messages.last())
    }
}
