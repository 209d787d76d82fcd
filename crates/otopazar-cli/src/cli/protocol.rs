use otopazar_core::InboxError;
use serde::Serialize;

/// Envelope printed for every one-shot command
#[derive(Debug, Serialize)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl Response {
    pub fn success(result: serde_json::Value) -> Self {
        Self {
            result: Some(result),
            error: None,
        }
    }

    pub fn error(code: &str, message: &str) -> Self {
        Self {
            result: None,
            error: Some(ErrorInfo {
                code: code.to_string(),
                message: message.to_string(),
            }),
        }
    }

    pub fn from_inbox_error(err: &InboxError) -> Self {
        Self::error(err.code(), &err.to_string())
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// CLI command parsed from arguments
#[derive(Debug, Clone, PartialEq)]
pub enum CliCommand {
    /// Conversation list, newest first
    Conversations,
    /// Full thread with one counterpart; marks it read unless `mark_read` is false
    Thread { counterpart: String, mark_read: bool },
    /// Reply to a counterpart, about `listing_id` or the conversation's listing
    Send {
        counterpart: String,
        body: String,
        listing_id: Option<String>,
    },
    /// First message to a listing's seller
    Contact { listing_id: String, body: String },
    /// Mark everything from `sender` read
    MarkRead { sender: String },
    /// Unread and total counts
    Summary,
}
