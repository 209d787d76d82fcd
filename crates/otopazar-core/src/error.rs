/// Errors raised by a backend data service implementation.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Failed to decode row: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Backend returned no rows for {0}")]
    NoRows(String),
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    #[error("Injected failure: {0}")]
    Injected(String),
}

/// Errors surfaced by the inbox components.
///
/// None of these are fatal: a failed fetch leaves the previous state visible,
/// a failed write leaves the draft and unread state untouched.
#[derive(Debug, thiserror::Error)]
pub enum InboxError {
    #[error("Failed to fetch {context}: {source}")]
    DataFetch {
        context: &'static str,
        #[source]
        source: BackendError,
    },
    #[error("Failed to write {context}: {source}")]
    DataWrite {
        context: &'static str,
        #[source]
        source: BackendError,
    },
    #[error("Change feed unavailable: {0}")]
    Subscription(#[source] BackendError),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl InboxError {
    pub(crate) fn fetch(context: &'static str) -> impl FnOnce(BackendError) -> Self {
        move |source| InboxError::DataFetch { context, source }
    }

    pub(crate) fn write(context: &'static str) -> impl FnOnce(BackendError) -> Self {
        move |source| InboxError::DataWrite { context, source }
    }

    /// Short machine-readable code, used by the CLI and runtime notices
    pub fn code(&self) -> &'static str {
        match self {
            InboxError::DataFetch { .. } => "data_fetch",
            InboxError::DataWrite { .. } => "data_write",
            InboxError::Subscription(_) => "subscription",
            InboxError::InvalidInput(_) => "invalid_input",
        }
    }
}
