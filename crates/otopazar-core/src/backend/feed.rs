use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc;

use super::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
}

/// One row-level notification from the change feed
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub table: String,
    pub new_row: Row,
}

type Release = Box<dyn FnOnce() + Send>;

/// Handle to a live change-feed subscription.
///
/// The feed is released exactly once: either through [`Subscription::unsubscribe`]
/// or when the handle is dropped.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<ChangeEvent>,
    release: Option<Release>,
}

impl Subscription {
    pub fn new(
        rx: mpsc::UnboundedReceiver<ChangeEvent>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            rx,
            release: Some(Box::new(release)),
        }
    }

    /// Wait for the next event. `None` means the feed is gone.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if let Some(release) = self.release.take() {
            self.rx.close();
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("released", &self.release.is_none())
            .finish()
    }
}
