use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{ChangeEvent, ChangeKind, DataService, Subscription};
use crate::constants::tables;
use crate::error::InboxError;
use crate::events::CoreEvent;
use crate::session::InboxSession;

/// Requests accepted by the inbox task.
#[derive(Debug)]
pub enum InboxCommand {
    Refresh,
    OpenThread {
        counterpart: String,
    },
    CloseThread,
    /// Send into the open thread. Replies with the new message id, or the
    /// error text so the caller can keep its draft.
    Send {
        body: String,
        response_tx: Option<oneshot::Sender<Result<String, String>>>,
    },
    MarkRead {
        sender: String,
    },
    Shutdown,
}

#[derive(Clone)]
pub struct InboxHandle {
    command_tx: mpsc::UnboundedSender<InboxCommand>,
}

impl InboxHandle {
    pub(crate) fn new(command_tx: mpsc::UnboundedSender<InboxCommand>) -> Self {
        Self { command_tx }
    }

    pub fn send(&self, command: InboxCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| anyhow::anyhow!("Inbox runtime is not running"))
    }

    pub fn refresh(&self) -> Result<()> {
        self.send(InboxCommand::Refresh)
    }

    pub fn open_thread(&self, counterpart: impl Into<String>) -> Result<()> {
        self.send(InboxCommand::OpenThread {
            counterpart: counterpart.into(),
        })
    }

    pub fn close_thread(&self) -> Result<()> {
        self.send(InboxCommand::CloseThread)
    }

    pub fn mark_read(&self, sender: impl Into<String>) -> Result<()> {
        self.send(InboxCommand::MarkRead {
            sender: sender.into(),
        })
    }

    /// Send a message into the open thread and wait for the write result
    pub async fn send_message(&self, body: impl Into<String>) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        self.send(InboxCommand::Send {
            body: body.into(),
            response_tx: Some(tx),
        })?;
        rx.await?.map_err(anyhow::Error::msg)
    }
}

/// Owns the inbox task: one session, its change-feed subscription and the
/// command loop that serializes everything touching the session.
pub struct InboxRuntime {
    handle: InboxHandle,
    event_rx: Option<mpsc::UnboundedReceiver<CoreEvent>>,
    task: Option<JoinHandle<()>>,
}

impl InboxRuntime {
    /// Subscribe to message inserts and start the inbox task.
    ///
    /// An initial refresh is queued, so the first event is the conversation
    /// list (or a notice explaining why it is missing).
    pub async fn start(
        service: Arc<dyn DataService>,
        viewer: impl Into<String>,
    ) -> Result<Self, InboxError> {
        let viewer = viewer.into();
        crate::inbox::ensure_id(&viewer, "viewer id")?;

        let subscription = service
            .subscribe(tables::MESSAGES, ChangeKind::Insert)
            .await
            .map_err(InboxError::Subscription)?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let handle = InboxHandle::new(command_tx);
        let _ = handle.refresh();

        info!(viewer = %viewer, "Starting inbox runtime");
        let session = InboxSession::new(service, viewer);
        let task = tokio::spawn(run_loop(session, subscription, command_rx, event_tx));

        Ok(Self {
            handle,
            event_rx: Some(event_rx),
            task: Some(task),
        })
    }

    pub fn handle(&self) -> InboxHandle {
        self.handle.clone()
    }

    pub fn take_event_rx(&mut self) -> Option<mpsc::UnboundedReceiver<CoreEvent>> {
        self.event_rx.take()
    }

    /// Stop the task and wait for it; the feed subscription is released on exit
    pub async fn shutdown(&mut self) {
        let _ = self.handle.send(InboxCommand::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Inbox task ended abnormally");
            }
        }
    }
}

async fn next_change(feed: &mut Option<Subscription>) -> Option<ChangeEvent> {
    match feed {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}

async fn run_loop(
    mut session: InboxSession,
    subscription: Subscription,
    mut command_rx: mpsc::UnboundedReceiver<InboxCommand>,
    event_tx: mpsc::UnboundedSender<CoreEvent>,
) {
    let mut feed = Some(subscription);
    let emit = |events: Vec<CoreEvent>| {
        for event in events {
            let _ = event_tx.send(event);
        }
    };

    loop {
        tokio::select! {
            command = command_rx.recv() => {
                let Some(command) = command else { break };
                debug!(?command, "Inbox command");
                match command {
                    InboxCommand::Refresh => emit(vec![session.refresh_event().await]),
                    InboxCommand::OpenThread { counterpart } => {
                        match session.open_thread(&counterpart).await {
                            Ok(events) => emit(events),
                            Err(e) => emit(vec![CoreEvent::notice(&e)]),
                        }
                    }
                    InboxCommand::CloseThread => {
                        session.close_thread();
                        emit(vec![CoreEvent::ThreadClosed]);
                    }
                    InboxCommand::Send { body, response_tx } => {
                        let result = session.send(&body).await;
                        let reply = match &result {
                            Ok(message) => Ok(message.id.clone()),
                            Err(e) => Err(e.to_string()),
                        };
                        match result {
                            Ok(message) => emit(vec![CoreEvent::MessageSent(message)]),
                            Err(e) => emit(vec![CoreEvent::SendFailed {
                                code: e.code().to_string(),
                                message: e.to_string(),
                            }]),
                        }
                        if let Some(tx) = response_tx {
                            let _ = tx.send(reply);
                        }
                    }
                    InboxCommand::MarkRead { sender } => {
                        match session.mark_read(&sender).await {
                            Ok(_) => emit(vec![session.refresh_event().await]),
                            Err(e) => emit(vec![CoreEvent::notice(&e)]),
                        }
                    }
                    InboxCommand::Shutdown => break,
                }
            }
            change = next_change(&mut feed) => {
                match change {
                    Some(change) => emit(session.handle_change(&change).await),
                    None => {
                        warn!("Change feed closed");
                        feed = None;
                        emit(vec![CoreEvent::FeedClosed]);
                    }
                }
            }
        }
    }

    if let Some(subscription) = feed.take() {
        subscription.unsubscribe();
    }
    info!(viewer = session.viewer(), "Inbox runtime stopped");
}
