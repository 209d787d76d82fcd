use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, FixedOffset, Utc};
use otopazar_core::format::{format_timestamp, truncate_preview};
use otopazar_core::inbox::{
    contact_seller, inbox_summary, load_thread, mark_thread_read, send_message, ComposeContext,
};
use otopazar_core::models::Conversation;
use otopazar_core::{CoreEvent, DataService, InboxError, InboxRuntime, InboxSession};
use serde_json::{json, Value};
use tracing::info;

use super::protocol::{CliCommand, Response};

const PREVIEW_CHARS: usize = 60;

/// Runs one-shot commands for a single viewer
pub struct CommandRunner {
    service: Arc<dyn DataService>,
    viewer: String,
    offset: FixedOffset,
}

impl CommandRunner {
    pub fn new(
        service: Arc<dyn DataService>,
        viewer: impl Into<String>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            service,
            viewer: viewer.into(),
            offset,
        }
    }

    /// Execute and wrap the outcome in the output envelope
    pub async fn run(&self, command: CliCommand) -> Response {
        match self.execute(command, Utc::now()).await {
            Ok(result) => Response::success(result),
            Err(e) => Response::from_inbox_error(&e),
        }
    }

    pub(crate) async fn execute(
        &self,
        command: CliCommand,
        now: DateTime<Utc>,
    ) -> Result<Value, InboxError> {
        let service = self.service.as_ref();
        match command {
            CliCommand::Conversations => {
                let mut session = InboxSession::new(self.service.clone(), &self.viewer);
                let conversations = session.refresh().await?;
                Ok(Value::Array(
                    conversations
                        .iter()
                        .map(|c| self.conversation_row(c, now))
                        .collect(),
                ))
            }
            CliCommand::Thread {
                counterpart,
                mark_read,
            } => {
                if !mark_read {
                    let thread = load_thread(service, &self.viewer, &counterpart).await?;
                    return Ok(to_json(&thread));
                }
                let mut session = InboxSession::new(self.service.clone(), &self.viewer);
                let events = session.open_thread(&counterpart).await?;
                let notices: Vec<Value> = events
                    .iter()
                    .filter(|e| matches!(e, CoreEvent::Notice { .. }))
                    .map(to_json)
                    .collect();
                let mut result = session.thread().map(to_json).unwrap_or(Value::Null);
                if let Value::Object(map) = &mut result {
                    if !notices.is_empty() {
                        map.insert("notices".to_string(), Value::Array(notices));
                    }
                }
                Ok(result)
            }
            CliCommand::Send {
                counterpart,
                body,
                listing_id,
            } => {
                let ctx = match listing_id {
                    Some(listing_id) => ComposeContext::new(&self.viewer, counterpart, listing_id),
                    None => {
                        let mut session = InboxSession::new(self.service.clone(), &self.viewer);
                        session.refresh().await?;
                        session.compose_context(&counterpart)?
                    }
                };
                let message = send_message(service, &ctx, &body).await?;
                Ok(to_json(&message))
            }
            CliCommand::Contact { listing_id, body } => {
                let message = contact_seller(service, &self.viewer, &listing_id, &body).await?;
                Ok(to_json(&message))
            }
            CliCommand::MarkRead { sender } => {
                let marked = mark_thread_read(service, &sender, &self.viewer).await?;
                Ok(json!({ "marked": marked }))
            }
            CliCommand::Summary => {
                let summary = inbox_summary(service, &self.viewer).await?;
                Ok(to_json(&summary))
            }
        }
    }

    fn conversation_row(&self, conversation: &Conversation, now: DateTime<Utc>) -> Value {
        let mut row = to_json(conversation);
        if let Value::Object(map) = &mut row {
            map.insert(
                "display_time".to_string(),
                Value::String(format_timestamp(conversation.last_message_at, now, self.offset)),
            );
            map.insert(
                "preview".to_string(),
                Value::String(truncate_preview(&conversation.last_message_body, PREVIEW_CHARS)),
            );
        }
        row
    }

    /// Stream runtime events as JSON lines until ctrl-c or the feed closes.
    pub async fn watch(&self, open: Option<String>, pretty: bool) -> Result<()> {
        let mut runtime = InboxRuntime::start(self.service.clone(), &self.viewer).await?;
        let handle = runtime.handle();
        if let Some(counterpart) = open {
            handle.open_thread(counterpart)?;
        }
        let Some(mut events) = runtime.take_event_rx() else {
            runtime.shutdown().await;
            return Ok(());
        };

        info!(viewer = %self.viewer, "Watching inbox, ctrl-c to stop");
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    super::print_json(&event, pretty)?;
                    if event == CoreEvent::FeedClosed {
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        runtime.shutdown().await;
        Ok(())
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
