use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{ChangeEvent, ChangeKind, DataService, Embed, Filter, Query, Row, Subscription};
use crate::error::BackendError;

fn take_pending(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

struct Subscriber {
    table: String,
    kind: ChangeKind,
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

#[derive(Default)]
struct MemoryInner {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    next_subscriber_id: AtomicU64,
    last_timestamp: Mutex<Option<DateTime<Utc>>>,
    pending_query_failures: AtomicU32,
    pending_write_failures: AtomicU32,
}

/// In-process data service.
///
/// Assigns ids and strictly increasing `created_at` values on insert, evaluates
/// filters, embeds related rows and fans change events out to subscribers.
#[derive(Clone, Default)]
pub struct MemoryDataService {
    inner: Arc<MemoryInner>,
}

impl MemoryDataService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a row as-is without emitting change events (profiles, listings).
    pub fn seed(&self, table: &str, row: Value) {
        match row {
            Value::Object(row) => {
                self.inner
                    .tables
                    .lock()
                    .entry(table.to_string())
                    .or_default()
                    .push(row);
            }
            other => warn!(table, row = %other, "Ignoring non-object seed row"),
        }
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.inner
            .tables
            .lock()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Make the next `query` or `count` call fail. Calls accumulate.
    pub fn fail_next_query(&self) {
        self.inner.pending_query_failures.fetch_add(1, Ordering::SeqCst);
    }

    /// Make the next `insert` or `update` call fail. Calls accumulate.
    pub fn fail_next_write(&self) {
        self.inner.pending_write_failures.fetch_add(1, Ordering::SeqCst);
    }

    fn take_query_failure(&self) -> Result<(), BackendError> {
        if take_pending(&self.inner.pending_query_failures) {
            return Err(BackendError::Injected("query".to_string()));
        }
        Ok(())
    }

    fn take_write_failure(&self) -> Result<(), BackendError> {
        if take_pending(&self.inner.pending_write_failures) {
            return Err(BackendError::Injected("write".to_string()));
        }
        Ok(())
    }

    /// Server clock: never returns the same instant twice and never goes backwards.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let mut last = self.inner.last_timestamp.lock();
        let now = Utc::now();
        let ts = match *last {
            Some(prev) if now <= prev => prev + Duration::microseconds(1),
            _ => now,
        };
        *last = Some(ts);
        ts
    }

    fn observe_timestamp(&self, value: Option<&Value>) {
        let Some(ts) = value
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
        else {
            return;
        };
        let mut last = self.inner.last_timestamp.lock();
        if last.map_or(true, |prev| ts > prev) {
            *last = Some(ts);
        }
    }

    fn notify(&self, table: &str, kind: ChangeKind, rows: &[Row]) {
        let mut subscribers = self.inner.subscribers.lock();
        subscribers.retain(|id, sub| {
            if sub.table != table || sub.kind != kind {
                return true;
            }
            let delivered = rows.iter().all(|row| {
                sub.tx
                    .send(ChangeEvent {
                        kind,
                        table: table.to_string(),
                        new_row: row.clone(),
                    })
                    .is_ok()
            });
            if !delivered {
                debug!(subscriber = id, "Dropping closed subscriber");
            }
            delivered
        });
    }
}

fn embed_related(tables: &HashMap<String, Vec<Row>>, embed: &Embed, row: &mut Row) -> bool {
    let related = row.get(&embed.local_key).and_then(|key| {
        tables
            .get(&embed.table)?
            .iter()
            .find(|candidate| candidate.get("id") == Some(key))
    });

    match related {
        Some(related) => {
            let projected: Row = embed
                .columns
                .iter()
                .filter_map(|c| related.get(c).map(|v| (c.clone(), v.clone())))
                .collect();
            row.insert(embed.table.clone(), Value::Object(projected));
            true
        }
        None if embed.inner => false,
        None => {
            row.insert(embed.table.clone(), Value::Null);
            true
        }
    }
}

#[async_trait]
impl DataService for MemoryDataService {
    async fn query(&self, query: &Query) -> Result<Vec<Row>, BackendError> {
        self.take_query_failure()?;

        let tables = self.inner.tables.lock();
        let mut rows: Vec<Row> = tables
            .get(&query.table)
            .map(|rows| rows.iter().filter(|r| query.matches(r)).cloned().collect())
            .unwrap_or_default();

        if let Some(embed) = &query.embed {
            rows.retain_mut(|row| embed_related(&tables, embed, row));
        }
        drop(tables);

        if let Some(order) = &query.order {
            order.sort(&mut rows);
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, mut row: Row) -> Result<Row, BackendError> {
        self.take_write_failure()?;

        if !row.contains_key("id") {
            row.insert(
                "id".to_string(),
                Value::String(uuid::Uuid::new_v4().to_string()),
            );
        }
        if row.contains_key("created_at") {
            self.observe_timestamp(row.get("created_at"));
        } else {
            let ts = self.next_timestamp();
            row.insert(
                "created_at".to_string(),
                Value::String(ts.to_rfc3339_opts(SecondsFormat::Micros, false)),
            );
        }

        self.inner
            .tables
            .lock()
            .entry(table.to_string())
            .or_default()
            .push(row.clone());

        self.notify(table, ChangeKind::Insert, std::slice::from_ref(&row));
        Ok(row)
    }

    async fn update(
        &self,
        table: &str,
        patch: Row,
        filters: &[Filter],
    ) -> Result<Vec<Row>, BackendError> {
        self.take_write_failure()?;

        let updated: Vec<Row> = {
            let mut tables = self.inner.tables.lock();
            let Some(rows) = tables.get_mut(table) else {
                return Ok(Vec::new());
            };
            rows.iter_mut()
                .filter(|row| filters.iter().all(|f| f.matches(row)))
                .map(|row| {
                    for (key, value) in &patch {
                        row.insert(key.clone(), value.clone());
                    }
                    row.clone()
                })
                .collect()
        };

        self.notify(table, ChangeKind::Update, &updated);
        Ok(updated)
    }

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64, BackendError> {
        self.take_query_failure()?;

        let tables = self.inner.tables.lock();
        let count = tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| filters.iter().all(|f| f.matches(row)))
                    .count()
            })
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn subscribe(&self, table: &str, kind: ChangeKind) -> Result<Subscription, BackendError> {
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.subscribers.lock().insert(
            id,
            Subscriber {
                table: table.to_string(),
                kind,
                tx,
            },
        );
        debug!(subscriber = id, table, ?kind, "Subscribed to change feed");

        let inner = self.inner.clone();
        Ok(Subscription::new(rx, move || {
            inner.subscribers.lock().remove(&id);
        }))
    }
}
