use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{ChangeEvent, ChangeKind, DataService, Filter, Order, Query, Row, Subscription};
use crate::config::CoreConfig;
use crate::constants::{message_columns, FEED_BATCH_LIMIT};
use crate::error::BackendError;

/// Client for the hosted backend's REST interface (`/rest/v1/<table>`).
///
/// The change feed is served by polling for rows newer than the last one seen.
#[derive(Debug, Clone)]
pub struct RestDataService {
    base_url: String,
    api_key: String,
    access_token: Option<String>,
    poll_interval: Duration,
    client: reqwest::Client,
}

impl RestDataService {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            access_token: None,
            poll_interval: Duration::from_millis(crate::constants::DEFAULT_POLL_INTERVAL_MS),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        let mut service = Self::new(&config.backend_url, &config.api_key)
            .with_poll_interval(Duration::from_millis(config.poll_interval_ms));
        service.access_token = config.access_token.clone();
        service
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url.trim_end_matches('/'), table)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let token = self.access_token.as_deref().unwrap_or(&self.api_key);
        builder
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", token))
    }

    /// Query-string pairs for a read, in the backend's filter grammar
    pub fn query_params(query: &Query) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), query.select_clause())];
        params.extend(query.filters.iter().map(Filter::to_query_pair));
        if let Some(order) = &query.order {
            params.push(("order".to_string(), order.to_query_value()));
        }
        if let Some(limit) = query.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, body });
        }
        Ok(response)
    }
}

/// Total from a `Content-Range` header such as `0-24/3573` or `*/0`
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

#[async_trait]
impl DataService for RestDataService {
    async fn query(&self, query: &Query) -> Result<Vec<Row>, BackendError> {
        let response = self
            .authorized(self.client.get(self.table_url(&query.table)))
            .query(&Self::query_params(query))
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, BackendError> {
        let response = self
            .authorized(self.client.post(self.table_url(table)))
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?;
        let response = Self::check(response).await?;
        let rows: Vec<Row> = response.json().await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::NoRows(format!("insert into {}", table)))
    }

    async fn update(
        &self,
        table: &str,
        patch: Row,
        filters: &[Filter],
    ) -> Result<Vec<Row>, BackendError> {
        let params: Vec<(String, String)> = filters.iter().map(Filter::to_query_pair).collect();
        let response = self
            .authorized(self.client.patch(self.table_url(table)))
            .header("Prefer", "return=representation")
            .query(&params)
            .json(&patch)
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64, BackendError> {
        let mut params = vec![("select".to_string(), "id".to_string())];
        params.extend(filters.iter().map(Filter::to_query_pair));
        let response = self
            .authorized(self.client.head(self.table_url(table)))
            .header("Prefer", "count=exact")
            .query(&params)
            .send()
            .await?;
        let response = Self::check(response).await?;
        response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or_else(|| BackendError::NoRows(format!("count of {}", table)))
    }

    async fn subscribe(&self, table: &str, kind: ChangeKind) -> Result<Subscription, BackendError> {
        if kind != ChangeKind::Insert {
            return Err(BackendError::Unsupported(format!(
                "{:?} feed over REST polling",
                kind
            )));
        }

        let window = FeedWindow::at_latest(self, table).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(poll_inserts(self.clone(), table.to_string(), window, tx));
        debug!(table, interval_ms = self.poll_interval.as_millis() as u64, "Polling change feed");
        Ok(Subscription::new(rx, move || task.abort()))
    }
}

/// Read position of a polled insert feed, kept in the server's clock.
///
/// Rows are consumed in `(created_at, id)` order. The poll window is
/// `created_at >= last_seen`, so ids already emitted at exactly `last_seen`
/// are remembered and skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct FeedWindow {
    last_seen: Option<DateTime<Utc>>,
    seen_at_boundary: HashSet<String>,
}

impl FeedWindow {
    /// Start after the newest existing row, so only later inserts are emitted.
    /// An empty table starts unbounded.
    pub(crate) async fn at_latest(
        service: &dyn DataService,
        table: &str,
    ) -> Result<Self, BackendError> {
        let query = Query::table(table)
            .order(Order::desc(message_columns::CREATED_AT))
            .limit(1);
        let newest = service.query(&query).await?;
        let mut window = Self::default();
        window.advance(newest);
        Ok(window)
    }

    /// Next poll. The limit grows with the boundary set so a batch of rows
    /// sharing one timestamp can never fill the window with seen rows only.
    pub(crate) fn query(&self, table: &str) -> Query {
        let mut query = Query::table(table)
            .order(Order::asc(message_columns::CREATED_AT))
            .limit(FEED_BATCH_LIMIT + self.seen_at_boundary.len());
        if let Some(last_seen) = self.last_seen {
            query = query.filter(Filter::gte(
                message_columns::CREATED_AT,
                last_seen.to_rfc3339_opts(SecondsFormat::Micros, false),
            ));
        }
        query
    }

    /// Consume one poll result. Returns the rows not emitted before, oldest first.
    pub(crate) fn advance(&mut self, rows: Vec<Row>) -> Vec<Row> {
        let mut keyed: Vec<(DateTime<Utc>, String, Row)> = rows
            .into_iter()
            .filter_map(|row| match row_created_at(&row) {
                Some(ts) => Some((ts, row_id(&row), row)),
                None => {
                    warn!("Skipping feed row without created_at");
                    None
                }
            })
            .collect();
        keyed.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));

        let mut fresh = Vec::new();
        for (ts, id, row) in keyed {
            match self.last_seen {
                Some(last_seen) if ts < last_seen => continue,
                Some(last_seen) if ts == last_seen => {
                    if !self.seen_at_boundary.insert(id) {
                        continue;
                    }
                }
                _ => {
                    self.last_seen = Some(ts);
                    self.seen_at_boundary.clear();
                    self.seen_at_boundary.insert(id);
                }
            }
            fresh.push(row);
        }
        fresh
    }

    /// Query and advance. A failed query leaves the window untouched.
    pub(crate) async fn poll(
        &mut self,
        service: &dyn DataService,
        table: &str,
    ) -> Result<Vec<Row>, BackendError> {
        let rows = service.query(&self.query(table)).await?;
        Ok(self.advance(rows))
    }
}

fn row_id(row: &Row) -> String {
    row.get(message_columns::ID)
        .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
        .unwrap_or_default()
}

fn row_created_at(row: &Row) -> Option<DateTime<Utc>> {
    row.get(message_columns::CREATED_AT)
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

async fn poll_inserts(
    service: RestDataService,
    table: String,
    mut window: FeedWindow,
    tx: mpsc::UnboundedSender<ChangeEvent>,
) {
    let mut ticker = tokio::time::interval(service.poll_interval);

    loop {
        ticker.tick().await;
        if tx.is_closed() {
            break;
        }

        let rows = match window.poll(&service, &table).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(table = %table, error = %e, "Change feed poll failed");
                continue;
            }
        };

        for row in rows {
            let event = ChangeEvent {
                kind: ChangeKind::Insert,
                table: table.clone(),
                new_row: row,
            };
            if tx.send(event).is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Embed, MemoryDataService};
    use serde_json::json;

    fn seed_at(service: &MemoryDataService, id: &str, at: &str) {
        service.seed("mesajlar", json!({"id": id, "icerik": id, "created_at": at}));
    }

    fn ids(rows: &[Row]) -> Vec<&str> {
        rows.iter().map(|r| r["id"].as_str().unwrap()).collect()
    }

    #[test]
    fn test_query_params_for_received_messages() {
        let query = Query::table("mesajlar")
            .embed(Embed::inner("arabalar", "arac_id", &["baslik"]))
            .filter(Filter::eq("alici_id", "u1"))
            .order(Order::desc("created_at"))
            .limit(50);

        assert_eq!(
            RestDataService::query_params(&query),
            vec![
                ("select".to_string(), "*,arabalar!inner(baslik)".to_string()),
                ("alici_id".to_string(), "eq.u1".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "50".to_string()),
            ]
        );
    }

    #[test]
    fn test_two_or_filters_become_two_params() {
        let query = Query::table("mesajlar")
            .filter(Filter::or([
                Filter::eq("gonderen_id", "a"),
                Filter::eq("alici_id", "a"),
            ]))
            .filter(Filter::or([
                Filter::eq("gonderen_id", "b"),
                Filter::eq("alici_id", "b"),
            ]));
        let params = RestDataService::query_params(&query);
        let ors: Vec<_> = params.iter().filter(|(k, _)| k == "or").collect();
        assert_eq!(ors.len(), 2);
        assert_eq!(ors[1].1, "(gonderen_id.eq.b,alici_id.eq.b)");
    }

    #[test]
    fn test_table_url_trims_trailing_slash() {
        let service = RestDataService::new("https://example.test/", "anon");
        assert_eq!(service.table_url("mesajlar"), "https://example.test/rest/v1/mesajlar");
    }

    #[test]
    fn test_parse_content_range_total() {
        assert_eq!(parse_content_range_total("0-24/3573"), Some(3573));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("garbage"), None);
    }

    #[tokio::test]
    async fn test_update_feed_is_unsupported() {
        let service = RestDataService::new("http://localhost:1", "anon");
        let result = service.subscribe("mesajlar", ChangeKind::Update).await;
        assert!(matches!(result, Err(BackendError::Unsupported(_))));
    }

    #[tokio::test]
    async fn test_window_starts_from_server_clock() {
        // Server clock years behind the client: a window opened on the client's
        // clock would never see these rows.
        let service = MemoryDataService::new();
        seed_at(&service, "old", "2020-01-01T10:00:00Z");

        let mut window = FeedWindow::at_latest(&service, "mesajlar").await.unwrap();
        assert!(window.poll(&service, "mesajlar").await.unwrap().is_empty());

        seed_at(&service, "new", "2020-01-01T10:00:05Z");
        let fresh = window.poll(&service, "mesajlar").await.unwrap();
        assert_eq!(ids(&fresh), vec!["new"]);
    }

    #[tokio::test]
    async fn test_window_on_empty_table_emits_first_row() {
        let service = MemoryDataService::new();
        let mut window = FeedWindow::at_latest(&service, "mesajlar").await.unwrap();
        assert!(window.query("mesajlar").filters.is_empty());

        seed_at(&service, "first", "2020-01-01T10:00:00Z");
        let fresh = window.poll(&service, "mesajlar").await.unwrap();
        assert_eq!(ids(&fresh), vec!["first"]);
    }

    #[test]
    fn test_advance_emits_ascending_and_skips_boundary_repeats() {
        let row = |id: &str, at: &str| match json!({"id": id, "created_at": at}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let mut window = FeedWindow::default();

        let fresh = window.advance(vec![
            row("b", "2024-03-01T10:00:02Z"),
            row("a", "2024-03-01T10:00:01Z"),
            row("c", "2024-03-01T10:00:02Z"),
        ]);
        assert_eq!(ids(&fresh), vec!["a", "b", "c"]);

        // Next gte window repeats the boundary rows plus one new row at the
        // same instant and one later row.
        let fresh = window.advance(vec![
            row("b", "2024-03-01T10:00:02Z"),
            row("c", "2024-03-01T10:00:02Z"),
            row("d", "2024-03-01T10:00:02Z"),
            row("e", "2024-03-01T10:00:03Z"),
        ]);
        assert_eq!(ids(&fresh), vec!["d", "e"]);

        // Older rows and rows without a timestamp never come through
        let fresh = window.advance(vec![
            row("a", "2024-03-01T10:00:01Z"),
            match json!({"id": "f"}) {
                serde_json::Value::Object(map) => map,
                _ => unreachable!(),
            },
        ]);
        assert!(fresh.is_empty());
    }

    #[tokio::test]
    async fn test_window_drains_more_rows_than_one_batch_at_one_instant() {
        let service = MemoryDataService::new();
        seed_at(&service, "start", "2024-03-01T09:00:00Z");
        let mut window = FeedWindow::at_latest(&service, "mesajlar").await.unwrap();

        let total = FEED_BATCH_LIMIT + 50;
        for i in 0..total {
            seed_at(&service, &format!("m{:04}", i), "2024-03-01T10:00:00Z");
        }

        let mut delivered = HashSet::new();
        for _ in 0..4 {
            for row in window.poll(&service, "mesajlar").await.unwrap() {
                assert!(delivered.insert(row_id(&row)), "row emitted twice");
            }
        }
        assert_eq!(delivered.len(), total);
    }

    #[tokio::test]
    async fn test_failed_poll_keeps_position() {
        let service = MemoryDataService::new();
        seed_at(&service, "start", "2024-03-01T09:00:00Z");
        let mut window = FeedWindow::at_latest(&service, "mesajlar").await.unwrap();
        seed_at(&service, "next", "2024-03-01T09:00:01Z");

        let before = window.clone();
        service.fail_next_query();
        assert!(window.poll(&service, "mesajlar").await.is_err());
        assert_eq!(window, before);

        let fresh = window.poll(&service, "mesajlar").await.unwrap();
        assert_eq!(ids(&fresh), vec!["next"]);
    }
}
