//! Contract of the hosted data service the inbox talks to, plus an in-memory
//! implementation and a REST client.

pub mod feed;
pub mod filter;
pub mod memory;
pub mod rest;

use async_trait::async_trait;

use crate::error::BackendError;

pub use feed::{ChangeEvent, ChangeKind, Subscription};
pub use filter::{Embed, Filter, Order, Query};
pub use memory::MemoryDataService;
pub use rest::RestDataService;

/// One table row as returned by the backend
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Table-level CRUD plus a change feed.
///
/// Every call is a single request; implementations provide row-level
/// atomicity only.
#[async_trait]
pub trait DataService: Send + Sync {
    async fn query(&self, query: &Query) -> Result<Vec<Row>, BackendError>;

    async fn insert(&self, table: &str, row: Row) -> Result<Row, BackendError>;

    /// Apply `patch` to every row matching all `filters`; returns the updated rows
    async fn update(&self, table: &str, patch: Row, filters: &[Filter])
        -> Result<Vec<Row>, BackendError>;

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64, BackendError>;

    async fn subscribe(&self, table: &str, kind: ChangeKind) -> Result<Subscription, BackendError>;
}
