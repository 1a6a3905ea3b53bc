//! Table access against the hosted relational store.
//!
//! Services talk to a [`TableClient`]; rows travel as JSON objects and are
//! decoded into typed models by the caller.

pub mod memory;
pub mod postgres;
pub mod query;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::BackendError;

pub use memory::MemoryTables;
pub use postgres::PgTables;
pub use query::{Filter, Order, Range, Rows, Select, Written};

/// Postgres NOTIFY channel fed by the `notify_change` trigger in `sql/schema.sql`.
pub const CHANGE_CHANNEL: &str = "lodge_portal_changes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub record: Value,
}

/// Receives change events for one table until the sender side goes away.
pub type ChangeStream = mpsc::UnboundedReceiver<ChangeEvent>;

#[async_trait]
pub trait TableClient: Send + Sync {
    async fn select(&self, query: Select) -> Result<Rows, BackendError>;

    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Written, BackendError>;

    async fn update(
        &self,
        table: &str,
        filters: Vec<Filter>,
        patch: Value,
    ) -> Result<Written, BackendError>;

    /// Insert, or update the row that collides on `on_conflict`.
    async fn upsert(
        &self,
        table: &str,
        rows: Vec<Value>,
        on_conflict: &[&str],
    ) -> Result<Written, BackendError>;

    async fn delete(&self, table: &str, filters: Vec<Filter>) -> Result<Written, BackendError>;

    async fn subscribe(&self, table: &str) -> Result<ChangeStream, BackendError>;
}
