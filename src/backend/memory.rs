use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use super::query::{Filter, Order, Rows, Select, Written, check_ident};
use super::{ChangeEvent, ChangeKind, ChangeStream, TableClient};
use crate::error::{BackendError, ErrorKind};

/// In-process table store with the same query semantics as [`super::PgTables`].
///
/// Used by the offline server mode and by tests. Rows get an `id` and a
/// `created_at` when the caller leaves them out, like the column defaults in
/// `sql/schema.sql`.
pub struct MemoryTables {
    tables: RwLock<HashMap<String, Vec<Value>>>,
    unique_keys: RwLock<HashMap<String, Vec<Vec<String>>>>,
    failures: Mutex<HashMap<String, BackendError>>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl Default for MemoryTables {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTables {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            tables: RwLock::new(HashMap::new()),
            unique_keys: RwLock::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            changes,
        }
    }

    /// The unique keys declared by `sql/schema.sql`.
    pub fn with_portal_schema() -> Self {
        let tables = Self::new();
        tables.add_unique("profiles", &["id"]);
        tables.add_unique("lodge_memberships", &["user_id", "lodge_id"]);
        tables.add_unique("attendance", &["tenue_id", "user_id"]);
        tables.add_unique("invitations", &["code"]);
        tables.add_unique("message_reads", &["message_id", "user_id"]);
        tables
    }

    pub fn add_unique(&self, table: &str, columns: &[&str]) {
        self.unique_keys
            .write()
            .entry(table.to_string())
            .or_default()
            .push(columns.iter().map(|c| c.to_string()).collect());
    }

    /// The next call touching `table` fails with `error`.
    pub fn fail_next(&self, table: &str, error: BackendError) {
        self.failures.lock().insert(table.to_string(), error);
    }

    /// Snapshot of a table's rows.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables.read().get(table).cloned().unwrap_or_default()
    }

    fn take_failure(&self, table: &str) -> Result<(), BackendError> {
        check_ident(table)?;
        match self.failures.lock().remove(table) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn publish(&self, table: &str, kind: ChangeKind, record: &Value) {
        // No receivers is fine.
        let _ = self.changes.send(ChangeEvent {
            table: table.to_string(),
            kind,
            record: record.clone(),
        });
    }

    fn check_unique(
        &self,
        table: &str,
        existing: &[Value],
        row: &Value,
        skip: Option<usize>,
    ) -> Result<(), BackendError> {
        let keys = self.unique_keys.read();
        let Some(keys) = keys.get(table) else {
            return Ok(());
        };
        for key in keys {
            let clash = existing.iter().enumerate().any(|(i, other)| {
                Some(i) != skip
                    && key.iter().all(|col| {
                        let a = field(row, col);
                        !a.is_null() && values_equal(a, field(other, col))
                    })
            });
            if clash {
                return Err(BackendError::new(
                    ErrorKind::Conflict,
                    format!(
                        "duplicate key value violates unique constraint on {}({})",
                        table,
                        key.join(", ")
                    ),
                ));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TableClient for MemoryTables {
    async fn select(&self, query: Select) -> Result<Rows, BackendError> {
        self.take_failure(&query.table)?;
        let tables = self.tables.read();
        let mut rows: Vec<Value> = tables
            .get(&query.table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| query.filters.iter().all(|f| matches_filter(row, f)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(tables);

        let count = query.count.then_some(rows.len() as u64);
        if query.head {
            return Ok(Rows {
                rows: Vec::new(),
                count,
            });
        }

        sort_rows(&mut rows, &query.order);
        if let Some(range) = query.range {
            rows = rows
                .into_iter()
                .skip(range.offset as usize)
                .take(range.limit as usize)
                .collect();
        }
        Ok(Rows { rows, count })
    }

    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Written, BackendError> {
        self.take_failure(table)?;
        let mut prepared = Vec::with_capacity(rows.len());
        for row in rows {
            prepared.push(with_defaults(row)?);
        }

        let mut tables = self.tables.write();
        let existing = tables.entry(table.to_string()).or_default();
        let mut staged = existing.clone();
        for row in &prepared {
            self.check_unique(table, &staged, row, None)?;
            staged.push(row.clone());
        }
        *existing = staged;
        drop(tables);

        for row in &prepared {
            self.publish(table, ChangeKind::Insert, row);
        }
        Ok(prepared)
    }

    async fn update(
        &self,
        table: &str,
        filters: Vec<Filter>,
        patch: Value,
    ) -> Result<Written, BackendError> {
        self.take_failure(table)?;
        let patch = as_object(patch)?;
        let mut tables = self.tables.write();
        let Some(existing) = tables.get_mut(table) else {
            return Ok(Vec::new());
        };

        let mut staged = existing.clone();
        let mut written = Vec::new();
        for i in 0..staged.len() {
            if !filters.iter().all(|f| matches_filter(&staged[i], f)) {
                continue;
            }
            merge(&mut staged[i], &patch);
            self.check_unique(table, &staged, &staged[i], Some(i))?;
            written.push(staged[i].clone());
        }
        *existing = staged;
        drop(tables);

        for row in &written {
            self.publish(table, ChangeKind::Update, row);
        }
        Ok(written)
    }

    async fn upsert(
        &self,
        table: &str,
        rows: Vec<Value>,
        on_conflict: &[&str],
    ) -> Result<Written, BackendError> {
        self.take_failure(table)?;
        if on_conflict.is_empty() {
            return Err(BackendError::validation("upsert needs a conflict target"));
        }

        let mut tables = self.tables.write();
        let existing = tables.entry(table.to_string()).or_default();
        let mut staged = existing.clone();
        let mut written = Vec::new();
        for row in rows {
            let row = as_object(row)?;
            let position = staged.iter().position(|other| {
                on_conflict.iter().all(|col| {
                    let value = row.get(*col).unwrap_or(&Value::Null);
                    !value.is_null() && values_equal(value, field(other, col))
                })
            });
            match position {
                Some(i) => {
                    merge(&mut staged[i], &row);
                    self.check_unique(table, &staged, &staged[i], Some(i))?;
                    written.push((ChangeKind::Update, staged[i].clone()));
                }
                None => {
                    let row = with_defaults(Value::Object(row))?;
                    self.check_unique(table, &staged, &row, None)?;
                    staged.push(row.clone());
                    written.push((ChangeKind::Insert, row));
                }
            }
        }
        *existing = staged;
        drop(tables);

        for (kind, row) in &written {
            self.publish(table, *kind, row);
        }
        Ok(written.into_iter().map(|(_, row)| row).collect())
    }

    async fn delete(&self, table: &str, filters: Vec<Filter>) -> Result<Written, BackendError> {
        self.take_failure(table)?;
        let mut tables = self.tables.write();
        let Some(existing) = tables.get_mut(table) else {
            return Ok(Vec::new());
        };
        let (removed, kept): (Vec<Value>, Vec<Value>) = existing
            .drain(..)
            .partition(|row| filters.iter().all(|f| matches_filter(row, f)));
        *existing = kept;
        drop(tables);

        for row in &removed {
            self.publish(table, ChangeKind::Delete, row);
        }
        Ok(removed)
    }

    async fn subscribe(&self, table: &str) -> Result<ChangeStream, BackendError> {
        check_ident(table)?;
        let mut source = self.changes.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        let table = table.to_string();
        tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(event) if event.table == table => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Change feed for {} lagged, {} events skipped", table, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(rx)
    }
}

fn as_object(value: Value) -> Result<Map<String, Value>, BackendError> {
    match value {
        Value::Object(map) => {
            for key in map.keys() {
                check_ident(key)?;
            }
            Ok(map)
        }
        other => Err(BackendError::validation(format!(
            "row must be a JSON object, got {}",
            other
        ))),
    }
}

fn with_defaults(row: Value) -> Result<Value, BackendError> {
    let mut row = as_object(row)?;
    if row.get("id").is_none_or(Value::is_null) {
        row.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
    }
    if row.get("created_at").is_none_or(Value::is_null) {
        row.insert("created_at".into(), serde_json::to_value(Utc::now())?);
    }
    Ok(Value::Object(row))
}

fn merge(target: &mut Value, patch: &Map<String, Value>) {
    if let Value::Object(target) = target {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
    }
}

fn field<'a>(row: &'a Value, column: &str) -> &'a Value {
    row.get(column).unwrap_or(&Value::Null)
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => {
            // Timestamps with differing precision do not sort lexically.
            match (
                DateTime::parse_from_rfc3339(a),
                DateTime::parse_from_rfc3339(b),
            ) {
                (Ok(a), Ok(b)) => Some(a.cmp(&b)),
                _ => Some(a.cmp(b)),
            }
        }
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(_), _) | (_, Value::Object(_)) => a == b,
        _ => compare_values(a, b) == Some(Ordering::Equal),
    }
}

fn matches_filter(row: &Value, filter: &Filter) -> bool {
    match filter {
        Filter::Eq(col, v) => values_equal(field(row, col), v),
        Filter::Neq(col, v) => {
            let current = field(row, col);
            !current.is_null() && !values_equal(current, v)
        }
        Filter::Gt(col, v) => compare_values(field(row, col), v) == Some(Ordering::Greater),
        Filter::Gte(col, v) => matches!(
            compare_values(field(row, col), v),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Filter::Lt(col, v) => compare_values(field(row, col), v) == Some(Ordering::Less),
        Filter::Lte(col, v) => matches!(
            compare_values(field(row, col), v),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Filter::ILike(col, pattern) => match field(row, col) {
            Value::String(s) => like_match(pattern, s),
            Value::Null => false,
            other => like_match(pattern, &other.to_string()),
        },
        Filter::In(col, values) => {
            let current = field(row, col);
            values.iter().any(|v| values_equal(current, v))
        }
        Filter::IsNull(col) => field(row, col).is_null(),
        Filter::NotNull(col) => !field(row, col).is_null(),
        Filter::Contains(col, wanted) => match (field(row, col), wanted) {
            (Value::Array(have), Value::Array(wanted)) => wanted
                .iter()
                .all(|w| have.iter().any(|h| values_equal(h, w))),
            _ => false,
        },
        Filter::Or(inner) => inner.iter().any(|f| matches_filter(row, f)),
    }
}

fn sort_rows(rows: &mut [Value], order: &[Order]) {
    if order.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for o in order {
            let (x, y) = (field(a, &o.column), field(b, &o.column));
            // Nulls last in both directions.
            let ord = match (x.is_null(), y.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => {
                    let ord = compare_values(x, y).unwrap_or(Ordering::Equal);
                    if o.ascending { ord } else { ord.reverse() }
                }
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

enum LikeToken {
    Any,
    One,
    Lit(char),
}

/// Case-insensitive LIKE: `%` any run, `_` one char, `\` escapes.
fn like_match(pattern: &str, input: &str) -> bool {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '%' => LikeToken::Any,
            '_' => LikeToken::One,
            '\\' => LikeToken::Lit(chars.next().unwrap_or('\\')),
            c => LikeToken::Lit(c),
        });
    }
    let text: Vec<char> = input.chars().flat_map(char::to_lowercase).collect();

    // reachable[j]: the tokens seen so far can consume exactly text[..j]
    let mut reachable = vec![false; text.len() + 1];
    reachable[0] = true;
    for token in &tokens {
        let mut next = vec![false; text.len() + 1];
        match token {
            LikeToken::Any => {
                let mut seen = false;
                for j in 0..=text.len() {
                    seen |= reachable[j];
                    next[j] = seen;
                }
            }
            LikeToken::One => {
                for j in 0..text.len() {
                    next[j + 1] = reachable[j];
                }
            }
            LikeToken::Lit(c) => {
                let lower: Vec<char> = c.to_lowercase().collect();
                if lower.len() == 1 {
                    for j in 0..text.len() {
                        next[j + 1] = reachable[j] && text[j] == lower[0];
                    }
                }
            }
        }
        reachable = next;
    }
    reachable[text.len()]
}
