use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::{PgListener, PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Executor, Postgres, QueryBuilder};
use tokio::sync::mpsc;

use super::query::{Filter, Rows, Select, Written, check_ident};
use super::{CHANGE_CHANNEL, ChangeEvent, ChangeStream, TableClient};
use crate::error::BackendError;

/// [`TableClient`] over a Postgres pool.
///
/// Statements are assembled with `QueryBuilder`. Identifiers are checked by
/// [`check_ident`] before being quoted into the SQL text; every value is a
/// JSONB bind coerced to the column type through `jsonb_populate_record`, so
/// callers never need to know column types.
#[derive(Clone)]
pub struct PgTables {
    pool: PgPool,
}

impl PgTables {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, BackendError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    conn.execute("SET application_name = 'lodge_portal';").await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn quoted(name: &str) -> Result<String, BackendError> {
    Ok(format!("\"{}\"", check_ident(name)?))
}

/// `(jsonb_populate_record(NULL::"table", $n))."column"`: the value cast to the column's type.
fn push_typed(
    qb: &mut QueryBuilder<'_, Postgres>,
    table: &str,
    column: &str,
    value: &Value,
) -> Result<(), BackendError> {
    let mut holder = Map::new();
    holder.insert(column.to_string(), value.clone());
    qb.push("(jsonb_populate_record(NULL::")
        .push(quoted(table)?)
        .push(", ")
        .push_bind(Json(Value::Object(holder)))
        .push(")).")
        .push(quoted(column)?);
    Ok(())
}

fn push_comparison(
    qb: &mut QueryBuilder<'_, Postgres>,
    table: &str,
    column: &str,
    op: &str,
    value: &Value,
) -> Result<(), BackendError> {
    qb.push("t.").push(quoted(column)?).push(op);
    push_typed(qb, table, column, value)
}

fn push_filter(
    qb: &mut QueryBuilder<'_, Postgres>,
    table: &str,
    filter: &Filter,
) -> Result<(), BackendError> {
    match filter {
        Filter::Eq(c, v) => push_comparison(qb, table, c, " = ", v)?,
        Filter::Neq(c, v) => push_comparison(qb, table, c, " <> ", v)?,
        Filter::Gt(c, v) => push_comparison(qb, table, c, " > ", v)?,
        Filter::Gte(c, v) => push_comparison(qb, table, c, " >= ", v)?,
        Filter::Lt(c, v) => push_comparison(qb, table, c, " < ", v)?,
        Filter::Lte(c, v) => push_comparison(qb, table, c, " <= ", v)?,
        Filter::Contains(c, v) => push_comparison(qb, table, c, " @> ", v)?,
        Filter::ILike(c, pattern) => {
            qb.push("t.")
                .push(quoted(c)?)
                .push("::text ILIKE ")
                .push_bind(pattern.clone());
        }
        Filter::In(c, values) if values.is_empty() => {
            check_ident(c)?;
            qb.push("FALSE");
        }
        Filter::In(c, values) => {
            let column = quoted(c)?;
            qb.push("t.")
                .push(&column)
                .push(" = ANY(ARRAY(SELECT (jsonb_populate_record(NULL::")
                .push(quoted(table)?)
                .push(", jsonb_build_object('")
                .push(check_ident(c)?)
                .push("', x))).")
                .push(&column)
                .push(" FROM jsonb_array_elements(")
                .push_bind(Json(Value::Array(values.clone())))
                .push(") AS x))");
        }
        Filter::IsNull(c) => {
            qb.push("t.").push(quoted(c)?).push(" IS NULL");
        }
        Filter::NotNull(c) => {
            qb.push("t.").push(quoted(c)?).push(" IS NOT NULL");
        }
        Filter::Or(inner) if inner.is_empty() => {
            qb.push("FALSE");
        }
        Filter::Or(inner) => {
            qb.push("(");
            for (i, f) in inner.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                push_filter(qb, table, f)?;
            }
            qb.push(")");
        }
    }
    Ok(())
}

fn push_where(
    qb: &mut QueryBuilder<'_, Postgres>,
    table: &str,
    filters: &[Filter],
) -> Result<(), BackendError> {
    for (i, f) in filters.iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        push_filter(qb, table, f)?;
    }
    Ok(())
}

/// Column names across all rows, first appearance order.
fn column_list(rows: &[Value]) -> Result<Vec<String>, BackendError> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        let Value::Object(map) = row else {
            return Err(BackendError::validation("row must be a JSON object"));
        };
        for key in map.keys() {
            check_ident(key)?;
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
    }
    if columns.is_empty() {
        return Err(BackendError::validation("nothing to write"));
    }
    Ok(columns)
}

/// Rows grouped by their exact column set, first appearance first. Each group
/// is written by its own statement so the columns a row leaves out keep their
/// defaults instead of becoming NULL.
fn shape_groups(rows: Vec<Value>) -> Result<Vec<(Vec<String>, Vec<Value>)>, BackendError> {
    let mut groups: Vec<(Vec<String>, Vec<Value>)> = Vec::new();
    for row in rows {
        let mut columns = column_list(std::slice::from_ref(&row))?;
        columns.sort_unstable();
        match groups.iter_mut().find(|(shape, _)| *shape == columns) {
            Some((_, members)) => members.push(row),
            None => groups.push((columns, vec![row])),
        }
    }
    Ok(groups)
}

fn push_insert(
    qb: &mut QueryBuilder<'_, Postgres>,
    table: &str,
    rows: Vec<Value>,
    columns: &[String],
) -> Result<(), BackendError> {
    let list = columns
        .iter()
        .map(|c| quoted(c))
        .collect::<Result<Vec<_>, _>>()?
        .join(", ");
    qb.push("INSERT INTO ")
        .push(quoted(table)?)
        .push(" AS t (")
        .push(&list)
        .push(") SELECT ")
        .push(&list)
        .push(" FROM jsonb_populate_recordset(NULL::")
        .push(quoted(table)?)
        .push(", ")
        .push_bind(Json(Value::Array(rows)))
        .push(")");
    Ok(())
}

#[async_trait]
impl TableClient for PgTables {
    async fn select(&self, query: Select) -> Result<Rows, BackendError> {
        let table = quoted(&query.table)?;

        let count = if query.count {
            let mut qb = QueryBuilder::<Postgres>::new("SELECT count(*) FROM ");
            qb.push(&table).push(" AS t");
            push_where(&mut qb, &query.table, &query.filters)?;
            let total: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
            Some(total.max(0) as u64)
        } else {
            None
        };
        if query.head {
            return Ok(Rows {
                rows: Vec::new(),
                count,
            });
        }

        let mut qb = QueryBuilder::<Postgres>::new("SELECT to_jsonb(t.*) FROM ");
        qb.push(&table).push(" AS t");
        push_where(&mut qb, &query.table, &query.filters)?;
        for (i, order) in query.order.iter().enumerate() {
            qb.push(if i == 0 { " ORDER BY t." } else { ", t." })
                .push(quoted(&order.column)?)
                .push(if order.ascending { " ASC" } else { " DESC" })
                .push(" NULLS LAST");
        }
        if let Some(range) = query.range {
            qb.push(" LIMIT ")
                .push_bind(range.limit as i64)
                .push(" OFFSET ")
                .push_bind(range.offset as i64);
        }

        tracing::debug!("select: {}", qb.sql());
        let rows: Vec<Json<Value>> = qb.build_query_scalar().fetch_all(&self.pool).await?;
        Ok(Rows {
            rows: rows.into_iter().map(|Json(v)| v).collect(),
            count,
        })
    }

    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Written, BackendError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self.pool.begin().await?;
        let mut written = Vec::with_capacity(rows.len());
        for (columns, group) in shape_groups(rows)? {
            let mut qb = QueryBuilder::<Postgres>::new("");
            push_insert(&mut qb, table, group, &columns)?;
            qb.push(" RETURNING to_jsonb(t.*)");
            let inserted: Vec<Json<Value>> = qb.build_query_scalar().fetch_all(&mut *tx).await?;
            written.extend(inserted.into_iter().map(|Json(v)| v));
        }
        tx.commit().await?;
        Ok(written)
    }

    async fn update(
        &self,
        table: &str,
        filters: Vec<Filter>,
        patch: Value,
    ) -> Result<Written, BackendError> {
        let columns = column_list(std::slice::from_ref(&patch))?;
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE ");
        qb.push(quoted(table)?).push(" AS t SET ");
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            let column = quoted(column)?;
            qb.push(&column).push(" = p.").push(&column);
        }
        qb.push(" FROM jsonb_populate_record(NULL::")
            .push(quoted(table)?)
            .push(", ")
            .push_bind(Json(patch))
            .push(") AS p");
        push_where(&mut qb, table, &filters)?;
        qb.push(" RETURNING to_jsonb(t.*)");

        let written: Vec<Json<Value>> = qb.build_query_scalar().fetch_all(&self.pool).await?;
        Ok(written.into_iter().map(|Json(v)| v).collect())
    }

    async fn upsert(
        &self,
        table: &str,
        rows: Vec<Value>,
        on_conflict: &[&str],
    ) -> Result<Written, BackendError> {
        if on_conflict.is_empty() {
            return Err(BackendError::validation("upsert needs a conflict target"));
        }
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let target = on_conflict
            .iter()
            .map(|c| quoted(c))
            .collect::<Result<Vec<_>, _>>()?
            .join(", ");

        let mut tx = self.pool.begin().await?;
        let mut written = Vec::with_capacity(rows.len());
        for (columns, group) in shape_groups(rows)? {
            // Conflict columns are reassigned too, so RETURNING yields the existing row.
            let assignments = columns
                .iter()
                .map(|c| quoted(c).map(|q| format!("{q} = EXCLUDED.{q}")))
                .collect::<Result<Vec<_>, _>>()?;

            let mut qb = QueryBuilder::<Postgres>::new("");
            push_insert(&mut qb, table, group, &columns)?;
            qb.push(" ON CONFLICT (")
                .push(&target)
                .push(") DO UPDATE SET ")
                .push(assignments.join(", "))
                .push(" RETURNING to_jsonb(t.*)");
            let upserted: Vec<Json<Value>> = qb.build_query_scalar().fetch_all(&mut *tx).await?;
            written.extend(upserted.into_iter().map(|Json(v)| v));
        }
        tx.commit().await?;
        Ok(written)
    }

    async fn delete(&self, table: &str, filters: Vec<Filter>) -> Result<Written, BackendError> {
        let mut qb = QueryBuilder::<Postgres>::new("DELETE FROM ");
        qb.push(quoted(table)?).push(" AS t");
        push_where(&mut qb, table, &filters)?;
        qb.push(" RETURNING to_jsonb(t.*)");

        let written: Vec<Json<Value>> = qb.build_query_scalar().fetch_all(&self.pool).await?;
        Ok(written.into_iter().map(|Json(v)| v).collect())
    }

    async fn subscribe(&self, table: &str) -> Result<ChangeStream, BackendError> {
        let table = check_ident(table)?.to_string();
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;
        tracing::info!("Listening on {} for {}", CHANGE_CHANNEL, table);

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    received = listener.recv() => match received {
                        Ok(notification) => {
                            match serde_json::from_str::<ChangeEvent>(notification.payload()) {
                                Ok(event) if event.table == table => {
                                    if tx.send(event).is_err() {
                                        break;
                                    }
                                }
                                Ok(_) => {}
                                Err(e) => tracing::warn!("Unreadable change payload: {}", e),
                            }
                        }
                        Err(e) => {
                            tracing::error!("Change listener for {} stopped: {}", table, e);
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Change listener for {} closed", table);
        });
        Ok(rx)
    }
}
