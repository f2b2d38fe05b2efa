//! The analytical warehouse collaborator.
//!
//! [`Warehouse`] accepts a [`BoundQuery`] and returns named-field [`Row`]s.
//! [`DuckDbWarehouse`] runs the query on a blocking thread and gives up
//! after the configured timeout. A query that times out keeps running on
//! its thread; only the caller stops waiting.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use duckdb::Connection;
use duckdb::types::Value;
use lending_atlas_database_models::{FieldValue, Row};
use lending_atlas_query_models::{BoundQuery, QueryParam};

use crate::WarehouseError;

/// Executes bound analytical queries.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Runs `query` and returns its rows in result order.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError`] if the query fails or times out.
    async fn fetch(&self, query: &BoundQuery) -> Result<Vec<Row>, WarehouseError>;
}

/// [`Warehouse`] backed by a `DuckDB` connection.
#[derive(Clone)]
pub struct DuckDbWarehouse {
    conn: Arc<Mutex<Connection>>,
    timeout: Duration,
}

impl std::fmt::Debug for DuckDbWarehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbWarehouse")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl DuckDbWarehouse {
    /// Default query timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Wraps an open connection.
    #[must_use]
    pub fn new(conn: Connection, timeout: Duration) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            timeout,
        }
    }

    /// The configured query timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `f` with exclusive access to the underlying connection.
    ///
    /// Used by ingestion and tests to load data into the warehouse.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError::Backend`] if the connection lock is
    /// poisoned, or whatever `f` returns.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, WarehouseError>,
    ) -> Result<T, WarehouseError> {
        let conn = self.conn.lock().map_err(|e| WarehouseError::Backend {
            message: format!("connection lock poisoned: {e}"),
        })?;
        f(&conn)
    }
}

#[async_trait]
impl Warehouse for DuckDbWarehouse {
    async fn fetch(&self, query: &BoundQuery) -> Result<Vec<Row>, WarehouseError> {
        let conn = Arc::clone(&self.conn);
        let sql = query.sql.clone();
        let params = query.params.clone();
        let shape = query.shape;

        let task = tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|e| WarehouseError::Backend {
                message: format!("connection lock poisoned: {e}"),
            })?;
            run_query(&conn, &sql, &params)
        });

        let rows = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_err)) => {
                return Err(WarehouseError::Backend {
                    message: format!("query task failed: {join_err}"),
                });
            }
            Err(_) => {
                log::warn!(
                    "Warehouse {shape} query exceeded {}s timeout",
                    self.timeout.as_secs()
                );
                return Err(WarehouseError::Timeout {
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        log::debug!("Warehouse {shape} query returned {} rows", rows.len());
        Ok(rows)
    }
}

fn run_query(
    conn: &Connection,
    sql: &str,
    params: &[QueryParam],
) -> Result<Vec<Row>, WarehouseError> {
    let mut stmt = conn.prepare(sql)?;

    for (i, param) in params.iter().enumerate() {
        match param {
            QueryParam::Int(v) => stmt.raw_bind_parameter(i + 1, v)?,
            QueryParam::Real(v) => stmt.raw_bind_parameter(i + 1, v)?,
            QueryParam::Text(v) => stmt.raw_bind_parameter(i + 1, v.as_str())?,
        }
    }

    stmt.raw_execute()?;
    let columns = stmt.column_names();

    let mut out = Vec::new();
    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next()? {
        let mut record = Row::new();
        for (i, name) in columns.iter().enumerate() {
            let value: Value = row.get(i)?;
            record.insert(name.as_str(), field_value(value));
        }
        out.push(record);
    }

    Ok(out)
}

#[allow(clippy::cast_precision_loss)]
fn field_value(value: Value) -> FieldValue {
    match value {
        Value::Null => FieldValue::Null,
        Value::Boolean(v) => FieldValue::Bool(v),
        Value::TinyInt(v) => FieldValue::Int(i64::from(v)),
        Value::SmallInt(v) => FieldValue::Int(i64::from(v)),
        Value::Int(v) => FieldValue::Int(i64::from(v)),
        Value::BigInt(v) => FieldValue::Int(v),
        Value::UTinyInt(v) => FieldValue::Int(i64::from(v)),
        Value::USmallInt(v) => FieldValue::Int(i64::from(v)),
        Value::UInt(v) => FieldValue::Int(i64::from(v)),
        Value::UBigInt(v) => i64::try_from(v).map_or(FieldValue::Real(v as f64), FieldValue::Int),
        Value::HugeInt(v) => i64::try_from(v).map_or(FieldValue::Real(v as f64), FieldValue::Int),
        Value::Float(v) => FieldValue::Real(f64::from(v)),
        Value::Double(v) => FieldValue::Real(v),
        Value::Text(v) | Value::Enum(v) => FieldValue::Text(v),
        other => FieldValue::Text(format!("{other:?}")),
    }
}
