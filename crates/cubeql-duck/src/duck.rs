//! DuckDB-backed warehouse

use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use cubeql_guard::ValidatedSql;
use duckdb::types::{TimeUnit, ValueRef};
use duckdb::Connection;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::{ExecutionError, QueryResult, Warehouse};

/// Days from 0001-01-01 to 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Each statement runs on its own clone of the base connection, so an
/// interrupt only ever cancels that statement.
pub struct DuckWarehouse {
    base: Mutex<Connection>,
}

impl DuckWarehouse {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ExecutionError> {
        let conn = Connection::open(path)?;
        Ok(Self::with_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, ExecutionError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::with_connection(conn))
    }

    pub fn with_connection(conn: Connection) -> Self {
        Self {
            base: Mutex::new(conn),
        }
    }

    fn connection(&self) -> Result<Connection, ExecutionError> {
        let base = self.base.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(base.try_clone()?)
    }

    /// Run `work` on a blocking thread, interrupting the statement on timeout
    async fn run<T, F>(&self, timeout: Duration, work: F) -> Result<T, ExecutionError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, ExecutionError> + Send + 'static,
    {
        let conn = self.connection()?;
        let interrupt = conn.interrupt_handle();
        let task = tokio::task::spawn_blocking(move || work(&conn));

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(ExecutionError::Join(join.to_string())),
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Interrupting statement after timeout");
                interrupt.interrupt();
                Err(ExecutionError::Timeout(timeout))
            }
        }
    }
}

#[async_trait]
impl Warehouse for DuckWarehouse {
    async fn execute(
        &self,
        sql: &ValidatedSql,
        timeout: Duration,
    ) -> Result<QueryResult, ExecutionError> {
        let statement = sql.as_str().to_string();
        let result = self.run(timeout, move |conn| query(conn, &statement)).await?;
        debug!(
            rows = result.row_count,
            elapsed_ms = result.execution_time_ms,
            "Statement executed"
        );
        Ok(result)
    }

    async fn explain(
        &self,
        sql: &ValidatedSql,
        timeout: Duration,
    ) -> Result<String, ExecutionError> {
        let statement = format!("EXPLAIN {}", sql.as_str());
        let result = self.run(timeout, move |conn| query(conn, &statement)).await?;

        // EXPLAIN yields (explain_key, explain_value) rows
        let plan = result
            .rows
            .iter()
            .filter_map(|row| row.last())
            .map(|value| match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(plan)
    }
}

fn query(conn: &Connection, sql: &str) -> Result<QueryResult, ExecutionError> {
    let started = Instant::now();
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;

    // Column metadata is only known once the statement has run
    let columns: Vec<String> = rows
        .as_ref()
        .map(|stmt| stmt.column_names())
        .unwrap_or_default();

    let mut result_rows = Vec::new();
    while let Some(row) = rows.next()? {
        let mut json_row = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            json_row.push(to_json(row.get_ref(i)?));
        }
        result_rows.push(json_row);
    }

    Ok(QueryResult {
        columns,
        row_count: result_rows.len(),
        rows: result_rows,
        execution_time_ms: started.elapsed().as_millis() as u64,
    })
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::Bool(b),
        ValueRef::TinyInt(i) => Value::from(i),
        ValueRef::SmallInt(i) => Value::from(i),
        ValueRef::Int(i) => Value::from(i),
        ValueRef::BigInt(i) => Value::from(i),
        ValueRef::HugeInt(i) => match i64::try_from(i) {
            Ok(small) => Value::from(small),
            Err(_) => Value::String(i.to_string()),
        },
        ValueRef::UTinyInt(i) => Value::from(i),
        ValueRef::USmallInt(i) => Value::from(i),
        ValueRef::UInt(i) => Value::from(i),
        ValueRef::UBigInt(i) => Value::from(i),
        ValueRef::Float(f) => json!(f),
        ValueRef::Double(f) => json!(f),
        ValueRef::Decimal(d) => {
            let text = d.to_string();
            match text.parse::<f64>() {
                Ok(f) => json!(f),
                Err(_) => Value::String(text),
            }
        }
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Date32(days) => UNIX_EPOCH_DAYS_FROM_CE
            .checked_add(days)
            .and_then(NaiveDate::from_num_days_from_ce_opt)
            .map(|date| Value::String(date.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null),
        ValueRef::Timestamp(unit, raw) => {
            let micros = match unit {
                TimeUnit::Second => raw.saturating_mul(1_000_000),
                TimeUnit::Millisecond => raw.saturating_mul(1_000),
                TimeUnit::Microsecond => raw,
                TimeUnit::Nanosecond => raw / 1_000,
            };
            DateTime::from_timestamp_micros(micros)
                .map(|ts| Value::String(ts.naive_utc().format("%Y-%m-%d %H:%M:%S%.f").to_string()))
                .unwrap_or(Value::Null)
        }
        other => Value::String(format!("{other:?}")),
    }
}
