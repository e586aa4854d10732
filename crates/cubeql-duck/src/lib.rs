//! Warehouse execution for validated SQL
//!
//! The [`Warehouse`] trait only accepts [`ValidatedSql`], so nothing reaches
//! the database without passing the safety gate first. [`DuckWarehouse`] runs
//! statements on DuckDB with a hard timeout and connection-scoped interrupt.

mod duck;

use std::time::Duration;

use async_trait::async_trait;
use cubeql_guard::ValidatedSql;
use serde::Serialize;
use thiserror::Error;

pub use duck::DuckWarehouse;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Query timed out after {} ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Execution task failed: {0}")]
    Join(String),
}

impl From<duckdb::Error> for ExecutionError {
    fn from(err: duckdb::Error) -> Self {
        ExecutionError::Database(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
    pub execution_time_ms: u64,
}

/// A SQL-executing service with EXPLAIN and timeout support
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Run a validated statement, giving up after `timeout`
    async fn execute(
        &self,
        sql: &ValidatedSql,
        timeout: Duration,
    ) -> Result<QueryResult, ExecutionError>;

    /// Plan text for a validated statement
    async fn explain(&self, sql: &ValidatedSql, timeout: Duration)
        -> Result<String, ExecutionError>;
}
