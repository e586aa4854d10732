//! Pivot queries: registry lookup, drill folding, compile, gate, execute

use std::sync::Arc;
use std::time::Duration;

use cubeql_compiler::{compile, effective_config, CompileError, CompiledQuery, DrillState};
use cubeql_duck::{ExecutionError, Warehouse};
use cubeql_guard::{SafetyGate, UnsafeQueryError, ValidatedSql, Whitelist};
use cubeql_model::{Cube, PivotConfig};
use cubeql_registry::{CubeRegistry, RegistryError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum PivotError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Unsafe(#[from] UnsafeQueryError),

    #[error("Query timed out after {} ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Query execution failed: {0}")]
    Execution(String),
}

impl PivotError {
    pub fn kind(&self) -> &'static str {
        match self {
            PivotError::Registry(RegistryError::CubeNotFound(_)) => "unknown_cube",
            PivotError::Registry(_) => "metadata",
            PivotError::Compile(_) => "compile",
            PivotError::Unsafe(_) => "unsafe_query",
            PivotError::Timeout(_) => "execution_timeout",
            PivotError::Execution(_) => "execution",
        }
    }
}

impl From<ExecutionError> for PivotError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Timeout(after) => PivotError::Timeout(after),
            other => PivotError::Execution(other.to_string()),
        }
    }
}

/// Tool arguments for the pivot tools
#[derive(Debug, Clone, Deserialize)]
pub struct PivotRequest {
    pub cube: String,
    #[serde(flatten)]
    pub config: PivotConfig,
    /// Drill session whose expanded keys apply to this query
    #[serde(default)]
    pub session: Option<String>,
}

/// A compiled and validated pivot, not yet executed
#[derive(Debug, Clone)]
pub struct PreparedPivot {
    pub effective: PivotConfig,
    pub compiled: CompiledQuery,
    pub validated: ValidatedSql,
}

#[derive(Debug, Clone, Serialize)]
pub struct PivotPreview {
    pub sql: String,
    pub columns: Vec<String>,
    pub fingerprint: String,
    pub effective: PivotConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct PivotResponse {
    pub sql: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
    pub execution_time_ms: u64,
}

pub struct PivotService {
    registry: Arc<CubeRegistry>,
    warehouse: Arc<dyn Warehouse>,
    query_timeout: Duration,
}

impl PivotService {
    pub fn new(
        registry: Arc<CubeRegistry>,
        warehouse: Arc<dyn Warehouse>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            warehouse,
            query_timeout,
        }
    }

    pub fn prepare(
        &self,
        cube: &str,
        base: &PivotConfig,
        drill: &DrillState,
    ) -> Result<PreparedPivot, PivotError> {
        let cube = self.registry.get(cube)?;
        let effective = effective_config(&cube, base, drill);
        let compiled = compile(&cube, &effective)?;
        let validated = gate_for(&cube).validate(&compiled.sql).map_err(|err| {
            // Compiled SQL failing the gate means the compiler and the whitelist disagree
            warn!(cube = %cube.name, rule = err.rule.code(), sql = %compiled.sql, "Compiled pivot rejected");
            err
        })?;

        debug!(
            cube = %cube.name,
            fingerprint = %compiled.fingerprint(),
            drilled = drill.len(),
            "Pivot prepared"
        );
        Ok(PreparedPivot {
            effective,
            compiled,
            validated,
        })
    }

    pub fn preview(
        &self,
        cube: &str,
        base: &PivotConfig,
        drill: &DrillState,
    ) -> Result<PivotPreview, PivotError> {
        let prepared = self.prepare(cube, base, drill)?;
        Ok(PivotPreview {
            fingerprint: prepared.compiled.fingerprint(),
            sql: prepared.validated.into_string(),
            columns: prepared.compiled.columns,
            effective: prepared.effective,
        })
    }

    pub async fn execute(
        &self,
        cube: &str,
        base: &PivotConfig,
        drill: &DrillState,
    ) -> Result<PivotResponse, PivotError> {
        let prepared = self.prepare(cube, base, drill)?;
        let result = self
            .warehouse
            .execute(&prepared.validated, self.query_timeout)
            .await?;
        Ok(PivotResponse {
            sql: prepared.validated.into_string(),
            columns: result.columns,
            rows: result.rows,
            row_count: result.row_count,
            execution_time_ms: result.execution_time_ms,
        })
    }

    pub async fn explain(
        &self,
        cube: &str,
        base: &PivotConfig,
        drill: &DrillState,
    ) -> Result<String, PivotError> {
        let prepared = self.prepare(cube, base, drill)?;
        Ok(self
            .warehouse
            .explain(&prepared.validated, self.query_timeout)
            .await?)
    }
}

fn gate_for(cube: &Cube) -> SafetyGate {
    SafetyGate::new(Whitelist::from_cube(cube))
}
