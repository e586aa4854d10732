//! Shared test utilities: registry fixture and scripted collaborators

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cubeql_duck::{ExecutionError, QueryResult, Warehouse};
use cubeql_guard::ValidatedSql;
use cubeql_nl2sql::{CompletionProvider, LlmError, Nl2SqlPipeline, PipelineOptions, Prompt};
use cubeql_registry::CubeRegistry;
use serde_json::json;

pub const SALES_XML: &str = include_str!("../../../cubeql-schema/test_data/sales.xml");

pub fn sales_registry() -> Arc<CubeRegistry> {
    let registry = CubeRegistry::new();
    registry
        .ingest_str(SALES_XML)
        .unwrap_or_else(|e| panic!("Failed to ingest fixture: {}", e));
    Arc::new(registry)
}

/// Replies with a fixed completion and records every prompt it saw
pub struct ScriptedProvider {
    reply: Result<String, String>,
    delay: Option<Duration>,
    pub prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedProvider {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message.to_string()),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn stalled(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok("SELECT channel FROM fact_sales".to_string()),
            delay: Some(delay),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.clone().map_err(LlmError::Unavailable)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub enum Outcome {
    Rows,
    Timeout,
    Fail(&'static str),
}

/// Records every statement it is asked to run
pub struct FakeWarehouse {
    outcome: Outcome,
    pub executed: Mutex<Vec<String>>,
}

impl FakeWarehouse {
    pub fn new(outcome: Outcome) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            executed: Mutex::new(Vec::new()),
        })
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Warehouse for FakeWarehouse {
    async fn execute(
        &self,
        sql: &ValidatedSql,
        timeout: Duration,
    ) -> Result<QueryResult, ExecutionError> {
        self.executed.lock().unwrap().push(sql.as_str().to_string());
        match &self.outcome {
            Outcome::Rows => Ok(QueryResult {
                columns: vec!["channel".to_string(), "total".to_string()],
                rows: vec![vec![json!("web"), json!(200.0)], vec![json!("store"), json!(50.0)]],
                row_count: 2,
                execution_time_ms: 3,
            }),
            Outcome::Timeout => Err(ExecutionError::Timeout(timeout)),
            Outcome::Fail(message) => Err(ExecutionError::Database(message.to_string())),
        }
    }

    async fn explain(&self, _sql: &ValidatedSql, _timeout: Duration) -> Result<String, ExecutionError> {
        Ok(String::new())
    }
}

pub fn pipeline(
    registry: Arc<CubeRegistry>,
    provider: Arc<ScriptedProvider>,
    warehouse: Arc<FakeWarehouse>,
) -> Nl2SqlPipeline {
    let options = PipelineOptions {
        completion_timeout: Duration::from_millis(200),
        ..PipelineOptions::default()
    };
    Nl2SqlPipeline::new(registry, provider, warehouse, options)
}
