use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cubeql_duck::{QueryResult, Warehouse};
use cubeql_guard::{SafetyGate, ValidatedSql, Whitelist};
use cubeql_model::{Cube, ROW_CAP};
use cubeql_registry::CubeRegistry;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{describe_cubes, extract_sql, CompletionProvider, LlmError, Nl2SqlError, Nl2SqlFailure, Prompt};

/// One step of the pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Summarize,
    AssemblePrompt,
    Complete,
    Extract,
    Validate,
    Execute,
}

/// Every request walks this list front to back and stops at the first failure
pub const PIPELINE: [Stage; 6] = [
    Stage::Summarize,
    Stage::AssemblePrompt,
    Stage::Complete,
    Stage::Extract,
    Stage::Validate,
    Stage::Execute,
];

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Summarize => "summarize",
            Stage::AssemblePrompt => "assemble_prompt",
            Stage::Complete => "complete",
            Stage::Extract => "extract",
            Stage::Validate => "validate",
            Stage::Execute => "execute",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything one request produced, stage by stage. Lives for one request.
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub request_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub question: String,
    pub cube: Option<String>,
    pub schema_summary: Option<String>,
    pub prompt: Option<Prompt>,
    pub completion: Option<String>,
    pub extracted_sql: Option<String>,
    pub validated: Option<ValidatedSql>,
    pub result: Option<QueryResult>,
    pub completed: Vec<Stage>,
    #[serde(skip)]
    cubes: Vec<Arc<Cube>>,
}

impl Artifact {
    fn new(question: &str, cube: Option<&str>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            started_at: Utc::now(),
            question: question.to_string(),
            cube: cube.map(str::to_string),
            schema_summary: None,
            prompt: None,
            completion: None,
            extracted_sql: None,
            validated: None,
            result: None,
            completed: Vec::new(),
            cubes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Nl2SqlAnswer {
    pub request_id: Uuid,
    pub sql: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub completion_timeout: Duration,
    pub query_timeout: Duration,
    /// Dialect named in the prompt
    pub dialect: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            completion_timeout: Duration::from_secs(60),
            query_timeout: Duration::from_secs(30),
            dialect: "DuckDB".to_string(),
        }
    }
}

pub struct Nl2SqlPipeline {
    registry: Arc<CubeRegistry>,
    provider: Arc<dyn CompletionProvider>,
    warehouse: Arc<dyn Warehouse>,
    options: PipelineOptions,
}

impl Nl2SqlPipeline {
    pub fn new(
        registry: Arc<CubeRegistry>,
        provider: Arc<dyn CompletionProvider>,
        warehouse: Arc<dyn Warehouse>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            registry,
            provider,
            warehouse,
            options,
        }
    }

    /// Answer a question end to end
    pub async fn ask(
        &self,
        question: &str,
        cube: Option<&str>,
    ) -> Result<Nl2SqlAnswer, Nl2SqlFailure> {
        let mut artifact = self.run(question, cube, Stage::Execute).await?;
        match (artifact.validated.take(), artifact.result.take()) {
            (Some(validated), Some(result)) => Ok(Nl2SqlAnswer {
                request_id: artifact.request_id,
                sql: validated.into_string(),
                columns: result.columns,
                rows: result.rows,
                row_count: result.row_count,
                execution_time_ms: result.execution_time_ms,
            }),
            _ => Err(Nl2SqlFailure {
                stage: Stage::Execute,
                error: Nl2SqlError::OutOfOrder(Stage::Execute),
                artifact: Box::new(artifact),
            }),
        }
    }

    /// Run every stage up to and including validation; nothing is executed
    pub async fn preview(
        &self,
        question: &str,
        cube: Option<&str>,
    ) -> Result<Artifact, Nl2SqlFailure> {
        self.run(question, cube, Stage::Validate).await
    }

    async fn run(
        &self,
        question: &str,
        cube: Option<&str>,
        last: Stage,
    ) -> Result<Artifact, Nl2SqlFailure> {
        let mut artifact = Artifact::new(question, cube);
        info!(
            request_id = %artifact.request_id,
            cube = cube.unwrap_or("*"),
            provider = self.provider.name(),
            "NL2SQL request"
        );

        for stage in PIPELINE {
            if let Err(error) = self.run_stage(stage, &mut artifact).await {
                warn!(
                    request_id = %artifact.request_id,
                    stage = %stage,
                    kind = error.kind(),
                    error = %error,
                    "NL2SQL request failed"
                );
                return Err(Nl2SqlFailure {
                    stage,
                    error,
                    artifact: Box::new(artifact),
                });
            }
            artifact.completed.push(stage);
            debug!(request_id = %artifact.request_id, stage = %stage, "Stage complete");
            if stage == last {
                break;
            }
        }
        Ok(artifact)
    }

    async fn run_stage(&self, stage: Stage, artifact: &mut Artifact) -> Result<(), Nl2SqlError> {
        match stage {
            Stage::Summarize => {
                let cubes: Vec<Arc<Cube>> = match &artifact.cube {
                    Some(name) => vec![self.registry.get(name)?],
                    None => self.registry.snapshot().values().cloned().collect(),
                };
                if cubes.is_empty() {
                    return Err(Nl2SqlError::NoMetadata);
                }
                artifact.schema_summary = Some(describe_cubes(cubes.iter().map(|c| c.as_ref())));
                artifact.cubes = cubes;
            }
            Stage::AssemblePrompt => {
                if artifact.question.trim().is_empty() {
                    return Err(Nl2SqlError::EmptyQuestion);
                }
                let summary = require(stage, &artifact.schema_summary)?;
                artifact.prompt = Some(assemble_prompt(
                    summary,
                    &artifact.question,
                    &self.options.dialect,
                ));
            }
            Stage::Complete => {
                let prompt = require(stage, &artifact.prompt)?;
                let after = self.options.completion_timeout;
                let completion = tokio::time::timeout(after, self.provider.complete(prompt))
                    .await
                    .map_err(|_| LlmError::Timeout(after))??;
                artifact.completion = Some(completion);
            }
            Stage::Extract => {
                let completion = require(stage, &artifact.completion)?;
                let sql = extract_sql(completion).ok_or(Nl2SqlError::Extraction)?;
                artifact.extracted_sql = Some(sql);
            }
            Stage::Validate => {
                let sql = require(stage, &artifact.extracted_sql)?;
                let whitelist = Whitelist::from_cubes(artifact.cubes.iter().map(|c| c.as_ref()));
                let validated = SafetyGate::new(whitelist).validate(sql)?;
                artifact.validated = Some(validated);
            }
            Stage::Execute => {
                let validated = require(stage, &artifact.validated)?;
                let result = self
                    .warehouse
                    .execute(validated, self.options.query_timeout)
                    .await?;
                artifact.result = Some(result);
            }
        }
        Ok(())
    }
}

fn require<T>(stage: Stage, input: &Option<T>) -> Result<&T, Nl2SqlError> {
    input.as_ref().ok_or(Nl2SqlError::OutOfOrder(stage))
}

/// Fixed instruction block plus the question
pub fn assemble_prompt(schema_summary: &str, question: &str, dialect: &str) -> Prompt {
    let system = format!(
        "You are an expert SQL analyst. Write one {dialect} query that answers the user's \
         question using only the schema below.\n\
         \n\
         Rules:\n\
         1. Return only the SQL inside a ```sql code block, with no explanation.\n\
         2. Write a single read-only SELECT (or WITH ... SELECT) statement. Never modify data.\n\
         3. Use only the tables and columns listed in the schema. Join dimension tables on the listed join keys.\n\
         4. Name every column explicitly. Do not use SELECT *.\n\
         5. Do not write SQL comments.\n\
         6. When aggregating, GROUP BY every non-aggregated column.\n\
         7. Always end with LIMIT {ROW_CAP} or a smaller limit.\n\
         \n\
         Schema:\n\
         {schema_summary}"
    );
    let user = format!("Question: {}\n\nWrite the {dialect} query:", question.trim());
    Prompt { system, user }
}
