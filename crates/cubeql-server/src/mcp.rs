//! MCP (Model Context Protocol) server implementation

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use cubeql_compiler::DrillKey;
use cubeql_nl2sql::{
    describe_cube, GenerateError, Nl2SqlError, Nl2SqlFailure, Nl2SqlPipeline, SchemaGenerator,
};
use cubeql_registry::{CubeRegistry, RegistryError};
use rust_mcp_schema::{
    schema_utils::CallToolError, CallToolRequest, CallToolResult, ContentBlock, Implementation,
    InitializeResult, ListToolsRequest, ListToolsResult, RpcError, ServerCapabilities,
    ServerCapabilitiesTools, TextContent, Tool, ToolInputSchema, LATEST_PROTOCOL_VERSION,
};
use rust_mcp_sdk::{mcp_server::ServerHandler, McpServer};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::catalog::{render_markdown, CubeListing};
use crate::metrics::{Metrics, QueryKind};
use crate::query::{PivotError, PivotRequest, PivotService};
use crate::session::SessionStore;

/// CubeQL MCP Server Handler
pub struct CubeQlServerHandler {
    registry: Arc<CubeRegistry>,
    pivot: PivotService,
    nl2sql: Nl2SqlPipeline,
    generator: SchemaGenerator,
    sessions: SessionStore,
    metrics: Metrics,
    /// Registry snapshot rewritten after every upload
    snapshot: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct CubeArgs {
    cube: String,
    #[serde(default)]
    format: DescribeFormat,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum DescribeFormat {
    #[default]
    Markdown,
    Json,
    Prompt,
}

#[derive(Debug, Deserialize)]
struct UploadArgs {
    xml: String,
}

#[derive(Debug, Deserialize)]
struct GenerateArgs {
    description: String,
}

#[derive(Debug, Deserialize)]
struct DrillToggleArgs {
    session: String,
    #[serde(flatten)]
    key: DrillKey,
}

#[derive(Debug, Deserialize)]
struct SessionArgs {
    session: String,
}

#[derive(Debug, Deserialize)]
struct QuestionArgs {
    question: String,
    #[serde(default)]
    cube: Option<String>,
}

impl CubeQlServerHandler {
    pub fn new(
        registry: Arc<CubeRegistry>,
        pivot: PivotService,
        nl2sql: Nl2SqlPipeline,
        generator: SchemaGenerator,
        sessions: SessionStore,
        metrics: Metrics,
        snapshot: Option<PathBuf>,
    ) -> Self {
        Self {
            registry,
            pivot,
            nl2sql,
            generator,
            sessions,
            metrics,
            snapshot,
        }
    }

    /// Create server initialization details
    pub fn server_info() -> InitializeResult {
        InitializeResult {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ServerCapabilitiesTools { list_changed: None }),
                ..Default::default()
            },
            server_info: Implementation {
                name: "cubeql-server".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("CubeQL OLAP Cube Query Server".to_string()),
            },
            instructions: Some(
                "CubeQL Server - pivot queries and natural language questions over OLAP cubes. \
                 Start with 'list_cubes' and 'describe_cube', then use 'pivot_query' for \
                 structured queries or 'nl_query' for natural language."
                    .to_string(),
            ),
            meta: None,
        }
    }

    /// Define available MCP tools
    fn tools() -> Vec<Tool> {
        let pivot_properties = || {
            vec![
                ("cube", property("string", "Cube name")),
                (
                    "rows",
                    property("array", "Row levels as {\"dimension\", \"level\"} objects"),
                ),
                (
                    "columns",
                    property("array", "Column levels as {\"dimension\", \"level\"} objects"),
                ),
                (
                    "measures",
                    property(
                        "array",
                        "Measure names, or {\"name\", \"aggregator\"} to override the aggregator",
                    ),
                ),
                (
                    "filters",
                    property(
                        "array",
                        "Filters as {\"dimension\", \"level\", \"operator\", \"values\"}; \
                         operators: =, !=, in, not in, <, <=, >, >=, between, like",
                    ),
                ),
                (
                    "session",
                    property("string", "Drill session whose expanded members apply"),
                ),
            ]
        };
        let drill_properties = vec![
            ("session", property("string", "Caller-chosen drill session id")),
            ("axis", property("string", "\"row\" or \"column\"")),
            ("dimension", property("string", "Dimension of the member")),
            ("level", property("string", "Level of the member")),
            ("value", property("string", "Member value (string or number)")),
        ];

        vec![
            tool("list_cubes", "List registered cubes with their dimensions and measures.", &[], vec![]),
            tool(
                "describe_cube",
                "Describe one cube: tables, joins, levels and measures. \
                 Format is 'markdown' (default), 'json' or 'prompt'.",
                &["cube"],
                vec![
                    ("cube", property("string", "Cube name")),
                    ("format", property("string", "markdown, json or prompt")),
                ],
            ),
            tool(
                "upload_schema",
                "Register every cube of a Mondrian XML schema, replacing cubes of the same name.",
                &["xml"],
                vec![("xml", property("string", "Schema XML document"))],
            ),
            tool(
                "generate_schema",
                "Draft a Mondrian XML schema from a description of the data. The draft is \
                 parsed before it is returned but not registered; pass it to 'upload_schema'.",
                &["description"],
                vec![(
                    "description",
                    property("string", "Facts, dimensions and measures to model"),
                )],
            ),
            tool(
                "pivot_query",
                "Run a pivot query. Returns the executed SQL, columns and at most 1000 rows.",
                &["cube"],
                pivot_properties(),
            ),
            tool(
                "pivot_sql",
                "Compile a pivot query and return its validated SQL without executing it.",
                &["cube"],
                pivot_properties(),
            ),
            tool(
                "pivot_explain",
                "Return the warehouse query plan for a pivot query.",
                &["cube"],
                pivot_properties(),
            ),
            tool(
                "drill_toggle",
                "Expand or collapse one member in a drill session. Expanded members add the next \
                 level of their dimension and restrict the drilled level to the member.",
                &["session", "axis", "dimension", "level", "value"],
                drill_properties,
            ),
            tool(
                "drill_reset",
                "Collapse every member of a drill session.",
                &["session"],
                vec![("session", property("string", "Drill session id"))],
            ),
            tool(
                "nl_query",
                "Answer a natural language question: generate SQL from cube metadata, validate \
                 it and execute it.",
                &["question"],
                vec![
                    ("question", property("string", "Natural language question")),
                    ("cube", property("string", "Restrict the question to one cube")),
                ],
            ),
            tool(
                "nl_preview",
                "Generate and validate SQL for a natural language question without executing it.",
                &["question"],
                vec![
                    ("question", property("string", "Natural language question")),
                    ("cube", property("string", "Restrict the question to one cube")),
                ],
            ),
            tool("metrics", "Server metrics in Prometheus text format.", &[], vec![]),
        ]
    }

    /// Route one tool call
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<CallToolResult, CallToolError> {
        match name {
            "list_cubes" => self.list_cubes(),
            "describe_cube" => self.describe_cube(parse_args(arguments)?),
            "upload_schema" => self.upload_schema(parse_args(arguments)?),
            "generate_schema" => {
                let args = parse_args(arguments)?;
                self.generate_schema(args).await
            }
            "pivot_query" => {
                let args = parse_args(arguments)?;
                self.pivot_query(args).await
            }
            "pivot_sql" => self.pivot_sql(parse_args(arguments)?),
            "pivot_explain" => {
                let args = parse_args(arguments)?;
                self.pivot_explain(args).await
            }
            "drill_toggle" => self.drill_toggle(parse_args(arguments)?),
            "drill_reset" => self.drill_reset(parse_args(arguments)?),
            "nl_query" => {
                let args = parse_args(arguments)?;
                self.nl_query(args).await
            }
            "nl_preview" => {
                let args = parse_args(arguments)?;
                self.nl_preview(args).await
            }
            "metrics" => self.render_metrics(),
            _ => Err(CallToolError::unknown_tool(name.to_string())),
        }
    }

    fn list_cubes(&self) -> Result<CallToolResult, CallToolError> {
        let snapshot = self.registry.snapshot();
        let cubes: Vec<CubeListing> = snapshot
            .values()
            .map(|cube| CubeListing::from_cube(cube))
            .collect();
        json_result(&json!({ "cubes": cubes }))
    }

    fn describe_cube(&self, args: CubeArgs) -> Result<CallToolResult, CallToolError> {
        let cube = match self.registry.get(&args.cube) {
            Ok(cube) => cube,
            Err(err) => return Ok(registry_failure(&err)),
        };
        match args.format {
            DescribeFormat::Markdown => Ok(text_result(render_markdown(&cube))),
            DescribeFormat::Json => json_result(cube.as_ref()),
            DescribeFormat::Prompt => Ok(text_result(describe_cube(&cube))),
        }
    }

    fn upload_schema(&self, args: UploadArgs) -> Result<CallToolResult, CallToolError> {
        let registered = match self.registry.ingest_str(&args.xml) {
            Ok(names) => names,
            Err(err) => {
                warn!(error = %err, "Schema upload rejected");
                return Ok(registry_failure(&err));
            }
        };
        info!(cubes = ?registered, "Schema uploaded");

        if let Some(path) = &self.snapshot {
            if let Err(err) = self.registry.save_snapshot(path) {
                warn!(path = %path.display(), error = %err, "Failed to save registry snapshot");
            }
        }
        json_result(&json!({
            "registered": registered,
            "cubes": self.registry.list(),
        }))
    }

    async fn generate_schema(&self, args: GenerateArgs) -> Result<CallToolResult, CallToolError> {
        match self.generator.generate(&args.description).await {
            Ok(generated) => json_result(&generated),
            Err(err) => {
                let mut body = json!({ "error": err.kind(), "message": err.to_string() });
                if let GenerateError::Invalid(schema) = &err {
                    body["detail"] = json!(schema.to_string());
                }
                Ok(error_result(body))
            }
        }
    }

    async fn pivot_query(&self, request: PivotRequest) -> Result<CallToolResult, CallToolError> {
        let started = Instant::now();
        let drill = self.drill_state(request.session.as_deref());
        let outcome = self
            .pivot
            .execute(&request.cube, &request.config, &drill)
            .await;

        let label = outcome.as_ref().map_or_else(PivotError::kind, |_| "ok");
        self.metrics
            .observe_query(QueryKind::Pivot, label, started.elapsed());

        match outcome {
            Ok(response) => {
                info!(cube = %request.cube, rows = response.row_count, "Pivot query executed");
                json_result(&response)
            }
            Err(err) => Ok(self.pivot_failure(&err)),
        }
    }

    fn pivot_sql(&self, request: PivotRequest) -> Result<CallToolResult, CallToolError> {
        let drill = self.drill_state(request.session.as_deref());
        match self.pivot.preview(&request.cube, &request.config, &drill) {
            Ok(preview) => json_result(&preview),
            Err(err) => Ok(self.pivot_failure(&err)),
        }
    }

    async fn pivot_explain(&self, request: PivotRequest) -> Result<CallToolResult, CallToolError> {
        let drill = self.drill_state(request.session.as_deref());
        match self
            .pivot
            .explain(&request.cube, &request.config, &drill)
            .await
        {
            Ok(plan) => Ok(text_result(plan)),
            Err(err) => Ok(self.pivot_failure(&err)),
        }
    }

    fn drill_toggle(&self, args: DrillToggleArgs) -> Result<CallToolResult, CallToolError> {
        let (expanded, keys) = self.sessions.toggle(&args.session, args.key);
        debug!(session = %args.session, expanded, keys, live = self.sessions.len(), "Drill toggled");
        json_result(&json!({
            "session": args.session,
            "expanded": expanded,
            "keys": keys,
        }))
    }

    fn drill_reset(&self, args: SessionArgs) -> Result<CallToolResult, CallToolError> {
        let cleared = self.sessions.reset(&args.session);
        json_result(&json!({ "session": args.session, "cleared": cleared }))
    }

    async fn nl_query(&self, args: QuestionArgs) -> Result<CallToolResult, CallToolError> {
        let started = Instant::now();
        let outcome = self.nl2sql.ask(&args.question, args.cube.as_deref()).await;

        let label = outcome.as_ref().map_or_else(Nl2SqlFailure::kind, |_| "ok");
        self.metrics
            .observe_query(QueryKind::NaturalLanguage, label, started.elapsed());

        match outcome {
            Ok(answer) => json_result(&answer),
            Err(failure) => Ok(self.nl2sql_failure(&failure)),
        }
    }

    async fn nl_preview(&self, args: QuestionArgs) -> Result<CallToolResult, CallToolError> {
        match self
            .nl2sql
            .preview(&args.question, args.cube.as_deref())
            .await
        {
            Ok(artifact) => json_result(&artifact),
            Err(failure) => Ok(self.nl2sql_failure(&failure)),
        }
    }

    fn render_metrics(&self) -> Result<CallToolResult, CallToolError> {
        self.metrics
            .render()
            .map(text_result)
            .map_err(|e| CallToolError::from_message(format!("Failed to render metrics: {}", e)))
    }

    fn drill_state(&self, session: Option<&str>) -> cubeql_compiler::DrillState {
        session
            .map(|id| self.sessions.state(id))
            .unwrap_or_default()
    }

    fn pivot_failure(&self, err: &PivotError) -> CallToolResult {
        let mut body = json!({ "error": err.kind(), "message": err.to_string() });
        if let PivotError::Unsafe(rejected) = err {
            self.metrics.record_rejection(rejected.rule.code());
            body["rule"] = json!(rejected.rule.code());
        }
        error_result(body)
    }

    fn nl2sql_failure(&self, failure: &Nl2SqlFailure) -> CallToolResult {
        let mut body = json!({
            "error": failure.kind(),
            "stage": failure.stage,
            "message": failure.error.to_string(),
            "request_id": failure.artifact.request_id,
        });
        if let Some(sql) = &failure.artifact.extracted_sql {
            body["sql"] = json!(sql);
        }
        if let Nl2SqlError::Unsafe(rejected) = &failure.error {
            self.metrics.record_rejection(rejected.rule.code());
            body["rule"] = json!(rejected.rule.code());
        }
        error_result(body)
    }
}

#[async_trait]
impl ServerHandler for CubeQlServerHandler {
    async fn handle_list_tools_request(
        &self,
        _request: ListToolsRequest,
        _runtime: Arc<dyn McpServer>,
    ) -> std::result::Result<ListToolsResult, RpcError> {
        info!("Listing available tools");

        Ok(ListToolsResult {
            tools: Self::tools(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn handle_call_tool_request(
        &self,
        request: CallToolRequest,
        _runtime: Arc<dyn McpServer>,
    ) -> std::result::Result<CallToolResult, CallToolError> {
        let request_id = Uuid::new_v4();
        let span = info_span!("tool", name = %request.params.name, %request_id);
        async move {
            info!("Tool called");
            self.dispatch(&request.params.name, request.params.arguments)
                .await
        }
        .instrument(span)
        .await
    }
}

fn property(kind: &str, description: &str) -> Map<String, Value> {
    let mut prop = Map::new();
    prop.insert("type".to_string(), Value::String(kind.to_string()));
    prop.insert(
        "description".to_string(),
        Value::String(description.to_string()),
    );
    prop
}

fn tool(
    name: &str,
    description: &str,
    required: &[&str],
    properties: Vec<(&str, Map<String, Value>)>,
) -> Tool {
    let properties: HashMap<String, Map<String, Value>> = properties
        .into_iter()
        .map(|(key, prop)| (key.to_string(), prop))
        .collect();
    Tool {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema: ToolInputSchema::new(
            required.iter().map(|r| r.to_string()).collect(),
            Some(properties),
        ),
        title: None,
        annotations: None,
        meta: None,
        output_schema: None,
    }
}

fn parse_args<T: DeserializeOwned>(
    arguments: Option<Map<String, Value>>,
) -> Result<T, CallToolError> {
    serde_json::from_value(Value::Object(arguments.unwrap_or_default()))
        .map_err(|e| CallToolError::from_message(format!("Invalid arguments: {}", e)))
}

fn text_result(text: String) -> CallToolResult {
    CallToolResult {
        content: vec![ContentBlock::TextContent(TextContent::new(text, None, None))],
        is_error: None,
        meta: None,
        structured_content: None,
    }
}

fn json_result<T: Serialize + ?Sized>(value: &T) -> Result<CallToolResult, CallToolError> {
    serde_json::to_string_pretty(value)
        .map(text_result)
        .map_err(|e| CallToolError::from_message(format!("Failed to serialize result: {}", e)))
}

/// Failures the caller can act on come back as a structured tool error
fn error_result(body: Value) -> CallToolResult {
    CallToolResult {
        is_error: Some(true),
        ..text_result(body.to_string())
    }
}

fn registry_failure(err: &RegistryError) -> CallToolResult {
    let kind = match err {
        RegistryError::CubeNotFound(_) => "unknown_cube",
        RegistryError::Schema(_) => "schema",
        _ => "metadata",
    };
    error_result(json!({ "error": kind, "message": err.to_string() }))
}
