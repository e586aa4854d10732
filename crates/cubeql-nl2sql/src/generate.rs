//! Draft Mondrian schemas from a plain-language description

use std::sync::Arc;
use std::time::Duration;

use cubeql_schema::{parse_str, SchemaError};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::{CompletionProvider, LlmError, Prompt};

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("The description is empty")]
    EmptyDescription,

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("The model response contained no schema document")]
    NoSchema,

    #[error("The generated schema is invalid: {0}")]
    Invalid(#[from] SchemaError),
}

impl GenerateError {
    pub fn kind(&self) -> &'static str {
        match self {
            GenerateError::EmptyDescription => "invalid_request",
            GenerateError::Llm(_) => "llm",
            GenerateError::NoSchema => "extraction",
            GenerateError::Invalid(_) => "schema",
        }
    }
}

/// A generated document that parsed cleanly. Nothing is registered.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedSchema {
    pub xml: String,
    pub schema: String,
    pub cubes: Vec<String>,
}

pub struct SchemaGenerator {
    provider: Arc<dyn CompletionProvider>,
    timeout: Duration,
}

impl SchemaGenerator {
    pub fn new(provider: Arc<dyn CompletionProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub async fn generate(&self, description: &str) -> Result<GeneratedSchema, GenerateError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(GenerateError::EmptyDescription);
        }

        let prompt = schema_prompt(description);
        let completion = tokio::time::timeout(self.timeout, self.provider.complete(&prompt))
            .await
            .map_err(|_| LlmError::Timeout(self.timeout))??;

        let xml = extract_schema(&completion).ok_or(GenerateError::NoSchema)?;
        let document = parse_str(xml).map_err(|err| {
            warn!(provider = self.provider.name(), error = %err, "Generated schema rejected");
            err
        })?;

        let cubes: Vec<String> = document.cubes.into_iter().map(|c| c.name).collect();
        info!(schema = %document.name, cubes = ?cubes, "Generated schema");
        Ok(GeneratedSchema {
            xml: xml.to_string(),
            schema: document.name,
            cubes,
        })
    }
}

pub fn schema_prompt(description: &str) -> Prompt {
    let system = "You are an expert in data warehouse modeling and Mondrian OLAP schemas. \
        Write one Mondrian XML schema for the star schema the user describes.\n\
        \n\
        Rules:\n\
        1. Use Schema, Cube, Table, Dimension, Hierarchy, Level and Measure elements.\n\
        2. Give every joined dimension a foreignKey and its hierarchy a primaryKey (default \"id\").\n\
        3. Give every measure an aggregator: sum, count, min, max, avg or distinct-count.\n\
        4. Use snake_case for table and column names and CamelCase for dimension and measure names.\n\
        5. Return only the XML document, starting with <?xml version=\"1.0\" encoding=\"UTF-8\"?>.\n\
        \n\
        Example:\n\
        <?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
        <Schema name=\"Example\">\n\
        \x20 <Cube name=\"Orders\">\n\
        \x20   <Table name=\"fact_orders\"/>\n\
        \x20   <Dimension name=\"Date\" foreignKey=\"date_id\">\n\
        \x20     <Hierarchy primaryKey=\"id\">\n\
        \x20       <Table name=\"dim_date\"/>\n\
        \x20       <Level name=\"Year\" column=\"year\"/>\n\
        \x20       <Level name=\"Month\" column=\"month\"/>\n\
        \x20     </Hierarchy>\n\
        \x20   </Dimension>\n\
        \x20   <Measure name=\"Amount\" column=\"amount\" aggregator=\"sum\" formatString=\"#,###\"/>\n\
        \x20 </Cube>\n\
        </Schema>"
        .to_string();
    let user = format!("Create a Mondrian cube schema for: {description}");
    Prompt { system, user }
}

/// The `<?xml ...?>` or `<Schema ...>` document in a response, through its
/// closing `</Schema>`. Markdown fences around it are ignored.
fn extract_schema(response: &str) -> Option<&str> {
    let start = response
        .find("<?xml")
        .or_else(|| response.find("<Schema"))?;
    let rest = &response[start..];
    let end = rest.rfind("</Schema>")? + "</Schema>".len();
    Some(&rest[..end])
}
