use std::time::Duration;

use cubeql_duck::ExecutionError;
use cubeql_guard::UnsafeQueryError;
use cubeql_registry::RegistryError;
use thiserror::Error;

use crate::{Artifact, LlmError, Stage};

/// Why an NL2SQL request stopped, discriminated by stage
#[derive(Debug, Error)]
pub enum Nl2SqlError {
    #[error("No cube metadata loaded. Upload a schema first.")]
    NoMetadata,

    #[error(transparent)]
    Metadata(#[from] RegistryError),

    #[error("The question is empty")]
    EmptyQuestion,

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("The model response contained no usable SQL")]
    Extraction,

    #[error("The query was rejected for safety reasons: {0}")]
    Unsafe(#[from] UnsafeQueryError),

    #[error("Query timed out after {} ms", .0.as_millis())]
    ExecutionTimeout(Duration),

    #[error("Query execution failed: {0}")]
    Execution(String),

    #[error("Stage {0} ran before its input was produced")]
    OutOfOrder(Stage),
}

impl Nl2SqlError {
    /// Stable machine-readable discriminator
    pub fn kind(&self) -> &'static str {
        match self {
            Nl2SqlError::NoMetadata | Nl2SqlError::Metadata(_) => "metadata",
            Nl2SqlError::EmptyQuestion => "invalid_request",
            Nl2SqlError::Llm(_) => "llm",
            Nl2SqlError::Extraction => "extraction",
            Nl2SqlError::Unsafe(_) => "unsafe_query",
            Nl2SqlError::ExecutionTimeout(_) => "execution_timeout",
            Nl2SqlError::Execution(_) => "execution",
            Nl2SqlError::OutOfOrder(_) => "internal",
        }
    }
}

impl From<ExecutionError> for Nl2SqlError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Timeout(after) => Nl2SqlError::ExecutionTimeout(after),
            other => Nl2SqlError::Execution(other.to_string()),
        }
    }
}

/// A failed request together with everything produced before the failure
#[derive(Debug, Error)]
#[error("{stage} stage failed: {error}")]
pub struct Nl2SqlFailure {
    pub stage: Stage,
    #[source]
    pub error: Nl2SqlError,
    pub artifact: Box<Artifact>,
}

impl Nl2SqlFailure {
    pub fn kind(&self) -> &'static str {
        self.error.kind()
    }
}
