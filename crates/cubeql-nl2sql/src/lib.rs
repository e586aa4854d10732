//! Natural-language questions to validated, executed SQL
//!
//! A request walks [`PIPELINE`] in order: schema summarization, prompt
//! assembly, completion, SQL extraction, validation through the shared
//! [`cubeql_guard::SafetyGate`], and bounded execution. The first failing
//! stage ends the request; nothing is retried.

mod error;
mod extract;
mod generate;
mod pipeline;
mod provider;
mod summary;

pub use error::{Nl2SqlError, Nl2SqlFailure};
pub use extract::extract_sql;
pub use generate::{schema_prompt, GenerateError, GeneratedSchema, SchemaGenerator};
pub use pipeline::{
    assemble_prompt, Artifact, Nl2SqlAnswer, Nl2SqlPipeline, PipelineOptions, Stage, PIPELINE,
};
pub use provider::{CompletionProvider, LlmError, Prompt};
pub use summary::{describe_cube, describe_cubes};
