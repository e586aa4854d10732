//! Text-completion provider seam

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Completion provider unavailable: {0}")]
    Unavailable(String),

    #[error("Completion timed out after {} ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Completion provider returned no content")]
    EmptyResponse,

    #[error("Completion provider error: {0}")]
    Provider(String),
}

/// One completion request: fixed instructions plus the user turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// A black-box text-completion service.
///
/// Implementations must not retry on their own.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError>;

    /// Model or provider name for logs
    fn name(&self) -> &str;
}
