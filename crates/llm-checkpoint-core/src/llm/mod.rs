mod openai;
mod settings;

use async_trait::async_trait;
use thiserror::Error;

pub use openai::OpenAiCompletionClient;
pub use settings::{CompletionSettings, Sampling};

/// Failures of a single completion call. All of them surface as
/// `completion_unavailable`; the variants only sharpen the log line.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Transport(String),
    #[error("completion service error (HTTP {status}): {body}")]
    Status { status: u16, body: String },
    #[error("failed to parse completion response: {0}")]
    Malformed(String),
    #[error("completion service returned no text")]
    Empty,
}

/// Client abstraction for the language-model service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Generate text for `prompt` with the configured model.
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}
