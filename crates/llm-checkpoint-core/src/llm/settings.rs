use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::settings::{duration_var, optional_var, required_var, ConfigError};

pub(crate) const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful, knowledgeable, and professional assistant.";

/// Environment-driven configuration for the completion client.
#[derive(Clone, PartialEq)]
pub struct CompletionSettings {
    pub api_key: String,
    pub model: String,
    pub endpoint: Option<String>,
    pub timeout: Duration,
    pub system_prompt: String,
    pub sampling: Sampling,
}

/// Generation parameters sent with every request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            max_tokens: 800,
        }
    }
}

impl CompletionSettings {
    pub const API_KEY_ENV: &'static str = "OPENAI_API_KEY";
    pub const MODEL_ENV: &'static str = "OPENAI_MODEL";
    pub const ENDPOINT_ENV: &'static str = "OPENAI_BASE_URL";
    pub const TIMEOUT_ENV: &'static str = "OPENAI_TIMEOUT";
    pub const MAX_TOKENS_ENV: &'static str = "OPENAI_MAX_TOKENS";

    const DEFAULT_MODEL: &'static str = "gpt-4o";
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Build settings from a variable map.
    ///
    /// * `OPENAI_API_KEY`: bearer token (required).
    /// * `OPENAI_MODEL`: model identifier (default: `gpt-4o`).
    /// * `OPENAI_BASE_URL`: OpenAI-compatible base URL.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let api_key = required_var(vars, Self::API_KEY_ENV)?;
        let model =
            optional_var(vars, Self::MODEL_ENV).unwrap_or_else(|| Self::DEFAULT_MODEL.to_string());
        let endpoint = optional_var(vars, Self::ENDPOINT_ENV);
        let timeout = duration_var(vars, Self::TIMEOUT_ENV, Self::DEFAULT_TIMEOUT)?;

        let mut sampling = Sampling::default();
        if let Some(raw) = optional_var(vars, Self::MAX_TOKENS_ENV) {
            sampling.max_tokens = raw
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ConfigError::Invalid {
                    key: Self::MAX_TOKENS_ENV,
                    value: raw.clone(),
                    reason: "expected a positive integer".into(),
                })?;
        }

        Ok(Self {
            api_key,
            model,
            endpoint,
            timeout,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            sampling,
        })
    }
}

impl fmt::Debug for CompletionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSettings")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .field("sampling", &self.sampling)
            .finish_non_exhaustive()
    }
}
