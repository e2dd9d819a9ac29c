use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use llm_checkpoint_core::settings::process_env;
use llm_checkpoint_core::{CompletionSettings, ScanSettings};
use serde::Deserialize;

/// Optional settings file (TOML, YAML or JSON). Environment variables win over it.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub scan: ScanSection,
    #[serde(default)]
    pub completion: CompletionSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanSection {
    pub api_key: Option<String>,
    pub profile_name: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub timeout: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompletionSection {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Option<String>,
    pub max_tokens: Option<u32>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .with_context(|| format!("failed to read config file {}", path.display()))?
            .try_deserialize()
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Flatten into the environment-variable keys the core settings understand.
    fn into_vars(self) -> HashMap<String, String> {
        let entries = [
            (ScanSettings::API_KEY_ENV, self.scan.api_key),
            (ScanSettings::PROFILE_ENV, self.scan.profile_name),
            (ScanSettings::REGION_ENV, self.scan.region),
            (ScanSettings::ENDPOINT_ENV, self.scan.endpoint),
            (ScanSettings::TIMEOUT_ENV, self.scan.timeout),
            (CompletionSettings::API_KEY_ENV, self.completion.api_key),
            (CompletionSettings::MODEL_ENV, self.completion.model),
            (CompletionSettings::ENDPOINT_ENV, self.completion.base_url),
            (CompletionSettings::TIMEOUT_ENV, self.completion.timeout),
            (
                CompletionSettings::MAX_TOKENS_ENV,
                self.completion.max_tokens.map(|n| n.to_string()),
            ),
        ];
        entries
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| (key.to_string(), v)))
            .collect()
    }
}

/// Merge the optional config file with the process environment.
pub fn settings_vars(config_path: Option<&Path>) -> Result<HashMap<String, String>> {
    let mut vars = match config_path {
        Some(path) => FileConfig::load(path)?.into_vars(),
        None => HashMap::new(),
    };
    vars.extend(
        process_env()
            .into_iter()
            .filter(|(_, value)| !value.trim().is_empty()),
    );
    Ok(vars)
}
