use std::collections::HashMap;
use std::ffi::OsString;
use std::time::Duration;

use thiserror::Error;

use crate::llm::CompletionSettings;
use crate::scanner::ScanSettings;

/// Startup configuration problems. Fatal: no exchange runs without valid settings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {key} must be set")]
    Missing { key: &'static str },
    #[error("invalid value `{value}` for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("failed to build HTTP client for {service}: {reason}")]
    HttpClient {
        service: &'static str,
        reason: String,
    },
}

/// Process-wide configuration for both upstream services, fixed at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub scan: ScanSettings,
    pub completion: CompletionSettings,
}

impl Settings {
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Ok(Self {
            scan: ScanSettings::from_map(vars)?,
            completion: CompletionSettings::from_map(vars)?,
        })
    }
}

/// Snapshot of the process environment, skipping entries that are not valid UTF-8.
pub fn process_env() -> HashMap<String, String> {
    utf8_vars(std::env::vars_os())
}

fn utf8_vars<I>(vars: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}

pub(crate) fn optional_var(vars: &HashMap<String, String>, key: &str) -> Option<String> {
    vars.get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn required_var(
    vars: &HashMap<String, String>,
    key: &'static str,
) -> Result<String, ConfigError> {
    optional_var(vars, key).ok_or(ConfigError::Missing { key })
}

pub(crate) fn duration_var(
    vars: &HashMap<String, String>,
    key: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let Some(raw) = optional_var(vars, key) else {
        return Ok(default);
    };
    let parsed = humantime::parse_duration(&raw).map_err(|err| ConfigError::Invalid {
        key,
        value: raw.clone(),
        reason: err.to_string(),
    })?;
    if parsed.is_zero() {
        return Err(ConfigError::Invalid {
            key,
            value: raw,
            reason: "timeout must be greater than zero".into(),
        });
    }
    Ok(parsed)
}
