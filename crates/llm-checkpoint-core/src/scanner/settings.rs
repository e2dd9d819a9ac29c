use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::settings::{duration_var, optional_var, required_var, ConfigError};

/// Deployment region of the scanning service. Chosen statically at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    #[default]
    Us,
    /// Data-residency restricted deployment.
    Eu,
}

impl Region {
    pub fn base_url(self) -> &'static str {
        match self {
            Self::Us => "https://service.api.aisecurity.paloaltonetworks.com",
            Self::Eu => "https://service-de.api.aisecurity.paloaltonetworks.com",
        }
    }
}

impl FromStr for Region {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "us" | "default" => Ok(Self::Us),
            "eu" | "de" => Ok(Self::Eu),
            other => Err(format!("unknown region `{other}` (expected `us` or `eu`)")),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Us => f.write_str("us"),
            Self::Eu => f.write_str("eu"),
        }
    }
}

/// Immutable configuration for the scanning client.
#[derive(Clone, PartialEq, Eq)]
pub struct ScanSettings {
    pub api_key: String,
    pub profile_name: String,
    pub region: Region,
    /// Overrides the region base URL when set.
    pub endpoint: Option<String>,
    pub timeout: Duration,
}

impl ScanSettings {
    pub const API_KEY_ENV: &'static str = "PANW_AI_SEC_API_KEY";
    pub const PROFILE_ENV: &'static str = "PANW_AI_SEC_PROFILE_NAME";
    pub const REGION_ENV: &'static str = "PANW_AI_SEC_REGION";
    pub const ENDPOINT_ENV: &'static str = "PANW_AI_SEC_ENDPOINT";
    pub const TIMEOUT_ENV: &'static str = "PANW_AI_SEC_TIMEOUT";

    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Build settings from a variable map.
    ///
    /// * `PANW_AI_SEC_API_KEY`: API key sent as `x-pan-token` (required).
    /// * `PANW_AI_SEC_PROFILE_NAME`: security profile to scan against (required).
    /// * `PANW_AI_SEC_REGION`: `us` (default) or `eu`.
    /// * `PANW_AI_SEC_ENDPOINT`: explicit base URL, wins over the region.
    /// * `PANW_AI_SEC_TIMEOUT`: per-call timeout such as `10s` (default `30s`).
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let api_key = required_var(vars, Self::API_KEY_ENV)?;
        let profile_name = required_var(vars, Self::PROFILE_ENV)?;
        let region = match optional_var(vars, Self::REGION_ENV) {
            Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                key: Self::REGION_ENV,
                value: raw.clone(),
                reason,
            })?,
            None => Region::default(),
        };
        let endpoint = optional_var(vars, Self::ENDPOINT_ENV);
        let timeout = duration_var(vars, Self::TIMEOUT_ENV, Self::DEFAULT_TIMEOUT)?;

        Ok(Self {
            api_key,
            profile_name,
            region,
            endpoint,
            timeout,
        })
    }

    /// Base URL the client posts to, without trailing slash.
    pub fn base_url(&self) -> String {
        self.endpoint
            .as_deref()
            .unwrap_or_else(|| self.region.base_url())
            .trim_end_matches('/')
            .to_string()
    }
}

impl fmt::Debug for ScanSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanSettings")
            .field("api_key", &"<redacted>")
            .field("profile_name", &self.profile_name)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_to_us_region() {
        let settings = ScanSettings::from_map(&vars(&[
            (ScanSettings::API_KEY_ENV, "key"),
            (ScanSettings::PROFILE_ENV, "default-profile"),
        ]))
        .expect("settings should load");
        assert_eq!(settings.region, Region::Us);
        assert_eq!(settings.timeout, Duration::from_secs(30));
        assert_eq!(
            settings.base_url(),
            "https://service.api.aisecurity.paloaltonetworks.com"
        );
    }

    #[test]
    fn endpoint_override_wins_over_region() {
        let settings = ScanSettings::from_map(&vars(&[
            (ScanSettings::API_KEY_ENV, "key"),
            (ScanSettings::PROFILE_ENV, "p"),
            (ScanSettings::REGION_ENV, "eu"),
            (ScanSettings::ENDPOINT_ENV, "http://127.0.0.1:9000/"),
        ]))
        .unwrap();
        assert_eq!(settings.region, Region::Eu);
        assert_eq!(settings.base_url(), "http://127.0.0.1:9000");
    }

    #[test]
    fn missing_profile_is_reported_by_name() {
        let err = ScanSettings::from_map(&vars(&[(ScanSettings::API_KEY_ENV, "key")]))
            .expect_err("profile is required");
        assert!(err.to_string().contains(ScanSettings::PROFILE_ENV));
    }

    #[test]
    fn rejects_unknown_region() {
        let err = ScanSettings::from_map(&vars(&[
            (ScanSettings::API_KEY_ENV, "key"),
            (ScanSettings::PROFILE_ENV, "p"),
            (ScanSettings::REGION_ENV, "mars"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key, .. } if key == ScanSettings::REGION_ENV));
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let settings = ScanSettings::from_map(&vars(&[
            (ScanSettings::API_KEY_ENV, "super-secret"),
            (ScanSettings::PROFILE_ENV, "p"),
        ]))
        .unwrap();
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
