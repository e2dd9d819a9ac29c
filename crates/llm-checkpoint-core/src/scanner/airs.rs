use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{header::ACCEPT, Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::{ScanAction, ScanClient, ScanError, ScanRole, ScanSettings, Verdict};
use crate::settings::ConfigError;

const SCAN_PATH: &str = "/v1/scan/sync/request";
const TOKEN_HEADER: &str = "x-pan-token";
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Synchronous-scan client for the AI Runtime Security API.
///
/// One POST per call, no retries. The HTTP client carries the configured
/// timeout so a stalled provider surfaces as [`ScanError::Unavailable`].
#[derive(Debug, Clone)]
pub struct AirsScanClient {
    http: Client,
    url: String,
    api_key: String,
    profile_name: String,
}

impl AirsScanClient {
    pub fn new(settings: &ScanSettings) -> Result<Self, ConfigError> {
        let url = format!("{}{}", settings.base_url(), SCAN_PATH);
        let http = Client::builder()
            .user_agent(concat!("llm-checkpoint/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.timeout)
            .build()
            .map_err(|err| ConfigError::HttpClient {
                service: "scanning service",
                reason: err.to_string(),
            })?;
        Ok(Self {
            http,
            url,
            api_key: settings.api_key.clone(),
            profile_name: settings.profile_name.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ScanClient for AirsScanClient {
    #[instrument(
        name = "airs.scan",
        skip(self, text),
        fields(role = %role, tr_id = transaction_id, chars = text.chars().count())
    )]
    async fn scan(
        &self,
        text: &str,
        role: ScanRole,
        transaction_id: &str,
    ) -> Result<Verdict, ScanError> {
        if text.trim().is_empty() {
            return Err(ScanError::EmptyText);
        }

        let payload = ScanRequest {
            tr_id: transaction_id,
            ai_profile: AiProfile {
                profile_name: &self.profile_name,
            },
            contents: vec![ScanContent::for_role(role, text)],
        };

        let response = self
            .http
            .post(&self.url)
            .header(TOKEN_HEADER, &self.api_key)
            .header(ACCEPT, "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|err| ScanError::unavailable(describe_transport_error(&err)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "scanning service rejected credentials");
            return Err(ScanError::Auth {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY_CHARS),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScanError::unavailable(format!(
                "HTTP {}: {}",
                status,
                truncate(&body, MAX_ERROR_BODY_CHARS)
            )));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|err| ScanError::unavailable(format!("malformed response body: {err}")))?;
        let verdict = parse_verdict(raw, transaction_id)?;
        debug!(
            category = %verdict.category,
            action = %verdict.action,
            detections = verdict.detections.len(),
            "scan verdict received"
        );
        Ok(verdict)
    }
}

/// Build a [`Verdict`] from a provider response body, taking category and action verbatim.
pub fn parse_verdict(raw: serde_json::Value, transaction_id: &str) -> Result<Verdict, ScanError> {
    let body: ScanResponse = serde_json::from_value(raw.clone())
        .map_err(|err| ScanError::unavailable(format!("unexpected response shape: {err}")))?;

    let category = body.category.trim();
    if category.is_empty() {
        return Err(ScanError::unavailable("response is missing a category"));
    }
    let action = match body.action.trim().to_ascii_lowercase().as_str() {
        "allow" => ScanAction::Allow,
        "block" => ScanAction::Block,
        other => {
            return Err(ScanError::unavailable(format!(
                "response carries unsupported action `{other}`"
            )))
        }
    };
    if let Some(echoed) = body.tr_id.as_deref() {
        if echoed != transaction_id {
            warn!(sent = transaction_id, echoed, "provider echoed a different transaction id");
        }
    }

    let detections = body
        .prompt_detected
        .iter()
        .chain(body.response_detected.iter())
        .filter(|(_, flagged)| flagged.as_bool() == Some(true))
        .map(|(name, _)| name.clone());

    let mut verdict =
        Verdict::new(category, action, transaction_id).with_detections(detections);
    verdict.scan_id = body.scan_id;
    verdict.report_id = body.report_id;
    verdict.raw_detail = without_echoed_content(raw);
    Ok(verdict)
}

/// Drop `*_masked_data` blocks, which repeat the scanned text.
fn without_echoed_content(mut raw: serde_json::Value) -> serde_json::Value {
    if let Some(fields) = raw.as_object_mut() {
        fields.retain(|key, _| !key.ends_with("_masked_data"));
    }
    raw
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        format!("request failed: {err}")
    }
}

fn truncate(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    input.chars().take(max_chars).collect::<String>() + "…"
}

#[derive(Serialize)]
struct ScanRequest<'a> {
    tr_id: &'a str,
    ai_profile: AiProfile<'a>,
    contents: Vec<ScanContent<'a>>,
}

#[derive(Serialize)]
struct AiProfile<'a> {
    profile_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum ScanContent<'a> {
    Prompt(&'a str),
    Response(&'a str),
}

impl<'a> ScanContent<'a> {
    fn for_role(role: ScanRole, text: &'a str) -> Self {
        match role {
            ScanRole::Prompt => Self::Prompt(text),
            ScanRole::Response => Self::Response(text),
        }
    }
}

#[derive(Deserialize)]
struct ScanResponse {
    category: String,
    action: String,
    #[serde(default)]
    tr_id: Option<String>,
    #[serde(default)]
    scan_id: Option<String>,
    #[serde(default)]
    report_id: Option<String>,
    #[serde(default)]
    prompt_detected: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    response_detected: BTreeMap<String, serde_json::Value>,
}
