use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod airs;
pub mod settings;

pub use settings::{Region, ScanSettings};

/// Which side of the exchange a piece of scanned text belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanRole {
    Prompt,
    Response,
}

impl ScanRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Response => "response",
        }
    }
}

impl fmt::Display for ScanRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action recommended by the scanning provider. Authoritative for the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanAction {
    Allow,
    Block,
}

impl fmt::Display for ScanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => f.write_str("allow"),
            Self::Block => f.write_str("block"),
        }
    }
}

/// Result of exactly one scan call.
///
/// Verdicts are never cached or reused: the input and output scans of a turn
/// each produce their own, correlated only through `transaction_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Provider classification label (`benign`, `malicious`, `prompt_injection`, ...).
    pub category: String,
    pub action: ScanAction,
    /// Correlation id supplied by the caller for this scan call.
    pub transaction_id: String,
    /// Detector names the provider flagged, sorted and de-duplicated.
    #[serde(default)]
    pub detections: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    /// Provider payload minus any echoed content, for diagnostics only. Never serialized.
    #[serde(default, skip_serializing)]
    pub raw_detail: serde_json::Value,
}

impl Verdict {
    /// Minimal verdict with no detections or provider ids.
    pub fn new(
        category: impl Into<String>,
        action: ScanAction,
        transaction_id: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            action,
            transaction_id: transaction_id.into(),
            detections: Vec::new(),
            scan_id: None,
            report_id: None,
            raw_detail: serde_json::Value::Null,
        }
    }

    pub fn with_detections<I, S>(mut self, detections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = detections.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();
        self.detections = names;
        self
    }
}

/// Coarse fault classification surfaced to callers in place of a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamErrorKind {
    ScanUnavailable,
    ScanAuth,
    CompletionUnavailable,
}

impl fmt::Display for UpstreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScanUnavailable => f.write_str("scan_unavailable"),
            Self::ScanAuth => f.write_str("scan_auth"),
            Self::CompletionUnavailable => f.write_str("completion_unavailable"),
        }
    }
}

/// Failures of a single scan call. None of them are retried.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scanning service rejected the credentials (HTTP {status}): {body}")]
    Auth { status: u16, body: String },
    #[error("scanning service unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("scan text must not be empty")]
    EmptyText,
}

impl ScanError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> UpstreamErrorKind {
        match self {
            Self::Auth { .. } => UpstreamErrorKind::ScanAuth,
            Self::Unavailable { .. } | Self::EmptyText => UpstreamErrorKind::ScanUnavailable,
        }
    }
}

/// Fresh correlation id for one scan call.
pub fn new_transaction_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Narrow seam over the scanning provider so decision logic never sees the wire format.
#[async_trait]
pub trait ScanClient: Send + Sync {
    /// Submit `text` for one scan and return the provider's verdict as received.
    async fn scan(
        &self,
        text: &str,
        role: ScanRole,
        transaction_id: &str,
    ) -> Result<Verdict, ScanError>;
}
