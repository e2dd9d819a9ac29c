//! Allow/block decision over a single [`Verdict`].
//!
//! The provider's `action` is the only input to the decision. The category and
//! flagged detections only shape the human-readable reason attached to a block.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::scanner::{ScanAction, Verdict};

/// Reason used when neither the category nor any detection is recognised.
pub const DEFAULT_BLOCK_REASON: &str = "Security Policy Violation";

static THREAT_LABELS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        // prompt-side threats
        ("prompt_injection", "Prompt Injection Attack"),
        ("injection", "Prompt Injection Attack"),
        ("jailbreak", "Jailbreak Attempt"),
        ("malicious_code", "Malicious Code Generation"),
        ("sensitive_data", "Sensitive Data Exposure"),
        ("toxicity", "Toxic Content"),
        ("toxic_content", "Toxic Content"),
        ("bias", "Bias Detection"),
        ("harmful_content", "Harmful Content"),
        ("topic_violation", "Topic Policy Violation"),
        ("agent", "AI Agent Threat"),
        // response-side threats
        ("data_leak", "Data Leakage"),
        ("url_cats", "Malicious URL Detection"),
        ("malware", "Malware Detection"),
        ("db_security", "Database Security Threat"),
        ("dlp", "Data Loss Prevention"),
        ("pii", "Personal Identifiable Information"),
        ("financial_data", "Financial Data Exposure"),
        ("intellectual_property", "Intellectual Property Risk"),
        ("code_injection", "Code Injection"),
        ("resource_overload", "Resource Overload/DoS"),
        ("hallucination", "AI Hallucination"),
        ("ungrounded", "AI Hallucination"),
    ])
});

/// Outcome of gating one verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Block { reason: String },
}

impl Decision {
    pub fn is_block(&self) -> bool {
        matches!(self, Self::Block { .. })
    }
}

/// Stateless decision function. Same verdict in, same decision out.
#[derive(Debug, Default, Clone, Copy)]
pub struct Gate;

impl Gate {
    pub fn new() -> Self {
        Self
    }

    pub fn decide(&self, verdict: &Verdict) -> Decision {
        match verdict.action {
            ScanAction::Allow => Decision::Allow,
            ScanAction::Block => Decision::Block {
                reason: block_reason(verdict),
            },
        }
    }
}

/// Reason shown to the user for a blocking verdict.
///
/// Known categories map straight through the table. Generic categories such as
/// `malicious` fall back to the first recognised detection, then to
/// [`DEFAULT_BLOCK_REASON`].
pub fn block_reason(verdict: &Verdict) -> String {
    lookup(&verdict.category)
        .or_else(|| verdict.detections.iter().find_map(|name| lookup(name)))
        .unwrap_or(DEFAULT_BLOCK_REASON)
        .to_string()
}

/// Display label for any detection or category name.
///
/// Unknown names are title-cased so new provider detectors still read well.
pub fn threat_label(name: &str) -> String {
    match lookup(name) {
        Some(label) => label.to_string(),
        None => title_case(name),
    }
}

fn lookup(name: &str) -> Option<&'static str> {
    let key = name.trim().to_ascii_lowercase();
    THREAT_LABELS.get(key.as_str()).copied()
}

fn title_case(name: &str) -> String {
    name.split(['_', '-', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
