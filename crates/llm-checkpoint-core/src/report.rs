use std::fmt::Write;

use crate::exchange::{Outcome, TurnReport};
use crate::gate::threat_label;
use crate::scanner::{UpstreamErrorKind, Verdict};

/// Format styles supported by the renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Render a finished turn for display.
pub fn render_turn(report: &TurnReport, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => render_turn_human(report),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
    }
}

/// Render a single verdict, as produced by a standalone scan.
pub fn render_verdict(verdict: &Verdict, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => {
            let mut out = String::new();
            write_verdict(&mut out, "Scan", verdict)?;
            Ok(out)
        }
        OutputFormat::Json => Ok(serde_json::to_string_pretty(verdict)?),
    }
}

fn render_turn_human(report: &TurnReport) -> anyhow::Result<String> {
    let mut out = String::new();
    if let Some(verdict) = &report.input_verdict {
        write_verdict(&mut out, "Input scan", verdict)?;
    }
    if let Some(verdict) = &report.output_verdict {
        write_verdict(&mut out, "Output scan", verdict)?;
    }
    if !out.is_empty() {
        writeln!(out)?;
    }

    match &report.outcome {
        Outcome::Delivered { text } => {
            writeln!(out, "Response:")?;
            writeln!(out, "{text}")?;
        }
        Outcome::BlockedInput { reason } => {
            writeln!(out, "Blocked: the prompt violates the security policy.")?;
            writeln!(out, "Reason: {reason}")?;
            writeln!(out, "Please modify your message and try again.")?;
        }
        Outcome::BlockedOutput { reason } => {
            writeln!(out, "Blocked: the model response was withheld by the security policy.")?;
            writeln!(out, "Reason: {reason}")?;
        }
        Outcome::UpstreamError {
            kind,
            stage,
            transaction_id,
            detail,
        } => {
            writeln!(out, "Service unavailable: the {stage} did not complete ({kind}).")?;
            writeln!(out, "Nothing was delivered. Please try again later.")?;
            if *kind == UpstreamErrorKind::ScanAuth {
                writeln!(
                    out,
                    "Hint: the scanning service rejected the credentials; check PANW_AI_SEC_API_KEY and the profile permissions."
                )?;
            }
            if let Some(tx) = transaction_id {
                writeln!(out, "Transaction: {tx}")?;
            }
            writeln!(out, "Detail: {}", sanitize(detail))?;
        }
    }
    Ok(out)
}

fn write_verdict(out: &mut String, label: &str, verdict: &Verdict) -> anyhow::Result<()> {
    writeln!(
        out,
        "{label}: {category} / {action} (tr_id {tx})",
        category = verdict.category,
        action = verdict.action,
        tx = verdict.transaction_id
    )?;
    for name in &verdict.detections {
        writeln!(out, "  - {}", threat_label(name))?;
    }
    Ok(())
}

fn sanitize(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\n' | '\r' => ' ',
            _ => c,
        })
        .collect()
}
