//! One user turn: scan the prompt, gate it, complete it, scan the completion, gate it.
//!
//! The orchestrator fails closed. If either scan cannot be completed nothing is
//! delivered, and an unscannable prompt never reaches the model.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::gate::{Decision, Gate};
use crate::llm::{CompletionClient, CompletionError, OpenAiCompletionClient};
use crate::scanner::{
    airs::AirsScanClient, new_transaction_id, ScanClient, ScanError, ScanRole, UpstreamErrorKind,
    Verdict,
};
use crate::settings::{ConfigError, Settings};

/// States a turn moves through. Transitions only go forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExchangeState {
    Start,
    InputScanned,
    BlockedInput,
    Completed,
    OutputScanned,
    BlockedOutput,
    Delivered,
    UpstreamError,
}

impl ExchangeState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::BlockedInput | Self::BlockedOutput | Self::Delivered | Self::UpstreamError
        )
    }

    pub fn can_advance_to(self, next: Self) -> bool {
        use ExchangeState::*;
        match (self, next) {
            (from, UpstreamError) => !from.is_terminal(),
            (Start, InputScanned)
            | (InputScanned, BlockedInput | Completed)
            | (Completed, OutputScanned)
            | (OutputScanned, BlockedOutput | Delivered) => true,
            _ => false,
        }
    }
}

/// Network step that was in flight when a fault occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    InputScan,
    Completion,
    OutputScan,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InputScan => f.write_str("input scan"),
            Self::Completion => f.write_str("completion"),
            Self::OutputScan => f.write_str("output scan"),
        }
    }
}

/// Terminal result of a turn, the only thing a presentation layer needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Delivered {
        text: String,
    },
    BlockedInput {
        reason: String,
    },
    BlockedOutput {
        reason: String,
    },
    UpstreamError {
        kind: UpstreamErrorKind,
        stage: Stage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transaction_id: Option<String>,
        detail: String,
    },
}

impl Outcome {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::BlockedInput { .. } | Self::BlockedOutput { .. })
    }

    pub fn delivered_text(&self) -> Option<&str> {
        match self {
            Self::Delivered { text } => Some(text),
            _ => None,
        }
    }
}

/// Everything worth reporting about a finished turn.
///
/// Completion text appears only inside [`Outcome::Delivered`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnReport {
    pub outcome: Outcome,
    pub input_verdict: Option<Verdict>,
    pub output_verdict: Option<Verdict>,
    /// States visited, starting with `START`.
    pub trail: Vec<ExchangeState>,
}

/// Rejections raised before a turn starts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("prompt must not be empty")]
    EmptyPrompt,
}

struct Exchange {
    state: ExchangeState,
    trail: Vec<ExchangeState>,
    input_verdict: Option<Verdict>,
    completion_text: Option<String>,
    output_verdict: Option<Verdict>,
}

impl Exchange {
    fn new() -> Self {
        Self {
            state: ExchangeState::Start,
            trail: vec![ExchangeState::Start],
            input_verdict: None,
            completion_text: None,
            output_verdict: None,
        }
    }

    fn advance(&mut self, next: ExchangeState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal exchange transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
        self.trail.push(next);
    }

    fn record_input_verdict(&mut self, verdict: Verdict) {
        self.input_verdict = Some(verdict);
        self.advance(ExchangeState::InputScanned);
    }

    fn record_completion(&mut self, text: String) {
        self.completion_text = Some(text);
        self.advance(ExchangeState::Completed);
    }

    fn record_output_verdict(&mut self, verdict: Verdict) {
        self.output_verdict = Some(verdict);
        self.advance(ExchangeState::OutputScanned);
    }

    fn block_input(mut self, reason: String) -> TurnReport {
        self.advance(ExchangeState::BlockedInput);
        self.finish(Outcome::BlockedInput { reason })
    }

    fn block_output(mut self, reason: String) -> TurnReport {
        self.advance(ExchangeState::BlockedOutput);
        self.finish(Outcome::BlockedOutput { reason })
    }

    fn deliver(mut self) -> TurnReport {
        self.advance(ExchangeState::Delivered);
        let text = self.completion_text.take().unwrap_or_default();
        self.finish(Outcome::Delivered { text })
    }

    fn fail(
        mut self,
        stage: Stage,
        kind: UpstreamErrorKind,
        transaction_id: Option<String>,
        detail: String,
    ) -> TurnReport {
        self.advance(ExchangeState::UpstreamError);
        self.finish(Outcome::UpstreamError {
            kind,
            stage,
            transaction_id,
            detail,
        })
    }

    fn finish(self, outcome: Outcome) -> TurnReport {
        TurnReport {
            outcome,
            input_verdict: self.input_verdict,
            output_verdict: self.output_verdict,
            trail: self.trail,
        }
    }
}

/// Drives turns against a scanning client and a completion client.
///
/// Holds no per-turn state, so one orchestrator can serve concurrent turns.
#[derive(Clone)]
pub struct Orchestrator {
    scanner: Arc<dyn ScanClient>,
    completer: Arc<dyn CompletionClient>,
    gate: Gate,
}

impl Orchestrator {
    pub fn new(scanner: Arc<dyn ScanClient>, completer: Arc<dyn CompletionClient>) -> Self {
        Self {
            scanner,
            completer,
            gate: Gate::new(),
        }
    }

    /// Wire up the HTTP clients for both services.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let scanner = AirsScanClient::new(&settings.scan)?;
        let completer = OpenAiCompletionClient::new(&settings.completion)?;
        Ok(Self::new(Arc::new(scanner), Arc::new(completer)))
    }

    #[instrument(name = "exchange", skip_all, fields(chars = input_text.chars().count()))]
    pub async fn run(&self, input_text: &str) -> Result<TurnReport, ExchangeError> {
        if input_text.trim().is_empty() {
            return Err(ExchangeError::EmptyPrompt);
        }
        let mut exchange = Exchange::new();

        let input_tx = new_transaction_id();
        let input_verdict = match self
            .scanner
            .scan(input_text, ScanRole::Prompt, &input_tx)
            .await
        {
            Ok(verdict) => verdict,
            Err(err) => return Ok(scan_fault(exchange, Stage::InputScan, input_tx, &err)),
        };
        info!(
            tr_id = %input_tx,
            category = %input_verdict.category,
            action = %input_verdict.action,
            "prompt scanned"
        );
        let decision = self.gate.decide(&input_verdict);
        exchange.record_input_verdict(input_verdict);
        if let Decision::Block { reason } = decision {
            warn!(tr_id = %input_tx, %reason, "prompt blocked by security policy");
            return Ok(exchange.block_input(reason));
        }

        let completion = match self.completer.complete(input_text).await {
            Ok(text) => text,
            Err(err) => {
                error!(error = %err, "completion failed");
                return Ok(exchange.fail(
                    Stage::Completion,
                    UpstreamErrorKind::CompletionUnavailable,
                    None,
                    err.to_string(),
                ));
            }
        };
        if completion.trim().is_empty() {
            error!("completion service returned no text");
            return Ok(exchange.fail(
                Stage::Completion,
                UpstreamErrorKind::CompletionUnavailable,
                None,
                CompletionError::Empty.to_string(),
            ));
        }
        exchange.record_completion(completion);

        let output_tx = new_transaction_id();
        let scanned = {
            let text = exchange.completion_text.as_deref().unwrap_or_default();
            self.scanner.scan(text, ScanRole::Response, &output_tx).await
        };
        let output_verdict = match scanned {
            Ok(verdict) => verdict,
            Err(err) => return Ok(scan_fault(exchange, Stage::OutputScan, output_tx, &err)),
        };
        info!(
            tr_id = %output_tx,
            category = %output_verdict.category,
            action = %output_verdict.action,
            "response scanned"
        );
        let decision = self.gate.decide(&output_verdict);
        exchange.record_output_verdict(output_verdict);
        match decision {
            Decision::Block { reason } => {
                warn!(tr_id = %output_tx, %reason, "response withheld by security policy");
                Ok(exchange.block_output(reason))
            }
            Decision::Allow => Ok(exchange.deliver()),
        }
    }
}

fn scan_fault(
    exchange: Exchange,
    stage: Stage,
    transaction_id: String,
    err: &ScanError,
) -> TurnReport {
    error!(
        %stage,
        tr_id = %transaction_id,
        kind = %err.kind(),
        error = %err,
        "scan failed; failing closed"
    );
    exchange.fail(stage, err.kind(), Some(transaction_id), err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_path_is_legal() {
        use ExchangeState::*;
        let path = [Start, InputScanned, Completed, OutputScanned, Delivered];
        for pair in path.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn no_backward_or_skipping_transitions() {
        use ExchangeState::*;
        assert!(!Completed.can_advance_to(InputScanned));
        assert!(!Start.can_advance_to(Completed));
        assert!(!InputScanned.can_advance_to(Delivered));
        assert!(!InputScanned.can_advance_to(BlockedOutput));
        assert!(!Delivered.can_advance_to(UpstreamError));
        assert!(!BlockedInput.can_advance_to(Completed));
    }

    #[test]
    fn upstream_error_reachable_from_every_live_state() {
        use ExchangeState::*;
        for state in [Start, InputScanned, Completed, OutputScanned] {
            assert!(state.can_advance_to(UpstreamError));
        }
    }

    #[test]
    fn blocked_output_discards_completion() {
        let mut exchange = Exchange::new();
        exchange.record_input_verdict(Verdict::new(
            "benign",
            crate::scanner::ScanAction::Allow,
            "a",
        ));
        exchange.record_completion("secret text".into());
        exchange.record_output_verdict(Verdict::new(
            "data_leak",
            crate::scanner::ScanAction::Block,
            "b",
        ));
        let report = exchange.block_output("Data Leakage".into());
        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("secret text"));
        assert_eq!(
            report.trail.last().copied(),
            Some(ExchangeState::BlockedOutput)
        );
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let outcome = Outcome::BlockedInput {
            reason: "Prompt Injection Attack".into(),
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["outcome"], "blocked_input");
        assert_eq!(value["reason"], "Prompt Injection Attack");
    }
}
