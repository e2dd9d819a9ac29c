pub mod exchange;
pub mod gate;
pub mod llm;
pub mod report;
pub mod scanner;
pub mod settings;

pub use exchange::{ExchangeError, ExchangeState, Orchestrator, Outcome, Stage, TurnReport};
pub use gate::{Decision, Gate};
pub use llm::{CompletionClient, CompletionError, CompletionSettings, OpenAiCompletionClient};
pub use scanner::{
    airs::AirsScanClient, new_transaction_id, Region, ScanAction, ScanClient, ScanError, ScanRole,
    ScanSettings, UpstreamErrorKind, Verdict,
};
pub use settings::{ConfigError, Settings};
