mod file_config;

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use llm_checkpoint_core::report::{render_turn, render_verdict, OutputFormat};
use llm_checkpoint_core::{
    new_transaction_id, AirsScanClient, ExchangeError, Orchestrator, Outcome, ScanClient,
    ScanRole, ScanSettings, Settings,
};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const EXIT_BLOCKED: u8 = 2;
const EXIT_UPSTREAM: u8 = 3;

#[derive(Parser, Debug)]
#[command(
    name = "llm-checkpoint",
    author,
    version,
    about = "Two-sided security checkpoint for LLM prompts and responses"
)]
struct Cli {
    /// Optional settings file (TOML, YAML or JSON); environment variables take precedence
    #[arg(long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive session; every prompt and response is scanned
    Chat,
    /// Run a single turn and exit (0 delivered, 2 blocked, 3 service unavailable)
    Ask {
        /// Prompt text; read from stdin when omitted
        prompt: Option<String>,
        /// Emit the turn report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Scan text without calling the model
    Scan {
        /// Text to scan; read from stdin when omitted
        text: Option<String>,
        #[arg(long, value_enum, default_value_t = RoleArg::Prompt)]
        role: RoleArg,
        /// Emit the verdict as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate configuration and print it with secrets redacted
    CheckConfig,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum RoleArg {
    Prompt,
    Response,
}

impl From<RoleArg> for ScanRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Prompt => ScanRole::Prompt,
            RoleArg::Response => ScanRole::Response,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();
    let vars = file_config::settings_vars(cli.config.as_deref())?;
    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let settings = Settings::from_map(&vars).context("invalid configuration")?;
            chat(&settings).await
        }
        Commands::Ask { prompt, json } => {
            let settings = Settings::from_map(&vars).context("invalid configuration")?;
            ask(&settings, prompt, json).await
        }
        Commands::Scan { text, role, json } => {
            let settings = ScanSettings::from_map(&vars).context("invalid configuration")?;
            scan(&settings, text, role.into(), json).await
        }
        Commands::CheckConfig => {
            let settings = Settings::from_map(&vars).context("invalid configuration")?;
            check_config(&settings, cli.config.as_deref())
        }
    }
}

async fn chat(settings: &Settings) -> Result<ExitCode> {
    let orchestrator = Orchestrator::from_settings(settings)?;
    println!("{}", "Secure chat ready".bold());
    println!(
        "Every prompt and response is scanned (profile `{}`). No history is kept between turns.",
        settings.scan.profile_name
    );
    println!("Type `exit` to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n{} ", "You:".cyan().bold());
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read from stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        let input = line.trim();
        if input.eq_ignore_ascii_case("exit") {
            break;
        }

        match orchestrator.run(input).await {
            Ok(report) => {
                println!("{}", headline(&report.outcome));
                print!("{}", render_turn(&report, OutputFormat::Human)?);
            }
            Err(ExchangeError::EmptyPrompt) => {
                println!("{}", "Please enter a non-empty message.".yellow());
            }
        }
    }
    println!("\nSession terminated. Goodbye!");
    Ok(ExitCode::SUCCESS)
}

async fn ask(settings: &Settings, prompt: Option<String>, json: bool) -> Result<ExitCode> {
    let prompt = match prompt {
        Some(prompt) => prompt,
        None => read_stdin().await?,
    };
    let orchestrator = Orchestrator::from_settings(settings)?;
    let report = orchestrator.run(prompt.trim()).await?;
    let format = if json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    println!("{}", render_turn(&report, format)?.trim_end());

    Ok(match report.outcome {
        Outcome::Delivered { .. } => ExitCode::SUCCESS,
        Outcome::BlockedInput { .. } | Outcome::BlockedOutput { .. } => {
            ExitCode::from(EXIT_BLOCKED)
        }
        Outcome::UpstreamError { .. } => ExitCode::from(EXIT_UPSTREAM),
    })
}

async fn scan(
    settings: &ScanSettings,
    text: Option<String>,
    role: ScanRole,
    json: bool,
) -> Result<ExitCode> {
    let text = match text {
        Some(text) => text,
        None => read_stdin().await?,
    };
    let client = AirsScanClient::new(settings)?;
    let transaction_id = new_transaction_id();
    let verdict = match client.scan(text.trim(), role, &transaction_id).await {
        Ok(verdict) => verdict,
        Err(err) => {
            eprintln!("Scan failed (tr_id {transaction_id}): {err}");
            return Ok(ExitCode::from(EXIT_UPSTREAM));
        }
    };
    let format = if json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    println!("{}", render_verdict(&verdict, format)?.trim_end());
    Ok(ExitCode::SUCCESS)
}

fn check_config(settings: &Settings, config_path: Option<&Path>) -> Result<ExitCode> {
    if let Some(path) = config_path {
        println!("Config file: {}", path.display());
    }
    // Building the clients validates TLS setup as well as the values.
    Orchestrator::from_settings(settings)?;

    let scan = &settings.scan;
    println!("Scanning service");
    println!("  endpoint: {}", scan.base_url());
    println!("  region:   {}", scan.region);
    println!("  profile:  {}", scan.profile_name);
    println!("  api key:  {}", redact(&scan.api_key));
    println!("  timeout:  {}", humantime::format_duration(scan.timeout));

    let completion = &settings.completion;
    println!("Completion service");
    println!(
        "  endpoint: {}",
        completion
            .endpoint
            .as_deref()
            .unwrap_or("https://api.openai.com")
    );
    println!("  model:    {}", completion.model);
    println!("  api key:  {}", redact(&completion.api_key));
    println!("  timeout:  {}", humantime::format_duration(completion.timeout));
    println!("Configuration OK");
    Ok(ExitCode::SUCCESS)
}

async fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    tokio::io::stdin()
        .read_to_string(&mut buffer)
        .await
        .context("failed to read from stdin")?;
    Ok(buffer)
}

fn headline(outcome: &Outcome) -> colored::ColoredString {
    match outcome {
        Outcome::Delivered { .. } => "[delivered]".green().bold(),
        Outcome::BlockedInput { .. } | Outcome::BlockedOutput { .. } => "[blocked]".red().bold(),
        Outcome::UpstreamError { .. } => "[service unavailable]".yellow().bold(),
    }
}

fn redact(secret: &str) -> String {
    let count = secret.chars().count();
    if count <= 8 {
        return "****".to_string();
    }
    let suffix: String = secret.chars().skip(count - 4).collect();
    format!("****{suffix}")
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tokio=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
