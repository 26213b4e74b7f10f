use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use tribunal::engine::{self, DebateEngine, Event, RunInput};
use tribunal::gemini::GeminiRestClient;
use tribunal::{DebateConfig, RunStatus};

#[derive(Parser)]
#[command(
    name = "tribunal",
    about = "Analyzer/Critic debate over production incident logs"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze an incident: logs plus referenced source files.
    Analyze {
        /// Path to the incident log file.
        #[arg(long)]
        log: PathBuf,

        /// Source files referenced by the incident (repeatable).
        #[arg(long = "code")]
        code: Vec<PathBuf>,

        /// Path to a TOML configuration file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Run parser/clusterer/redactor/tools only — no LLM calls.
        #[arg(long)]
        tools_only: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let Command::Analyze {
        log,
        code,
        config,
        tools_only,
    } = cli.command;

    // Input errors fail fast, before any LLM call.
    if !log.exists() {
        error!(path = %log.display(), "log file not found");
        return Ok(ExitCode::from(1));
    }
    for path in &code {
        if !path.exists() {
            error!(path = %path.display(), "code file not found");
            return Ok(ExitCode::from(1));
        }
    }

    let config = match DebateConfig::load(config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "configuration error");
            return Ok(ExitCode::from(1));
        }
    };
    let input = RunInput {
        log_path: log,
        code_paths: code,
    };

    if tools_only {
        return Ok(run_tools_only(&config, &input));
    }

    let client = match GeminiRestClient::from_config(&config.gemini, &config.retry) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "cannot build Gemini client");
            return Ok(ExitCode::from(1));
        }
    };

    // Ctrl-C cancels between turns; partial state is flushed before exit.
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling after the current turn");
            signal_token.cancel();
        }
    });

    let engine = DebateEngine::new(config, client)
        .with_cancellation(cancel)
        .with_event_sink(Box::new(render_event));

    match engine.run(&input).await {
        Ok(outcome) => {
            if let Some(report) = &outcome.report {
                println!("\nRoot cause: {}", report.root_cause);
                println!("Fix: {}", report.fix);
                println!("Remaining risks: {}", report.remaining_risks.len());
            }
            if let Some(path) = &outcome.report_path {
                println!("Report:     {}", path.display());
            }
            println!("Metrics:    {}", outcome.metrics_path.display());
            println!("Transcript: {}", outcome.transcript_path.display());
            println!(
                "Tokens:     {} (cost ~{} {})",
                outcome.metrics.token_totals.total(),
                outcome.metrics.estimated_cost.amount,
                outcome.metrics.estimated_cost.currency,
            );
            println!("Status:     {}", outcome.status);
            Ok(ExitCode::from(outcome.status.exit_code() as u8))
        }
        Err(e) => {
            error!(error = %e, "run failed");
            Ok(ExitCode::from(RunStatus::Failed.exit_code() as u8))
        }
    }
}

fn run_tools_only(config: &DebateConfig, input: &RunInput) -> ExitCode {
    match engine::run_tools_only(config, input) {
        Ok(summary) => {
            println!("Tools run complete");
            println!(
                "  parsed:   {} lines ({} errors, {} warnings)",
                summary.parsed.total_lines, summary.parsed.error_count, summary.parsed.warn_count
            );
            println!(
                "  clusters: {} total, {} with errors",
                summary.total_clusters, summary.error_clusters
            );
            println!(
                "  chunk:    {} entries{}",
                summary.chunk_entries,
                if summary.chunk_truncated {
                    " (truncated)"
                } else {
                    ""
                }
            );
            if let Some(grep) = &summary.grep_check {
                println!("  grep:     {grep}");
            }
            println!("  results:  {}", summary.results_path);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "tools-only run failed");
            ExitCode::from(1)
        }
    }
}

fn render_event(event: &Event) {
    match event {
        Event::LogsParsed {
            total_lines,
            error_count,
            warn_count,
        } => info!(total_lines, error_count, warn_count, "logs parsed"),
        Event::ChunkSelected {
            selected,
            source,
            truncated,
        } => info!(selected, source = %source, truncated, "context chunk selected"),
        Event::AgentTurn {
            role,
            round,
            retried,
        } => info!(role, round, retried, "agent turn complete"),
        Event::ToolResult {
            tool,
            round,
            ok,
            truncated,
        } => info!(tool = %tool, round, ok, truncated, "tool result"),
        Event::RoundComplete {
            round,
            verdict,
            open_issues,
        } => info!(round, verdict = %verdict, open_issues, "round complete"),
        Event::Completed { status, rounds } => info!(%status, rounds, "debate finished"),
    }
}
