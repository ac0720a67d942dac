//! Process one desktop-assistant request and print the result.
//!
//! Reads the API key from the `OPENROUTER_KEY` environment variable.
//!
//! # Examples
//!
//! ```sh
//! # Basic request
//! deskpilot "open chrome and open spotify"
//!
//! # Pipe the utterance from stdin
//! echo "create folder alex on D drive" | deskpilot --stdin
//!
//! # Machine-readable output, explicit session
//! deskpilot --json --session work "what time is it"
//!
//! # Allow destructive actions (delete, etc.)
//! deskpilot --confirm-destructive "delete the folder alex"
//! ```

use clap::Parser;
use deskpilot::model::LocalWorldState;
use deskpilot::prelude::*;
use std::io::Read;
use std::process;
use std::sync::Arc;
use std::time::Duration;

/// Turn a natural-language request into validated tool invocations and
/// run them.
#[derive(Parser)]
#[command(name = "deskpilot", version)]
struct Cli {
    /// The request to process
    utterance: Option<String>,

    /// Read the request from stdin instead
    #[arg(long)]
    stdin: bool,

    /// Session identifier carried through the run
    #[arg(long)]
    session: Option<String>,

    /// Base directory for path resolution (defaults to the current
    /// directory, captured once at request start)
    #[arg(long)]
    workspace: Option<String>,

    /// Model to use for all provider calls
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Emit the full result as JSON instead of a summary line
    #[arg(long)]
    json: bool,

    /// Confirm destructive actions (required for deletes)
    #[arg(long)]
    confirm_destructive: bool,

    /// Wall-clock budget for the whole request, in seconds
    #[arg(long)]
    deadline_secs: Option<u64>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("deskpilot=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let utterance = match read_utterance(&cli) {
        Ok(text) => text,
        Err(msg) => {
            eprintln!("error: {msg}");
            process::exit(2);
        }
    };

    let api_key = match std::env::var("OPENROUTER_KEY") {
        Ok(key) => key,
        Err(_) => {
            eprintln!("error: OPENROUTER_KEY not set");
            process::exit(2);
        }
    };
    let provider = match OpenRouterProvider::new(api_key) {
        Ok(p) => p.with_model(&cli.model),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(2);
        }
    };

    let recorder = ActionRecorder::new();
    let registry = Arc::new(standard_registry(&recorder));
    let config = PipelineConfig {
        executor: ExecutorOptions {
            confirm_destructive: cli.confirm_destructive,
            deadline: cli.deadline_secs.map(Duration::from_secs),
            ..ExecutorOptions::default()
        },
    };
    let world_source = match &cli.workspace {
        Some(dir) => LocalWorldState::rooted(dir.clone()),
        None => LocalWorldState::new(),
    };
    let pipeline = Pipeline::new(
        Arc::new(provider),
        registry,
        Box::new(world_source),
        config,
    );

    let result = pipeline.process(&utterance, cli.session.clone()).await;

    if cli.json {
        match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("error: failed to serialize result: {e}");
                process::exit(1);
            }
        }
    } else {
        println!("{}", result.summary);
        for outcome in &result.outcomes {
            println!(
                "  [{}] {} {}",
                status_glyph(outcome),
                outcome.action_id,
                outcome.message
            );
        }
    }

    process::exit(match result.final_status {
        FinalStatus::Success => 0,
        FinalStatus::Partial => 3,
        FinalStatus::Blocked => 4,
        FinalStatus::Failed => 1,
    });
}

fn read_utterance(cli: &Cli) -> Result<String, String> {
    if cli.stdin {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .map_err(|e| format!("failed to read stdin: {e}"))?;
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err("empty utterance on stdin".into());
        }
        return Ok(text);
    }
    cli.utterance
        .clone()
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| "no utterance given (pass it as an argument or use --stdin)".into())
}

fn status_glyph(outcome: &deskpilot::exec::ActionOutcome) -> &'static str {
    use deskpilot::exec::ActionStatus;
    match outcome.status {
        ActionStatus::Success => "ok",
        ActionStatus::Failed => "failed",
        ActionStatus::DependencyFailed => "skipped",
        ActionStatus::Cancelled => "cancelled",
    }
}
