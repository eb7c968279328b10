//! Tasklane application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Initialize tracing
//! 3. Build the command engine over an in-memory workspace
//! 4. Process one command, or a batch from stdin
//! 5. Log the telemetry summary on exit

mod cli;

use std::error::Error;
use std::io::{self, BufRead};
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use serde_json::json;
use tasklane_command::{
    ActionExecutor, CommandEngine, CompletionProvider, InMemoryWorkspace, ProviderChain,
    ScriptedProvider, Telemetry, UserContext,
};
use tasklane_core::TasklaneConfig;

use cli::{CliArgs, Command};

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(io::stderr)
        .init();
}

/// Engine answering from a file of canned replies.
fn scripted_engine(
    path: &Path,
    config: &TasklaneConfig,
    executor: Arc<dyn ActionExecutor>,
) -> Result<CommandEngine, Box<dyn Error>> {
    config.validate()?;
    let content = std::fs::read_to_string(path)?;
    let provider = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .fold(ScriptedProvider::new("scripted"), |p, line| p.reply(line));
    tracing::info!(path = %path.display(), "Using scripted replies");

    let provider: Arc<dyn CompletionProvider> = Arc::new(provider);
    Ok(CommandEngine::new(
        Arc::new(ProviderChain::new(vec![provider])),
        executor,
        Arc::new(Telemetry::new()),
        config.policy,
        config.engine.clone(),
    ))
}

/// Process one command and render the outcome as JSON.
async fn handle(
    engine: &CommandEngine,
    workspace: &InMemoryWorkspace,
    config: &TasklaneConfig,
    text: &str,
) -> Result<String, Box<dyn Error>> {
    let ctx = UserContext::now_at_offset("cli", config.general.timezone_offset_minutes)
        .with_known(workspace.known_entities());

    let rendered = match engine.process_command(text, &ctx).await {
        Ok(response) => serde_json::to_string_pretty(&response)?,
        Err(e) => {
            tracing::warn!(error = %e, "Command failed");
            serde_json::to_string_pretty(&json!({
                "command": text,
                "error": e.to_string(),
                "message": e.user_message(),
            }))?
        }
    };
    Ok(rendered)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = CliArgs::parse();

    // Config is read before tracing so its log level can apply.
    let config_file = args.resolve_config_path();
    let loaded = TasklaneConfig::load(&config_file);
    let level = args.resolve_log_level(loaded.as_ref().ok().map(|c| c.general.log_level.as_str()));
    init_tracing(&level);

    tracing::info!("Starting Tasklane v{}", env!("CARGO_PKG_VERSION"));

    let config = match loaded {
        Ok(config) => {
            tracing::info!(path = %config_file.display(), "Configuration loaded");
            config
        }
        Err(e) => {
            tracing::warn!(
                path = %config_file.display(),
                error = %e,
                "Failed to load config. Using defaults."
            );
            TasklaneConfig::default()
        }
    };

    if let Command::Config = args.command {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let workspace = Arc::new(InMemoryWorkspace::new());
    let executor: Arc<dyn ActionExecutor> = workspace.clone();
    let engine = match &args.replies {
        Some(path) => scripted_engine(path, &config, executor)?,
        None => CommandEngine::from_config(&config, executor)?,
    };

    match &args.command {
        Command::Run { text } => {
            let text = text.join(" ");
            println!("{}", handle(&engine, &workspace, &config, &text).await?);
        }
        Command::Batch => {
            let lines: Vec<String> = io::stdin().lock().lines().collect::<Result<_, _>>()?;
            for line in lines.iter().filter(|l| !l.trim().is_empty()) {
                println!("{}", handle(&engine, &workspace, &config, line).await?);
            }
            let snapshot = engine.telemetry().snapshot();
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Command::Config => {}
    }

    tracing::info!(
        entities = workspace.len(),
        "\n{}",
        engine.telemetry().snapshot().summary()
    );
    Ok(())
}
