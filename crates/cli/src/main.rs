//! taxguide CLI
//!
//! Main entry point for the taxguide command-line tool.
//! Answers tax questions from official sources, locally or over HTTP.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, InspectCommand, ServeCommand};
use std::path::PathBuf;
use taxguide_core::{config::AppConfig, logging, AppResult};

/// taxguide - grounded answers to tax questions
#[derive(Parser, Debug)]
#[command(name = "taxguide")]
#[command(about = "Grounded answers to tax questions from official sources", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "TAXGUIDE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// LLM provider (ollama, openai)
    #[arg(short, long, global = true, env = "TAXGUIDE_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "TAXGUIDE_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Answer one question
    Ask(AskCommand),

    /// Serve the ask API over HTTP
    Serve(ServeCommand),

    /// Show what redaction and classification make of a text
    Inspect(InspectCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let config = AppConfig::load_from(cli.config.as_deref())?.with_overrides(
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    logging::init_logging(
        config.logging.level.as_deref(),
        config.no_color(),
        config.logging.json,
    )?;

    tracing::info!("taxguide starting");
    tracing::debug!("Config file: {:?}", config.config_file);
    tracing::debug!("Provider: {} ({})", config.llm.provider, config.llm.model);

    let command_name = match &cli.command {
        Commands::Ask(_) => "ask",
        Commands::Serve(_) => "serve",
        Commands::Inspect(_) => "inspect",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Serve(cmd) => cmd.execute(config).await,
        Commands::Inspect(cmd) => cmd.execute(),
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
