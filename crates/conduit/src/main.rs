//! Conduit - tool-call orchestration for streaming language models
//!
//! Main entry point for the Conduit CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{call, providers, replay, tools};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Conduit - tool-call orchestration for streaming language models
#[derive(Parser)]
#[command(name = "conduit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file to use instead of the discovered layers
    #[arg(short, long, global = true, env = "CONDUIT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List configured providers
    Providers(providers::ProvidersArgs),

    /// Start providers and list the tool catalog
    Tools(tools::ToolsArgs),

    /// Call one tool
    Call(call::CallArgs),

    /// Feed recorded model events through the orchestrator
    Replay(replay::ReplayArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable, stderr) + rotating JSON file
    let filter = if cli.verbose {
        "conduit=debug,conduit_agent=debug,conduit_mcp=debug,conduit_config=debug,info"
    } else {
        "conduit=info,conduit_agent=info,conduit_mcp=info,conduit_config=info,warn"
    };

    let log_dir = conduit_config::user_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "conduit.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "conduit=trace,conduit_agent=trace,conduit_mcp=trace,conduit_config=trace,info",
                )),
        )
        .init();

    let ctx = commands::Context {
        config_path: cli.config,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Providers(args) => providers::run(args, &ctx).await,
        Commands::Tools(args) => tools::run(args, &ctx).await,
        Commands::Call(args) => call::run(args, &ctx).await,
        Commands::Replay(args) => replay::run(args, &ctx).await,
    }
}
