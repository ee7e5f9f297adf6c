//! chartwise - grounded question answering over a patient's medical record
//!
//! Main entry point for the chartwise CLI.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod wiring;

use commands::{ask, config, index, memory};

const CRATES: [&str; 5] = [
    "chartwise",
    "chartwise_agent",
    "chartwise_llm",
    "chartwise_index",
    "chartwise_config",
];

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// chartwise - grounded question answering over a patient's medical record
#[derive(Parser)]
#[command(name = "chartwise")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask a question about one patient's record
    Ask(ask::AskArgs),

    /// Chunk index operations
    Index(index::IndexArgs),

    /// Long-term memory operations
    Memory(memory::MemoryArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = chartwise_config::load_config(None);
    let level = match &loaded {
        Ok(loaded) => loaded.config.logging().level,
        Err(_) => "info".to_string(),
    };

    // Console (human-readable) + rotating JSON file
    let console_filter = console_filter(cli.verbose, &level);
    let log_dir = chartwise_config::user_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| std::path::PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "chartwise.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(console_filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(crate_filter("trace", "info"))),
        )
        .init();

    let loaded = loaded?;
    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }

    let ctx = commands::Context {
        loaded,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Ask(args) => ask::run(args, &ctx).await,
        Commands::Index(args) => index::run(args, &ctx).await,
        Commands::Memory(args) => memory::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}

/// Filter for the console layer: `--verbose` wins over the configured level.
fn console_filter(verbose: bool, configured: &str) -> String {
    if verbose {
        crate_filter("debug", "info")
    } else {
        crate_filter(configured, "warn")
    }
}

fn crate_filter(level: &str, fallback: &str) -> String {
    let mut directives: Vec<String> = CRATES.iter().map(|c| format!("{c}={level}")).collect();
    directives.push(fallback.to_string());
    directives.join(",")
}
