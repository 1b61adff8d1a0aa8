//! kitbot CLI — the main entry point.
//!
//! Commands:
//! - `run`    — Connect to the configured platforms and relay chat
//! - `doctor` — Report the configured topology without connecting

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "kitbot",
    about = "kitbot — multi-platform AI chat relay",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the configured platforms and start relaying
    Run,

    /// Show which platforms and providers are configured
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run => commands::run::run().await?,
        Commands::Doctor => commands::doctor::run()?,
    }

    Ok(())
}
