//! Pagecast CLI
//!
//! Relays a rendered web page to an RTMP ingest, around the clock.
//!
//! # Usage
//!
//! ```bash
//! # Stream a page (key from PAGECAST_STREAM_KEY or config file)
//! pagecast run --page https://overlay.example/scene --url rtmp://live.example/app
//!
//! # Verify config and external tools without streaming
//! pagecast check
//!
//! # Manage the config file
//! pagecast config init
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Pagecast - web page to RTMP relay
#[derive(Parser)]
#[command(name = "pagecast")]
#[command(version)]
#[command(about = "Stream a rendered web page to an RTMP ingest, 24/7", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start relaying and keep going until interrupted
    Run(commands::RunArgs),

    /// Validate configuration and probe external tools
    Check(commands::CheckArgs),

    /// Manage the configuration file
    Config(commands::ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("pagecast={}", level).parse()?)
                .add_directive(format!("pagecast_core={}", level).parse()?),
        )
        .with_target(false)
        .init();

    // Run the appropriate command
    match cli.command {
        Commands::Run(args) => commands::run(args).await?,
        Commands::Check(args) => commands::check(args).await?,
        Commands::Config(args) => commands::config(args).await?,
    }

    Ok(())
}
