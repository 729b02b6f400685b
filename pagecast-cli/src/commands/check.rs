//! Check command - validate config and probe external tools

use anyhow::{Context, Result};
use clap::Args;
use pagecast_core::encoder;
use pagecast_core::ConfigFile;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// Arguments for the check command
#[derive(Args)]
pub struct CheckArgs {
    /// Config file path (default: ~/.config/pagecast/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Validate the configuration and probe for the browser and encoder
pub async fn check(args: CheckArgs) -> Result<()> {
    println!("Pagecast - Configuration Check\n");

    let file = match args.config {
        Some(path) => ConfigFile::load_from(path).context("Loading config file")?,
        None => ConfigFile::load().context("Loading config file")?,
    };
    let config = file.into_relay_config();

    println!("Configuration:");
    println!("  Page:      {}", display_or(&config.page_url, "(not set)"));
    println!("  Target:    {}", display_or(&config.safe_stream_target(), "(not set)"));
    println!("  Output:    {}x{} @ {} fps", config.width, config.height, config.fps);
    println!("  Bitrate:   {} kbps video, {} kbps audio", config.video_bitrate, config.audio_bitrate);
    println!("  Capture:   {}", config.strategy);
    println!();

    let warnings = config.validate();
    match config.validate_strict() {
        Ok(()) if warnings.is_empty() => println!("Settings: ok"),
        Ok(()) => {
            println!("Settings: ok, with warnings:");
            for warning in &warnings {
                println!("  - {}", warning);
            }
        }
        Err(e) => println!("Settings: INVALID - {}", e),
    }
    println!();

    println!("External tools:");
    let encoder_ok = encoder::encoder_available(&config.encoder_bin).await;
    println!(
        "  Encoder ({}): {}",
        config.encoder_bin,
        if encoder_ok { "found" } else { "NOT FOUND" }
    );
    let browser_ok = browser_available(&config.browser_bin).await;
    println!(
        "  Browser ({}): {}",
        config.browser_bin,
        if browser_ok { "found" } else { "NOT FOUND" }
    );

    if !encoder_ok || !browser_ok || config.validate_strict().is_err() {
        println!();
        anyhow::bail!("Check failed");
    }

    println!("\nAll checks passed.");
    Ok(())
}

fn display_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() { fallback } else { value }
}

async fn browser_available(browser_bin: &str) -> bool {
    Command::new(browser_bin)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}
