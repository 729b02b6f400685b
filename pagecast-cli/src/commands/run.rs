//! Run command - start the relay and keep it alive

use anyhow::{Context, Result};
use clap::Args;
use pagecast_core::{CaptureStrategy, ConfigFile, ProcessSupervisor, Relay, RelayConfig};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tokio::signal::unix::{signal as unix_signal, SignalKind};
use tokio::sync::watch;
use tracing::{info, warn};

/// Arguments for the run command
#[derive(Args)]
pub struct RunArgs {
    /// Config file path (default: ~/.config/pagecast/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Page URL to render
    #[arg(short, long)]
    page: Option<String>,

    /// RTMP ingest URL (e.g. rtmp://live.example/app)
    #[arg(short, long)]
    url: Option<String>,

    /// Stream key (prefer PAGECAST_STREAM_KEY or the config file)
    #[arg(short, long)]
    key: Option<String>,

    /// Capture strategy (polled, pushed, delegated)
    #[arg(short, long)]
    strategy: Option<CaptureStrategy>,

    /// Output width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Output height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Frames per second
    #[arg(short, long)]
    fps: Option<u32>,

    /// Video bitrate in kbps
    #[arg(short, long)]
    bitrate: Option<u32>,

    /// Audio file to loop over the stream (silence when omitted)
    #[arg(short, long)]
    audio: Option<PathBuf>,

    /// Page reload interval in seconds
    #[arg(long)]
    rejuvenate_secs: Option<u64>,

    /// Delay before restarting after a fatal error, in seconds
    #[arg(long)]
    restart_secs: Option<u64>,

    /// Browser binary
    #[arg(long)]
    browser_bin: Option<String>,

    /// Encoder binary
    #[arg(long)]
    encoder_bin: Option<String>,

    /// X display for the delegated strategy
    #[arg(long)]
    display: Option<String>,
}

impl RunArgs {
    /// Layer CLI flags over the file-derived config
    fn apply(self, mut config: RelayConfig) -> RelayConfig {
        if let Some(page) = self.page {
            config.page_url = page;
        }
        if let Some(url) = self.url {
            config.stream_url = url;
        }
        if let Some(key) = self.key {
            warn!("Stream key passed on the command line is visible in the process list");
            config = config.with_stream_key(key);
        }
        if let Some(strategy) = self.strategy {
            config = config.with_strategy(strategy);
        }
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(fps) = self.fps {
            config = config.with_fps(fps);
        }
        if let Some(bitrate) = self.bitrate {
            config = config.with_video_bitrate(bitrate);
        }
        if let Some(audio) = self.audio {
            config = config.with_audio_path(audio);
        }
        if let Some(secs) = self.rejuvenate_secs {
            config = config.with_rejuvenate_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = self.restart_secs {
            config = config.with_restart_delay(Duration::from_secs(secs));
        }
        if let Some(bin) = self.browser_bin {
            config = config.with_browser_bin(bin);
        }
        if let Some(bin) = self.encoder_bin {
            config = config.with_encoder_bin(bin);
        }
        if let Some(display) = self.display {
            config.display = display;
        }
        config
    }
}

/// Load config, validate, and run the supervisor until interrupted
pub async fn run(args: RunArgs) -> Result<()> {
    let file = match args.config.clone() {
        Some(path) => ConfigFile::load_from(path).context("Loading config file")?,
        None => ConfigFile::load().context("Loading config file")?,
    };
    let config = args.apply(file.into_relay_config());

    for warning in config.validate() {
        warn!("{}", warning);
    }
    config
        .validate_strict()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    info!(
        "Relaying {} -> {} ({}x{} @ {} fps, {} capture)",
        config.page_url,
        config.safe_stream_target(),
        config.width,
        config.height,
        config.fps,
        config.strategy
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let mut sigterm = match unix_signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                if signal::ctrl_c().await.is_ok() {
                    let _ = shutdown_tx.send(true);
                }
                return;
            }
        };
        tokio::select! {
            _ = signal::ctrl_c() => info!("Interrupt received, shutting down"),
            _ = sigterm.recv() => info!("SIGTERM received, shutting down"),
        }
        let _ = shutdown_tx.send(true);
    });

    let mut supervisor = ProcessSupervisor::new(Relay::new(config));
    supervisor.run(shutdown_rx).await?;

    println!("Relay stopped.");
    Ok(())
}
