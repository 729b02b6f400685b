//! Configuration file loading and merging
//!
//! Loads user configuration from `~/.config/pagecast/config.toml`.
//! The stream key may also come from the `PAGECAST_STREAM_KEY`
//! environment variable, which wins over the file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::types::CaptureStrategy;

/// Environment variable overriding the configured stream key
pub const STREAM_KEY_ENV: &str = "PAGECAST_STREAM_KEY";

/// Configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Stream target settings
    #[serde(default)]
    pub stream: StreamSettings,

    /// Frame capture settings
    #[serde(default)]
    pub capture: CaptureSettings,

    /// Supervision timing settings
    #[serde(default)]
    pub timing: TimingSettings,

    /// External binaries
    #[serde(default)]
    pub process: ProcessSettings,
}

/// Stream target settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSettings {
    /// Page to render
    #[serde(default)]
    pub page_url: String,

    /// RTMP ingest URL without the key
    #[serde(default)]
    pub url: String,

    /// Stream key (prefer the environment variable for this)
    #[serde(default)]
    pub key: String,

    /// Video bitrate in kbps
    #[serde(default = "default_video_bitrate")]
    pub video_bitrate: u32,

    /// Audio bitrate in kbps
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: u32,

    /// Looped background audio file (silence when unset)
    #[serde(default)]
    pub audio_path: Option<PathBuf>,
}

/// Frame capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSettings {
    /// Capture strategy (polled, pushed, delegated)
    #[serde(default)]
    pub strategy: CaptureStrategy,

    /// Frame width in pixels
    #[serde(default = "default_width")]
    pub width: u32,

    /// Frame height in pixels
    #[serde(default = "default_height")]
    pub height: u32,

    /// Target frame rate
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// JPEG quality (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u32,

    /// X display for the delegated strategy
    #[serde(default = "default_display")]
    pub display: String,
}

/// Supervision timing settings, all in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSettings {
    /// Extra settle wait after the page load event
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,

    /// Session rejuvenation interval
    #[serde(default = "default_rejuvenate_secs")]
    pub rejuvenate_secs: u64,

    /// Top-level restart delay after a fatal pipeline error
    #[serde(default = "default_restart_secs")]
    pub restart_secs: u64,

    /// Delay before relaunching a crashed encoder
    #[serde(default = "default_relaunch_secs")]
    pub sink_relaunch_secs: u64,

    /// Encoder relaunches within the crash window before escalating
    #[serde(default = "default_crash_threshold")]
    pub sink_crash_threshold: u32,

    /// Crash counting window
    #[serde(default = "default_crash_window_secs")]
    pub sink_crash_window_secs: u64,

    /// Consecutive acquisition failures before the source aborts
    #[serde(default = "default_failure_threshold")]
    pub source_failure_threshold: u32,

    /// Acquisition failure counting window
    #[serde(default = "default_failure_window_secs")]
    pub source_failure_window_secs: u64,

    /// Grace period before subprocesses are killed
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
}

/// External binary settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSettings {
    /// Browser binary
    #[serde(default = "default_browser_bin")]
    pub browser_bin: String,

    /// Encoder binary
    #[serde(default = "default_encoder_bin")]
    pub encoder_bin: String,
}

fn default_video_bitrate() -> u32 {
    3000
}

fn default_audio_bitrate() -> u32 {
    128
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_fps() -> u32 {
    30
}

fn default_jpeg_quality() -> u32 {
    80
}

fn default_display() -> String {
    ":99".to_string()
}

fn default_settle_secs() -> u64 {
    3
}

fn default_rejuvenate_secs() -> u64 {
    3600
}

fn default_restart_secs() -> u64 {
    10
}

fn default_relaunch_secs() -> u64 {
    2
}

fn default_crash_threshold() -> u32 {
    3
}

fn default_crash_window_secs() -> u64 {
    60
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_failure_window_secs() -> u64 {
    10
}

fn default_grace_secs() -> u64 {
    5
}

fn default_browser_bin() -> String {
    "chromium".to_string()
}

fn default_encoder_bin() -> String {
    "ffmpeg".to_string()
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            page_url: String::new(),
            url: String::new(),
            key: String::new(),
            video_bitrate: default_video_bitrate(),
            audio_bitrate: default_audio_bitrate(),
            audio_path: None,
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            strategy: CaptureStrategy::default(),
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            jpeg_quality: default_jpeg_quality(),
            display: default_display(),
        }
    }
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            settle_secs: default_settle_secs(),
            rejuvenate_secs: default_rejuvenate_secs(),
            restart_secs: default_restart_secs(),
            sink_relaunch_secs: default_relaunch_secs(),
            sink_crash_threshold: default_crash_threshold(),
            sink_crash_window_secs: default_crash_window_secs(),
            source_failure_threshold: default_failure_threshold(),
            source_failure_window_secs: default_failure_window_secs(),
            grace_secs: default_grace_secs(),
        }
    }
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            browser_bin: default_browser_bin(),
            encoder_bin: default_encoder_bin(),
        }
    }
}

impl ConfigFile {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("pagecast").join("config.toml")
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("pagecast")
                .join("config.toml")
        } else {
            PathBuf::from("/etc/pagecast/config.toml")
        }
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    /// Load configuration from a specific path
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)
            .map_err(|e| RelayError::config(format!("Failed to read {:?}: {}", path, e)))?;

        let config: Self = toml::from_str(&contents)
            .map_err(|e| RelayError::config(format!("Failed to parse {:?}: {}", path, e)))?;

        debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Build the immutable relay configuration from this file
    ///
    /// The `PAGECAST_STREAM_KEY` environment variable overrides the
    /// file's key so secrets can stay out of the config file.
    pub fn into_relay_config(self) -> RelayConfig {
        let key = match std::env::var(STREAM_KEY_ENV) {
            Ok(env_key) if !env_key.is_empty() => env_key,
            _ => {
                if !self.stream.key.is_empty() {
                    warn!(
                        "Stream key read from config file; prefer the {} environment variable",
                        STREAM_KEY_ENV
                    );
                }
                self.stream.key.clone()
            }
        };

        let mut config = RelayConfig::new(self.stream.page_url, self.stream.url)
            .with_stream_key(key)
            .with_resolution(self.capture.width, self.capture.height)
            .with_fps(self.capture.fps)
            .with_video_bitrate(self.stream.video_bitrate)
            .with_strategy(self.capture.strategy)
            .with_settle_delay(Duration::from_secs(self.timing.settle_secs))
            .with_rejuvenate_interval(Duration::from_secs(self.timing.rejuvenate_secs))
            .with_restart_delay(Duration::from_secs(self.timing.restart_secs))
            .with_sink_relaunch_delay(Duration::from_secs(self.timing.sink_relaunch_secs))
            .with_sink_crash_limit(
                self.timing.sink_crash_threshold,
                Duration::from_secs(self.timing.sink_crash_window_secs),
            )
            .with_source_failure_limit(
                self.timing.source_failure_threshold,
                Duration::from_secs(self.timing.source_failure_window_secs),
            )
            .with_browser_bin(self.process.browser_bin)
            .with_encoder_bin(self.process.encoder_bin);

        config.audio_bitrate = self.stream.audio_bitrate;
        config.audio_path = self.stream.audio_path;
        config.jpeg_quality = self.capture.jpeg_quality;
        config.display = self.capture.display;
        config.grace_timeout = Duration::from_secs(self.timing.grace_secs);
        config
    }
}

/// Generate a commented sample configuration file
pub fn sample_config() -> String {
    r#"# Pagecast configuration
# Place at ~/.config/pagecast/config.toml

[stream]
# Page to render and stream
page_url = "https://example.com/dashboard"
# RTMP ingest URL, without the stream key
url = "rtmp://a.rtmp.youtube.com/live2"
# Stream key; prefer the PAGECAST_STREAM_KEY environment variable
key = ""
# Video bitrate in kbps
video_bitrate = 3000
# Audio bitrate in kbps
audio_bitrate = 128
# Background audio file, looped forever; silence when unset
# audio_path = "/srv/pagecast/music.mp3"

[capture]
# polled: screenshot per tick; pushed: browser screencast events;
# delegated: encoder grabs the display directly
strategy = "polled"
width = 1280
height = 720
fps = 30
jpeg_quality = 80
# X display for the delegated strategy
display = ":99"

[timing]
settle_secs = 3
rejuvenate_secs = 3600
restart_secs = 10
sink_relaunch_secs = 2
sink_crash_threshold = 3
sink_crash_window_secs = 60
source_failure_threshold = 3
source_failure_window_secs = 10
grace_secs = 5

[process]
browser_bin = "chromium"
encoder_bin = "ffmpeg"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_config_parses() {
        let parsed: ConfigFile = toml::from_str(&sample_config()).expect("sample should parse");
        assert_eq!(parsed.capture.fps, 30);
        assert_eq!(parsed.stream.page_url, "https://example.com/dashboard");
    }

    #[test]
    fn empty_file_uses_defaults() {
        let parsed: ConfigFile = toml::from_str("").expect("empty should parse");
        assert_eq!(parsed.capture.width, 1280);
        assert_eq!(parsed.timing.sink_crash_threshold, 3);
        assert_eq!(parsed.process.encoder_bin, "ffmpeg");
    }

    #[test]
    fn partial_section_fills_defaults() {
        let parsed: ConfigFile = toml::from_str("[capture]\nfps = 15\n").unwrap();
        assert_eq!(parsed.capture.fps, 15);
        assert_eq!(parsed.capture.height, 720);
    }
}
