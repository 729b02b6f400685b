//! Configuration types for Pagecast
//!
//! Provides the immutable relay configuration snapshot plus the optional
//! TOML config file it can be loaded from.

mod file;

pub use file::{sample_config, ConfigFile};

use crate::types::CaptureStrategy;
use std::path::PathBuf;
use std::time::Duration;

/// Complete relay configuration
///
/// Built once at boot and handed by value into each component; changing
/// any field requires a full relay restart.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Page to render and stream
    pub page_url: String,
    /// RTMP(S) ingest URL, without the stream key
    pub stream_url: String,
    /// Stream key appended to the ingest URL (secret, masked in logs)
    pub stream_key: String,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Target frame rate
    pub fps: u32,
    /// Video bitrate in kbps
    pub video_bitrate: u32,
    /// Audio bitrate in kbps
    pub audio_bitrate: u32,
    /// Optional background audio file, looped forever; silence when unset
    pub audio_path: Option<PathBuf>,
    /// How frames are acquired
    pub strategy: CaptureStrategy,
    /// JPEG quality for captured frames (1-100)
    pub jpeg_quality: u32,
    /// Extra wait after the page load event before the session counts as settled
    pub settle_delay: Duration,
    /// Reload the rendering session whenever its age crosses this interval
    pub rejuvenate_interval: Duration,
    /// Top-level delay before restarting a failed relay run
    pub restart_delay: Duration,
    /// Delay before relaunching a crashed encoder subprocess
    /// (kept shorter than `restart_delay`)
    pub sink_relaunch_delay: Duration,
    /// Encoder relaunches beyond this count within `sink_crash_window`
    /// escalate to a fatal crash-loop error
    pub sink_crash_threshold: u32,
    /// Window over which encoder relaunches are counted
    pub sink_crash_window: Duration,
    /// Consecutive acquisition failures beyond this count within
    /// `source_failure_window` abort the frame source
    pub source_failure_threshold: u32,
    /// Window over which acquisition failures are counted
    pub source_failure_window: Duration,
    /// Grace period for subprocesses to exit before they are killed
    pub grace_timeout: Duration,
    /// Browser binary driving the rendering session
    pub browser_bin: String,
    /// Encoder binary fed over stdin (or grabbing the display when delegated)
    pub encoder_bin: String,
    /// X display the browser renders to and the encoder grabs from
    /// (delegated strategy only)
    pub display: String,
}

impl RelayConfig {
    /// Create a config for streaming `page_url` to `stream_url`
    pub fn new(page_url: impl Into<String>, stream_url: impl Into<String>) -> Self {
        Self {
            page_url: page_url.into(),
            stream_url: stream_url.into(),
            stream_key: String::new(),
            width: 1280,
            height: 720,
            fps: 30,
            video_bitrate: 3000,
            audio_bitrate: 128,
            audio_path: None,
            strategy: CaptureStrategy::default(),
            jpeg_quality: 80,
            settle_delay: Duration::from_secs(3),
            rejuvenate_interval: Duration::from_secs(60 * 60),
            restart_delay: Duration::from_secs(10),
            sink_relaunch_delay: Duration::from_secs(2),
            sink_crash_threshold: 3,
            sink_crash_window: Duration::from_secs(60),
            source_failure_threshold: 3,
            source_failure_window: Duration::from_secs(10),
            grace_timeout: Duration::from_secs(5),
            browser_bin: "chromium".to_string(),
            encoder_bin: "ffmpeg".to_string(),
            display: ":99".to_string(),
        }
    }

    /// Set the stream key
    pub fn with_stream_key(mut self, key: impl Into<String>) -> Self {
        self.stream_key = key.into();
        self
    }

    /// Set the output resolution
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the target frame rate
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Set the video bitrate in kbps
    pub fn with_video_bitrate(mut self, bitrate: u32) -> Self {
        self.video_bitrate = bitrate;
        self
    }

    /// Set the looped background audio file
    pub fn with_audio_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.audio_path = Some(path.into());
        self
    }

    /// Set the capture strategy
    pub fn with_strategy(mut self, strategy: CaptureStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the rejuvenation interval
    pub fn with_rejuvenate_interval(mut self, interval: Duration) -> Self {
        self.rejuvenate_interval = interval;
        self
    }

    /// Set the top-level restart delay
    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    /// Set the encoder relaunch delay
    pub fn with_sink_relaunch_delay(mut self, delay: Duration) -> Self {
        self.sink_relaunch_delay = delay;
        self
    }

    /// Set the crash-loop escalation threshold and window
    pub fn with_sink_crash_limit(mut self, threshold: u32, window: Duration) -> Self {
        self.sink_crash_threshold = threshold;
        self.sink_crash_window = window;
        self
    }

    /// Set the acquisition failure escalation threshold and window
    pub fn with_source_failure_limit(mut self, threshold: u32, window: Duration) -> Self {
        self.source_failure_threshold = threshold;
        self.source_failure_window = window;
        self
    }

    /// Set the post-load settle delay
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the browser binary
    pub fn with_browser_bin(mut self, bin: impl Into<String>) -> Self {
        self.browser_bin = bin.into();
        self
    }

    /// Set the encoder binary
    pub fn with_encoder_bin(mut self, bin: impl Into<String>) -> Self {
        self.encoder_bin = bin.into();
        self
    }

    /// Full ingest target: stream URL with the key appended
    pub fn stream_target(&self) -> String {
        if self.stream_key.is_empty() {
            self.stream_url.clone()
        } else {
            format!(
                "{}/{}",
                self.stream_url.trim_end_matches('/'),
                self.stream_key
            )
        }
    }

    /// Ingest target with the stream key masked, safe for logging
    pub fn safe_stream_target(&self) -> String {
        if self.stream_key.is_empty() {
            self.stream_url.clone()
        } else {
            format!("{}/****", self.stream_url.trim_end_matches('/'))
        }
    }

    /// Frame period at the target rate
    pub fn frame_period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.fps.max(1) as u64)
    }

    /// Validate the configuration and return any warnings
    ///
    /// Returns a list of warning messages for potentially problematic
    /// settings. An empty list means the configuration looks good.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.fps > 30 && self.strategy == CaptureStrategy::Polled {
            warnings.push(format!(
                "{} fps is ambitious for polled screenshot capture; expect skipped ticks. \
                 Consider the pushed or delegated strategy.",
                self.fps
            ));
        }

        let suggested = suggested_bitrate(self.width, self.height, self.fps);
        if self.video_bitrate < suggested / 4 {
            warnings.push(format!(
                "Bitrate {} kbps is very low for {}x{}@{} (suggested: {} kbps). Quality may suffer.",
                self.video_bitrate, self.width, self.height, self.fps, suggested
            ));
        } else if self.video_bitrate > suggested * 3 {
            warnings.push(format!(
                "Bitrate {} kbps is very high for {}x{}@{} (suggested: {} kbps).",
                self.video_bitrate, self.width, self.height, self.fps, suggested
            ));
        }

        if self.sink_relaunch_delay >= self.restart_delay {
            warnings.push(
                "Encoder relaunch delay should be shorter than the top-level restart delay."
                    .to_string(),
            );
        }

        if self.rejuvenate_interval < Duration::from_secs(60) {
            warnings.push(
                "Rejuvenation more often than once a minute causes visible stream gaps."
                    .to_string(),
            );
        }

        warnings
    }

    /// Validate and return an error if the configuration cannot work
    ///
    /// Unlike `validate()` which returns warnings, this returns hard errors.
    pub fn validate_strict(&self) -> Result<(), String> {
        if self.page_url.is_empty() {
            return Err("Page URL is required".to_string());
        }
        if self.stream_url.is_empty() {
            return Err("Stream URL is required".to_string());
        }
        let lower = self.stream_url.to_lowercase();
        if !lower.starts_with("rtmp://") && !lower.starts_with("rtmps://") {
            return Err(format!(
                "Invalid stream URL '{}'. Must start with rtmp:// or rtmps://",
                self.safe_stream_target()
            ));
        }
        if self.width == 0 || self.height == 0 {
            return Err("Resolution cannot be zero".to_string());
        }
        if self.width > 3840 || self.height > 2160 {
            return Err(format!(
                "Resolution {}x{} exceeds maximum supported (3840x2160)",
                self.width, self.height
            ));
        }
        if self.fps == 0 {
            return Err("Frame rate cannot be zero".to_string());
        }
        if self.fps > 60 {
            return Err(format!("Frame rate {} exceeds maximum supported (60)", self.fps));
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err("JPEG quality must be in 1-100".to_string());
        }
        if self.sink_crash_threshold == 0 {
            return Err("Encoder crash threshold must be at least 1".to_string());
        }
        if self.source_failure_threshold == 0 {
            return Err("Acquisition failure threshold must be at least 1".to_string());
        }
        if let Some(ref path) = self.audio_path {
            if !path.exists() {
                return Err(format!("Audio file not found: {}", path.display()));
            }
        }
        Ok(())
    }
}

/// Rough bitrate suggestion in kbps for a resolution/rate pair
pub fn suggested_bitrate(width: u32, height: u32, fps: u32) -> u32 {
    let pixels_per_second = (width as u64) * (height as u64) * (fps as u64);
    // Roughly 0.1 bits per pixel for screen content
    ((pixels_per_second / 10) / 1000) as u32
}
