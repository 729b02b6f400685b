//! Frame acquisition
//!
//! Three ways to get pixels out of the rendered page, all behind one
//! trait so the relay does not care which is active:
//!
//! - [`PolledSource`] asks the renderer for a screenshot on a timer
//! - [`PushedSource`] consumes the renderer's screencast stream with
//!   a strict one-frame-in-flight ack handshake
//! - [`DelegatedSource`] does no frame handling at all; capture
//!   happens at the OS level inside the encoder (display grab)

mod delegated;
mod polled;
mod pushed;

pub use delegated::DelegatedSource;
pub use polled::PolledSource;
pub use pushed::PushedSource;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::RelayConfig;
use crate::encoder::SinkHandle;
use crate::error::{RelayError, Result};
use crate::renderer::SharedRenderer;
use crate::types::CaptureStrategy;

/// A running producer of frames for the encoder sink
#[async_trait]
pub trait FrameSource: Send {
    /// Begin producing frames into the sink
    async fn start(&mut self, sink: SinkHandle) -> Result<()>;

    /// Stop producing; safe to call more than once
    async fn stop(&mut self) -> Result<()>;

    /// Take the fatal-error channel. Yields once, when acquisition
    /// failures exceed the configured threshold.
    fn take_fatal(&mut self) -> Option<mpsc::Receiver<RelayError>>;

    /// Frames handed to the sink so far
    fn frames_emitted(&self) -> u64;
}

/// Build the source matching the configured capture strategy
pub fn create_source(renderer: SharedRenderer, config: &RelayConfig) -> Box<dyn FrameSource> {
    match config.strategy {
        CaptureStrategy::Polled => Box::new(PolledSource::new(renderer, config)),
        CaptureStrategy::Pushed => Box::new(PushedSource::new(renderer, config)),
        CaptureStrategy::Delegated => Box::new(DelegatedSource::new()),
    }
}

/// Consecutive-failure tracker with a sliding window
///
/// A success resets it. Failures only escalate when the threshold is
/// reached within the window, so sporadic errors never accumulate.
pub(crate) struct FailureWindow {
    threshold: u32,
    window: std::time::Duration,
    streak: u32,
    first_at: Option<Instant>,
}

impl FailureWindow {
    pub(crate) fn new(threshold: u32, window: std::time::Duration) -> Self {
        Self {
            threshold,
            window,
            streak: 0,
            first_at: None,
        }
    }

    /// Record a failure; returns true when the streak crosses the
    /// threshold inside the window.
    pub(crate) fn record(&mut self) -> bool {
        let now = Instant::now();
        match self.first_at {
            Some(first) if now.duration_since(first) <= self.window => {
                self.streak += 1;
            }
            _ => {
                // Window expired or first failure; start a fresh streak
                self.first_at = Some(now);
                self.streak = 1;
            }
        }
        self.streak >= self.threshold
    }

    pub(crate) fn reset(&mut self) {
        self.streak = 0;
        self.first_at = None;
    }

    pub(crate) fn streak(&self) -> u32 {
        self.streak
    }
}
