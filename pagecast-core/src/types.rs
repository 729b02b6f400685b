//! Core types for Pagecast
//!
//! These types represent the fundamental data structures handed between
//! the frame source and the encoder sink.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Global handle counter for unique relay run IDs
static HANDLE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque handle for one relay run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    /// Create a new unique handle
    pub fn new() -> Self {
        Self(HANDLE_COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw handle value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Relay({})", self.0)
    }
}

/// How frames are acquired from the rendering session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStrategy {
    /// Actively request a screenshot each tick at the target rate
    #[default]
    Polled,
    /// The session pushes frames at its own cadence with one-in-flight ack
    Pushed,
    /// Capture happens outside the process (encoder grabs the display)
    Delegated,
}

impl std::fmt::Display for CaptureStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Polled => write!(f, "polled"),
            Self::Pushed => write!(f, "pushed"),
            Self::Delegated => write!(f, "delegated"),
        }
    }
}

impl std::str::FromStr for CaptureStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "polled" | "poll" | "screenshot" => Ok(Self::Polled),
            "pushed" | "push" | "screencast" => Ok(Self::Pushed),
            "delegated" | "display" | "x11grab" => Ok(Self::Delegated),
            _ => Err(format!("Unknown capture strategy: {}", s)),
        }
    }
}

/// One raster frame on its way from acquisition to the encoder
///
/// The payload is a complete JPEG image. Ownership transfers to the
/// encoder sink on send; the source never retains a frame after handoff.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonically increasing sequence number, continuous across
    /// session rejuvenation
    pub seq: u64,
    /// JPEG-encoded image bytes
    pub data: Bytes,
    /// When the frame was acquired
    pub captured_at: Instant,
}

impl Frame {
    /// Create a new frame
    pub fn new(seq: u64, data: Bytes) -> Self {
        Self {
            seq,
            data,
            captured_at: Instant::now(),
        }
    }
}
