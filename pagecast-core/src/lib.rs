//! Pagecast Core Library
//!
//! Turns a rendered web page into a 24/7 RTMP livestream.
//!
//! This library provides:
//! - Headless-browser page rendering over the DevTools protocol
//! - Polled, pushed, or delegated frame acquisition
//! - A supervised external ffmpeg encoder fed over stdin
//! - Crash recovery at every level, up to a restart-forever loop
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────┐    ┌─────────────────┐
//! │ Visual Session  │───▶│ Frame Source │───▶│ Encoder Sink    │
//! │ (Browser/CDP)   │    │ (JPEG frames)│    │ (ffmpeg → RTMP) │
//! └─────────────────┘    └──────────────┘    └─────────────────┘
//!          ▲                     ▲                    ▲
//!          └──────────── Relay ──┴────────────────────┘
//!                          ▲
//!                  ProcessSupervisor
//! ```

pub mod config;
pub mod encoder;
pub mod error;
pub mod relay;
pub mod renderer;
pub mod session;
pub mod source;
pub mod supervisor;
pub mod types;

pub use config::{ConfigFile, RelayConfig};
pub use error::{RelayError, Result};
pub use relay::{Relay, RunState};
pub use supervisor::ProcessSupervisor;
pub use types::{CaptureStrategy, Frame, Handle};
