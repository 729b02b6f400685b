//! Encoder subprocess integration
//!
//! The relay never encodes video itself. Frames are piped as JPEG
//! images into an external ffmpeg process which muxes them (plus an
//! audio track) into an FLV stream to the RTMP ingest.

mod command;
mod sink;

pub use command::{build_encoder_args, build_grab_args};
pub use sink::{EncoderSink, SendOutcome, SinkHandle};

use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Check whether the configured encoder binary responds to `-version`
pub async fn encoder_available(encoder_bin: &str) -> bool {
    let result = Command::new(encoder_bin)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match result {
        Ok(status) => status.success(),
        Err(e) => {
            debug!("Encoder probe failed: {}", e);
            false
        }
    }
}
