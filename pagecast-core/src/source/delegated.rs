//! Delegated source: capture happens outside the relay

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

use crate::encoder::SinkHandle;
use crate::error::{RelayError, Result};
use crate::source::FrameSource;

/// No-op source for display-grab capture
///
/// The encoder reads the display directly, so there are no frames to
/// hand over. This exists so the relay lifecycle stays uniform across
/// strategies.
pub struct DelegatedSource {
    running: bool,
    // Held open so the relay's fatal watch pends instead of closing
    _fatal_tx: mpsc::Sender<RelayError>,
    fatal_rx: Option<mpsc::Receiver<RelayError>>,
}

impl DelegatedSource {
    pub fn new() -> Self {
        let (fatal_tx, fatal_rx) = mpsc::channel(1);
        Self {
            running: false,
            _fatal_tx: fatal_tx,
            fatal_rx: Some(fatal_rx),
        }
    }
}

impl Default for DelegatedSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameSource for DelegatedSource {
    async fn start(&mut self, _sink: SinkHandle) -> Result<()> {
        if self.running {
            return Err(RelayError::AlreadyRunning);
        }
        self.running = true;
        info!("Delegated capture: encoder grabs the display directly");
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.running = false;
        Ok(())
    }

    fn take_fatal(&mut self) -> Option<mpsc::Receiver<RelayError>> {
        self.fatal_rx.take()
    }

    fn frames_emitted(&self) -> u64 {
        0
    }
}
