//! Screencast-driven source with per-frame acks

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::RelayConfig;
use crate::encoder::{SendOutcome, SinkHandle};
use crate::error::{RelayError, Result};
use crate::renderer::SharedRenderer;
use crate::source::{FailureWindow, FrameSource};
use crate::types::Frame;

/// Consumes the renderer's screencast stream
///
/// Strictly one frame in flight: the ack for frame N is withheld
/// until the sink has accepted it, so a stalled encoder throttles the
/// renderer instead of piling frames up.
pub struct PushedSource {
    renderer: SharedRenderer,
    width: u32,
    height: u32,
    jpeg_quality: u32,
    failure_threshold: u32,
    failure_window: Duration,
    seq: Arc<AtomicU64>,
    emitted: Arc<AtomicU64>,
    shutdown_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
    fatal_rx: Option<mpsc::Receiver<RelayError>>,
}

impl PushedSource {
    pub fn new(renderer: SharedRenderer, config: &RelayConfig) -> Self {
        Self {
            renderer,
            width: config.width,
            height: config.height,
            jpeg_quality: config.jpeg_quality,
            failure_threshold: config.source_failure_threshold,
            failure_window: config.source_failure_window,
            seq: Arc::new(AtomicU64::new(0)),
            emitted: Arc::new(AtomicU64::new(0)),
            shutdown_tx: None,
            task: None,
            fatal_rx: None,
        }
    }
}

#[async_trait]
impl FrameSource for PushedSource {
    async fn start(&mut self, sink: SinkHandle) -> Result<()> {
        if self.task.is_some() {
            return Err(RelayError::AlreadyRunning);
        }

        let mut frames = {
            let mut renderer = self.renderer.lock().await;
            renderer
                .start_screencast(self.width, self.height, self.jpeg_quality)
                .await?
        };

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let (fatal_tx, fatal_rx) = mpsc::channel(1);

        let renderer = self.renderer.clone();
        let seq = self.seq.clone();
        let emitted = self.emitted.clone();
        let mut failures = FailureWindow::new(self.failure_threshold, self.failure_window);

        self.task = Some(tokio::spawn(async move {
            loop {
                let incoming = tokio::select! {
                    _ = shutdown_rx.changed() => return,
                    incoming = frames.recv() => incoming,
                };

                let Some(incoming) = incoming else {
                    let _ = fatal_tx
                        .send(RelayError::SourceExhausted {
                            failures: failures.streak().max(1),
                            last: "screencast stream ended".to_string(),
                        })
                        .await;
                    return;
                };

                let frame = Frame::new(seq.fetch_add(1, Ordering::Relaxed), incoming.data);
                loop {
                    match sink.send(frame.clone()) {
                        SendOutcome::Accepted => {
                            emitted.fetch_add(1, Ordering::Relaxed);
                            break;
                        }
                        SendOutcome::Backpressured => {
                            debug!("Sink busy, ack withheld for frame {}", frame.seq);
                            tokio::select! {
                                _ = shutdown_rx.changed() => return,
                                _ = sink.drained() => {}
                            }
                        }
                    }
                }

                // Only now may the renderer produce the next frame
                let acked = {
                    let mut renderer = renderer.lock().await;
                    renderer.ack_screencast(incoming.ack_id).await
                };
                match acked {
                    Ok(()) => failures.reset(),
                    Err(e) => {
                        warn!("Screencast ack failed: {}", e);
                        if failures.record() {
                            let _ = fatal_tx
                                .send(RelayError::SourceExhausted {
                                    failures: failures.streak(),
                                    last: e.to_string(),
                                })
                                .await;
                            return;
                        }
                    }
                }
            }
        }));

        self.shutdown_tx = Some(shutdown_tx);
        self.fatal_rx = Some(fatal_rx);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(shutdown_tx) = self.shutdown_tx.take() else {
            return Ok(());
        };
        let _ = shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            if task.await.is_err() {
                warn!("Pushed source task panicked during shutdown");
            }
        }
        let mut renderer = self.renderer.lock().await;
        if let Err(e) = renderer.stop_screencast().await {
            debug!("Stopping screencast failed: {}", e);
        }
        Ok(())
    }

    fn take_fatal(&mut self) -> Option<mpsc::Receiver<RelayError>> {
        self.fatal_rx.take()
    }

    fn frames_emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }
}
