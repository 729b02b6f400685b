//! Timer-driven screenshot source

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::RelayConfig;
use crate::encoder::{SendOutcome, SinkHandle};
use crate::error::{RelayError, Result};
use crate::renderer::SharedRenderer;
use crate::source::{FailureWindow, FrameSource};
use crate::types::Frame;

/// Captures a screenshot per frame period
///
/// At most one capture is ever in flight: a slow capture or a
/// backpressured sink causes ticks to be skipped, never queued.
pub struct PolledSource {
    renderer: SharedRenderer,
    period: Duration,
    failure_threshold: u32,
    failure_window: Duration,
    seq: Arc<AtomicU64>,
    emitted: Arc<AtomicU64>,
    shutdown_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
    fatal_rx: Option<mpsc::Receiver<RelayError>>,
}

impl PolledSource {
    pub fn new(renderer: SharedRenderer, config: &RelayConfig) -> Self {
        Self {
            renderer,
            period: config.frame_period(),
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
impl FrameSource for PolledSource {
    async fn start(&mut self, sink: SinkHandle) -> Result<()> {
        if self.task.is_some() {
            return Err(RelayError::AlreadyRunning);
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let (fatal_tx, fatal_rx) = mpsc::channel(1);

        let renderer = self.renderer.clone();
        let period = self.period;
        let seq = self.seq.clone();
        let emitted = self.emitted.clone();
        let mut failures = FailureWindow::new(self.failure_threshold, self.failure_window);

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => return,
                    _ = ticker.tick() => {}
                }

                let captured = {
                    let mut renderer = renderer.lock().await;
                    renderer.capture().await
                };

                let data = match captured {
                    Ok(data) => {
                        failures.reset();
                        data
                    }
                    Err(e) => {
                        warn!("Capture failed: {}", e);
                        if failures.record() {
                            let _ = fatal_tx
                                .send(RelayError::SourceExhausted {
                                    failures: failures.streak(),
                                    last: e.to_string(),
                                })
                                .await;
                            return;
                        }
                        continue;
                    }
                };

                let frame = Frame::new(seq.fetch_add(1, Ordering::Relaxed), data);
                loop {
                    match sink.send(frame.clone()) {
                        SendOutcome::Accepted => {
                            emitted.fetch_add(1, Ordering::Relaxed);
                            break;
                        }
                        SendOutcome::Backpressured => {
                            debug!("Sink busy, holding frame {}", frame.seq);
                            tokio::select! {
                                _ = shutdown_rx.changed() => return,
                                _ = sink.drained() => {}
                            }
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
                warn!("Polled source task panicked during shutdown");
            }
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
