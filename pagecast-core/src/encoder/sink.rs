//! Encoder sink: subprocess lifetime and the frame pipe
//!
//! One ffmpeg child at a time. Frames enter through a single-slot
//! channel so a stalled encoder backpressures acquisition instead of
//! growing a queue. The exit watcher relaunches a crashed encoder
//! after a short delay and escalates to a fatal error when crashes
//! cluster inside the configured window.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::encoder::command::{build_encoder_args, build_grab_args};
use crate::error::{RelayError, Result};
use crate::types::{CaptureStrategy, Frame};

/// Result of a non-blocking frame hand-off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Frame took the slot and will be written to the encoder
    Accepted,
    /// Slot still occupied; retry after `drained()`
    Backpressured,
}

/// Cloneable frame entry point handed to frame sources
#[derive(Clone)]
pub struct SinkHandle {
    frame_tx: mpsc::Sender<Frame>,
    drained: Arc<Notify>,
    accepted: Arc<AtomicU64>,
    rejected: Arc<AtomicU64>,
}

impl SinkHandle {
    /// Offer a frame without waiting
    pub fn send(&self, frame: Frame) -> SendOutcome {
        match self.frame_tx.try_send(frame) {
            Ok(()) => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
                SendOutcome::Accepted
            }
            Err(_) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                SendOutcome::Backpressured
            }
        }
    }

    /// Resolves once the slot has been freed by the writer
    pub async fn drained(&self) {
        self.drained.notified().await;
    }

    pub fn frames_accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn frames_rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Supervised encoder subprocess
pub struct EncoderSink {
    config: RelayConfig,
    handle: Option<SinkHandle>,
    fatal_rx: Option<mpsc::Receiver<RelayError>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
    relaunches: Arc<AtomicU64>,
}

impl EncoderSink {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            config: config.clone(),
            handle: None,
            fatal_rx: None,
            shutdown_tx: None,
            task: None,
            relaunches: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Frame entry point; available after `start`
    pub fn handle(&self) -> Option<SinkHandle> {
        self.handle.clone()
    }

    /// Take the fatal-error channel; the relay polls this alongside
    /// the frame flow. Yields once, on crash-loop escalation.
    pub fn take_fatal(&mut self) -> Option<mpsc::Receiver<RelayError>> {
        self.fatal_rx.take()
    }

    pub fn relaunches(&self) -> u64 {
        self.relaunches.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Spawn the first encoder and the watcher loop
    pub async fn start(&mut self) -> Result<()> {
        if self.task.is_some() {
            return Err(RelayError::AlreadyRunning);
        }

        let child = spawn_encoder(&self.config)?;
        info!(
            "Encoder started: {} -> {}",
            self.config.encoder_bin,
            self.config.safe_stream_target()
        );

        let (frame_tx, frame_rx) = mpsc::channel(1);
        let (fatal_tx, fatal_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let drained = Arc::new(Notify::new());

        let handle = SinkHandle {
            frame_tx,
            drained: drained.clone(),
            accepted: Arc::new(AtomicU64::new(0)),
            rejected: Arc::new(AtomicU64::new(0)),
        };

        let loop_state = SinkLoop {
            config: self.config.clone(),
            frame_rx,
            drained,
            fatal_tx,
            shutdown_rx,
            relaunches: self.relaunches.clone(),
        };
        self.task = Some(tokio::spawn(loop_state.run(child)));

        self.handle = Some(handle);
        self.fatal_rx = Some(fatal_rx);
        self.shutdown_tx = Some(shutdown_tx);
        Ok(())
    }

    /// Shut the encoder down; safe to call more than once
    pub async fn stop(&mut self) -> Result<()> {
        let Some(shutdown_tx) = self.shutdown_tx.take() else {
            return Ok(());
        };
        let _ = shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            if task.await.is_err() {
                warn!("Encoder watcher task panicked during shutdown");
            }
        }
        self.handle = None;
        self.fatal_rx = None;
        info!("Encoder stopped");
        Ok(())
    }
}

/// State carried by the watcher/relaunch loop task
struct SinkLoop {
    config: RelayConfig,
    frame_rx: mpsc::Receiver<Frame>,
    drained: Arc<Notify>,
    fatal_tx: mpsc::Sender<RelayError>,
    shutdown_rx: watch::Receiver<bool>,
    relaunches: Arc<AtomicU64>,
}

impl SinkLoop {
    async fn run(mut self, first_child: Child) {
        let mut crash_times: VecDeque<Instant> = VecDeque::new();
        let mut child = first_child;

        loop {
            let mut stdin = child.stdin.take();

            let status = loop {
                tokio::select! {
                    _ = self.shutdown_rx.changed() => {
                        shutdown_child(child, stdin, self.config.grace_timeout).await;
                        return;
                    }
                    status = child.wait() => break status,
                    frame = self.frame_rx.recv() => {
                        let Some(frame) = frame else {
                            shutdown_child(child, stdin, self.config.grace_timeout).await;
                            return;
                        };
                        // Slot is free again; let the source proceed
                        self.drained.notify_one();
                        let mut exited = None;
                        let mut stopping = false;
                        if let Some(pipe) = stdin.as_mut() {
                            // The write races the stop signal and the exit
                            // watcher; a saturated pipe must never leave
                            // either one unpolled.
                            tokio::select! {
                                res = pipe.write_all(&frame.data) => {
                                    if let Err(e) = res {
                                        debug!("Encoder stdin write failed (seq {}): {}", frame.seq, e);
                                    }
                                }
                                _ = self.shutdown_rx.changed() => stopping = true,
                                status = child.wait() => exited = Some(status),
                            }
                        }
                        if stopping {
                            shutdown_child(child, stdin, self.config.grace_timeout).await;
                            return;
                        }
                        if let Some(status) = exited {
                            break status;
                        }
                    }
                }
            };

            match status {
                Ok(status) => warn!("Encoder exited unexpectedly: {}", status),
                Err(e) => warn!("Encoder wait failed: {}", e),
            }

            if let Some(fatal) = self.record_crash(&mut crash_times) {
                let _ = self.fatal_tx.send(fatal).await;
                return;
            }

            // Failed spawn attempts count like crashes, so a missing
            // binary still trips the escalation instead of spinning.
            child = loop {
                tokio::select! {
                    _ = self.shutdown_rx.changed() => return,
                    _ = tokio::time::sleep(self.config.sink_relaunch_delay) => {}
                }

                match spawn_encoder(&self.config) {
                    Ok(next) => {
                        self.relaunches.fetch_add(1, Ordering::Relaxed);
                        info!("Encoder relaunched");
                        break next;
                    }
                    Err(e) => {
                        warn!("Encoder relaunch failed: {}", e);
                        if let Some(fatal) = self.record_crash(&mut crash_times) {
                            let _ = self.fatal_tx.send(fatal).await;
                            return;
                        }
                    }
                }
            };
        }
    }

    /// Record one encoder failure, pruning entries older than the
    /// crash window. Yields the fatal error once failures cluster
    /// past the configured threshold.
    fn record_crash(&self, crash_times: &mut VecDeque<Instant>) -> Option<RelayError> {
        let now = Instant::now();
        crash_times.push_back(now);
        while let Some(front) = crash_times.front() {
            if now.duration_since(*front) > self.config.sink_crash_window {
                crash_times.pop_front();
            } else {
                break;
            }
        }
        if crash_times.len() as u32 > self.config.sink_crash_threshold {
            error!(
                "Encoder crash loop: {} failures within {:?}",
                crash_times.len(),
                self.config.sink_crash_window
            );
            return Some(RelayError::SinkCrashLoop {
                relaunches: crash_times.len() as u32,
                window_secs: self.config.sink_crash_window.as_secs(),
            });
        }
        None
    }
}

fn spawn_encoder(config: &RelayConfig) -> Result<Child> {
    let (args, stdin_mode) = match config.strategy {
        CaptureStrategy::Delegated => (build_grab_args(config), Stdio::null()),
        _ => (build_encoder_args(config), Stdio::piped()),
    };

    let mut child = Command::new(&config.encoder_bin)
        .args(&args)
        .stdin(stdin_mode)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            RelayError::sink(format!(
                "Failed to spawn encoder '{}': {}",
                config.encoder_bin, e
            ))
        })?;

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("encoder: {}", line);
            }
        });
    }

    Ok(child)
}

/// EOF stdin, deliver SIGTERM, wait out the grace period, then kill
async fn shutdown_child(mut child: Child, stdin: Option<ChildStdin>, grace: std::time::Duration) {
    drop(stdin);
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => debug!("Encoder exited: {}", status),
        Ok(Err(e)) => warn!("Encoder shutdown wait failed: {}", e),
        Err(_) => {
            warn!("Encoder ignored SIGTERM, killing");
            let _ = child.kill().await;
        }
    }
}
