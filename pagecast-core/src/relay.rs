//! Relay lifecycle: session + source + sink under one state machine
//!
//! The relay owns one visual session, one frame source, and one
//! encoder sink. It brings them up in order, watches their fatal
//! channels while running, fires page rejuvenation on schedule, and
//! tears everything down in reverse order on stop or failure.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::encoder::{EncoderSink, SinkHandle};
use crate::error::{RelayError, Result, ResultExt};
use crate::renderer::{CdpRenderer, Renderer};
use crate::session::VisualSession;
use crate::source::{create_source, FrameSource};
use crate::types::{CaptureStrategy, Handle};

/// How often the progress line is logged while running
const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Relay lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        write!(f, "{}", s)
    }
}

/// Builds a renderer for each run; swapped out in tests
pub type RendererFactory = Box<dyn Fn(&RelayConfig) -> Box<dyn Renderer> + Send + Sync>;

/// One page-to-RTMP relay
pub struct Relay {
    config: RelayConfig,
    handle: Handle,
    state: RunState,
    renderer_factory: RendererFactory,
    session: Option<VisualSession>,
    source: Option<Box<dyn FrameSource>>,
    sink: Option<EncoderSink>,
    sink_handle: Option<SinkHandle>,
    sink_fatal: Option<mpsc::Receiver<RelayError>>,
    source_fatal: Option<mpsc::Receiver<RelayError>>,
}

impl Relay {
    /// Relay with the stock browser renderer
    pub fn new(config: RelayConfig) -> Self {
        Self::with_renderer_factory(
            config,
            Box::new(|config| {
                let renderer: Box<dyn Renderer> = match config.strategy {
                    CaptureStrategy::Delegated => Box::new(CdpRenderer::on_display(config)),
                    _ => Box::new(CdpRenderer::new(config)),
                };
                renderer
            }),
        )
    }

    /// Relay with a custom renderer constructor
    pub fn with_renderer_factory(config: RelayConfig, factory: RendererFactory) -> Self {
        Self {
            config,
            handle: Handle::new(),
            state: RunState::Stopped,
            renderer_factory: factory,
            session: None,
            source: None,
            sink: None,
            sink_handle: None,
            sink_fatal: None,
            source_fatal: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Bring up session, sink, and source, in that order
    ///
    /// On failure everything already started is torn down in reverse
    /// and the relay returns to `Stopped` with the original error.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != RunState::Stopped {
            return Err(RelayError::AlreadyRunning);
        }
        self.state = RunState::Starting;
        info!(
            "{} starting: {} -> {}",
            self.handle,
            self.config.page_url,
            self.config.safe_stream_target()
        );

        if let Err(e) = self.bring_up().await {
            warn!("{} startup failed: {}", self.handle, e);
            self.tear_down().await;
            self.state = RunState::Stopped;
            return Err(e);
        }

        self.state = RunState::Running;
        info!("{} running", self.handle);
        Ok(())
    }

    async fn bring_up(&mut self) -> Result<()> {
        let renderer = (self.renderer_factory)(&self.config);
        let mut session = VisualSession::new(renderer, &self.config);
        session.start().await.context("Starting visual session")?;
        let shared = session.renderer();
        self.session = Some(session);

        let mut sink = EncoderSink::new(&self.config);
        sink.start().await.context("Starting encoder")?;
        self.sink_fatal = sink.take_fatal();
        self.sink_handle = sink.handle();
        self.sink = Some(sink);

        let sink_handle = self
            .sink_handle
            .clone()
            .ok_or_else(|| RelayError::sink("Encoder produced no frame handle"))?;
        let mut source = create_source(shared, &self.config);
        source
            .start(sink_handle)
            .await
            .context("Starting frame source")?;
        self.source_fatal = source.take_fatal();
        self.source = Some(source);
        Ok(())
    }

    /// Steady state: watch fatal channels and fire rejuvenation
    ///
    /// Returns the fatal error that ended the run. The caller is
    /// expected to `stop()` afterwards.
    pub async fn run(&mut self) -> RelayError {
        if self.state != RunState::Running {
            return RelayError::NoActiveSession;
        }

        let mut sink_fatal = match self.sink_fatal.take() {
            Some(rx) => rx,
            None => return RelayError::sink("Encoder fatal channel missing"),
        };
        let mut source_fatal = match self.source_fatal.take() {
            Some(rx) => rx,
            None => return RelayError::acquisition("Source fatal channel missing"),
        };

        let mut rejuvenate_at = Instant::now() + self.config.rejuvenate_interval;
        let mut stats_at = Instant::now() + STATS_INTERVAL;

        loop {
            tokio::select! {
                fatal = sink_fatal.recv() => {
                    let e = fatal.unwrap_or_else(|| {
                        RelayError::sink("Encoder watcher ended unexpectedly")
                    });
                    error!("{} encoder fatal: {}", self.handle, e);
                    return e;
                }
                fatal = source_fatal.recv() => {
                    let e = fatal.unwrap_or_else(|| {
                        RelayError::acquisition("Frame source ended unexpectedly")
                    });
                    error!("{} source fatal: {}", self.handle, e);
                    return e;
                }
                _ = tokio::time::sleep_until(rejuvenate_at) => {
                    if let Some(session) = self.session.as_mut() {
                        if let Err(e) = session.rejuvenate().await {
                            // A failed reload means the page is gone
                            error!("{} rejuvenation failed: {}", self.handle, e);
                            return e;
                        }
                    }
                    rejuvenate_at = Instant::now() + self.config.rejuvenate_interval;
                }
                _ = tokio::time::sleep_until(stats_at) => {
                    self.log_progress();
                    stats_at = Instant::now() + STATS_INTERVAL;
                }
            }
        }
    }

    fn log_progress(&self) {
        let (accepted, rejected) = match &self.sink_handle {
            Some(h) => (h.frames_accepted(), h.frames_rejected()),
            None => (0, 0),
        };
        let relaunches = self.sink.as_ref().map(EncoderSink::relaunches).unwrap_or(0);
        let emitted = self
            .source
            .as_ref()
            .map(|s| s.frames_emitted())
            .unwrap_or(0);
        info!(
            "{} frames: {} emitted, {} accepted, {} backpressured; encoder relaunches: {}",
            self.handle, emitted, accepted, rejected, relaunches
        );
    }

    /// Tear everything down; idempotent, never fails
    pub async fn stop(&mut self) {
        if self.state == RunState::Stopped {
            return;
        }
        self.state = RunState::Stopping;
        info!("{} stopping", self.handle);
        self.tear_down().await;
        self.state = RunState::Stopped;
        info!("{} stopped", self.handle);
    }

    /// Best-effort reverse-order teardown of whatever is up
    async fn tear_down(&mut self) {
        if let Some(mut source) = self.source.take() {
            if let Err(e) = source.stop().await {
                warn!("Source teardown error: {}", e);
            }
        }
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.stop().await {
                warn!("Encoder teardown error: {}", e);
            }
        }
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.stop().await {
                warn!("Session teardown error: {}", e);
            }
        }
        self.sink_handle = None;
        self.sink_fatal = None;
        self.source_fatal = None;
        debug!("{} teardown complete", self.handle);
    }
}
