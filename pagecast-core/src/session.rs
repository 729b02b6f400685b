//! Visual session lifecycle
//!
//! A session owns the renderer for one page: it opens the browser,
//! navigates, waits for the page to settle, and later rejuvenates the
//! page in place so long-running overlays never accumulate leaks.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::error::{Result, ResultExt};
use crate::renderer::{Renderer, SharedRenderer};

/// One live page behind the relay
pub struct VisualSession {
    renderer: SharedRenderer,
    page_url: String,
    settle_delay: Duration,
    settle_timeout: Duration,
    started_at: Option<Instant>,
    open: bool,
}

impl VisualSession {
    /// Wrap a renderer for the configured page
    pub fn new(renderer: Box<dyn Renderer>, config: &RelayConfig) -> Self {
        Self {
            renderer: Arc::new(Mutex::new(renderer)),
            page_url: config.page_url.clone(),
            settle_delay: config.settle_delay,
            // Load waits are bounded by the settle delay plus a margin so a
            // dead page cannot wedge startup.
            settle_timeout: config.settle_delay + Duration::from_secs(30),
            started_at: None,
            open: false,
        }
    }

    /// Shared handle for frame sources
    pub fn renderer(&self) -> SharedRenderer {
        self.renderer.clone()
    }

    /// Time since the page was last (re)loaded
    pub fn age(&self) -> Option<Duration> {
        self.started_at.map(|t| t.elapsed())
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Open the browser, navigate to the page, and wait until it settles
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting visual session for {}", self.page_url);
        {
            let mut renderer = self.renderer.lock().await;
            renderer.open().await.context("Opening renderer")?;
            self.open = true;
            renderer
                .navigate(&self.page_url)
                .await
                .context("Navigating to page")?;
            match renderer.wait_settled(self.settle_timeout).await {
                Ok(()) => {}
                Err(e) => warn!("Page load not confirmed, continuing: {}", e),
            }
        }
        // Let animations and late assets warm up before frames flow
        tokio::time::sleep(self.settle_delay).await;
        self.started_at = Some(Instant::now());
        debug!("Visual session settled");
        Ok(())
    }

    /// Reload the page in place and wait for it to settle again
    ///
    /// Frame acquisition keeps running against the same renderer; the
    /// caller decides when a rejuvenation is due.
    pub async fn rejuvenate(&mut self) -> Result<()> {
        info!("Rejuvenating page {}", self.page_url);
        {
            let mut renderer = self.renderer.lock().await;
            renderer.reload().await.context("Reloading page")?;
            match renderer.wait_settled(self.settle_timeout).await {
                Ok(()) => {}
                Err(e) => warn!("Reload not confirmed, continuing: {}", e),
            }
        }
        tokio::time::sleep(self.settle_delay).await;
        self.started_at = Some(Instant::now());
        Ok(())
    }

    /// Tear the browser down; safe to call more than once
    pub async fn stop(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.started_at = None;
        let mut renderer = self.renderer.lock().await;
        renderer.close().await.context("Closing renderer")?;
        info!("Visual session stopped");
        Ok(())
    }
}
