//! Rendering-engine seam
//!
//! The relay core only needs a renderer that can load a URL, report
//! content-settled, yield frame bytes on demand or push them with a
//! one-in-flight ack, and be reloaded in place. Everything else about
//! how pixels are produced lives behind this trait.

pub mod cdp;

pub use cdp::CdpRenderer;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

use crate::error::Result;

/// One frame pushed by the renderer's own capture stream
///
/// The renderer withholds the next frame until `ack_screencast` is
/// called with this frame's `ack_id`.
#[derive(Debug, Clone)]
pub struct ScreencastFrame {
    /// JPEG-encoded image bytes
    pub data: Bytes,
    /// Opaque id to acknowledge this frame with
    pub ack_id: u64,
}

/// Contract between the relay core and the rendering engine
#[async_trait]
pub trait Renderer: Send {
    /// Launch the rendering surface and connect to it
    async fn open(&mut self) -> Result<()>;

    /// Navigate to the given URL
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Wait for the page's content-settled signal after a navigate/reload
    async fn wait_settled(&mut self, timeout: Duration) -> Result<()>;

    /// Capture one JPEG snapshot of the current page
    async fn capture(&mut self) -> Result<Bytes>;

    /// Start the renderer's push-style capture stream
    ///
    /// Frames arrive on the returned channel; the renderer sends at most
    /// one unacknowledged frame at a time.
    async fn start_screencast(
        &mut self,
        max_width: u32,
        max_height: u32,
        quality: u32,
    ) -> Result<mpsc::Receiver<ScreencastFrame>>;

    /// Acknowledge a pushed frame, releasing the next one
    async fn ack_screencast(&mut self, ack_id: u64) -> Result<()>;

    /// Stop the push-style capture stream
    async fn stop_screencast(&mut self) -> Result<()>;

    /// Reload the current page in place
    async fn reload(&mut self) -> Result<()>;

    /// Release all renderer resources; idempotent
    async fn close(&mut self) -> Result<()>;
}

/// Renderer shared between the session (rejuvenation) and a frame source
pub type SharedRenderer = Arc<Mutex<Box<dyn Renderer>>>;

/// Wrap a renderer for shared ownership
pub fn shared(renderer: Box<dyn Renderer>) -> SharedRenderer {
    Arc::new(Mutex::new(renderer))
}
