//! Headless-browser renderer over the DevTools protocol
//!
//! Spawns a Chromium subprocess, scrapes the DevTools websocket URL from
//! its stderr banner, and drives a single page target over the wire:
//! navigate, load-event wait, screenshot capture, screencast with
//! per-frame acks, and in-place reload.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::renderer::{Renderer, ScreencastFrame};

/// How long to wait for the DevTools banner after spawning the browser
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(20);
/// Per-command response timeout
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Map of in-flight command ids to their response slots
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

/// Browser renderer driven over the DevTools protocol
pub struct CdpRenderer {
    browser_bin: String,
    width: u32,
    height: u32,
    jpeg_quality: u32,
    /// When set, render on this X display instead of headless
    display: Option<String>,
    grace_timeout: Duration,

    child: Option<Child>,
    cmd_tx: Option<mpsc::Sender<String>>,
    pending: PendingMap,
    next_id: u64,
    /// DevTools session id of the attached page target
    page_session: Option<String>,
    /// Bumped by the reader task on every page load event
    load_rx: Option<watch::Receiver<u64>>,
    /// Where the reader task routes screencast frames, when active
    screencast_slot: Arc<Mutex<Option<mpsc::Sender<ScreencastFrame>>>>,
    reader_task: Option<JoinHandle<()>>,
    stderr_task: Option<JoinHandle<()>>,
}

impl CdpRenderer {
    /// Create a headless renderer from the relay configuration
    pub fn new(config: &RelayConfig) -> Self {
        Self::with_options(config, None)
    }

    /// Create a renderer on an X display (delegated capture)
    pub fn on_display(config: &RelayConfig) -> Self {
        Self::with_options(config, Some(config.display.clone()))
    }

    fn with_options(config: &RelayConfig, display: Option<String>) -> Self {
        Self {
            browser_bin: config.browser_bin.clone(),
            width: config.width,
            height: config.height,
            jpeg_quality: config.jpeg_quality,
            display,
            grace_timeout: config.grace_timeout,
            child: None,
            cmd_tx: None,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: 0,
            page_session: None,
            load_rx: None,
            screencast_slot: Arc::new(Mutex::new(None)),
            reader_task: None,
            stderr_task: None,
        }
    }

    /// Spawn the browser and wait for its DevTools banner
    async fn launch(&mut self) -> Result<String> {
        let mut cmd = Command::new(&self.browser_bin);
        cmd.arg("--remote-debugging-port=0")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-gpu")
            .arg("--mute-audio")
            .arg("--hide-scrollbars")
            .arg("--no-sandbox")
            .arg(format!("--window-size={},{}", self.width, self.height));

        match &self.display {
            Some(display) => {
                cmd.env("DISPLAY", display);
                cmd.arg("--window-position=0,0").arg("--kiosk");
            }
            None => {
                cmd.arg("--headless=new");
            }
        }

        cmd.arg("about:blank")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Launching browser: {}", self.browser_bin);
        let mut child = cmd.spawn().map_err(|e| {
            RelayError::session(format!("Failed to spawn browser '{}': {}", self.browser_bin, e))
        })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RelayError::session("Failed to capture browser stderr"))?;
        let mut lines = BufReader::new(stderr).lines();

        let ws_url = tokio::time::timeout(LAUNCH_TIMEOUT, async {
            while let Ok(Some(line)) = lines.next_line().await {
                trace!("browser: {}", line);
                if let Some(url) = line.strip_prefix("DevTools listening on ") {
                    return Some(url.trim().to_string());
                }
            }
            None
        })
        .await
        .map_err(|_| RelayError::session("Timed out waiting for DevTools banner"))?
        .ok_or_else(|| RelayError::session("Browser exited before announcing DevTools"))?;

        // Keep draining stderr so the browser never blocks on a full pipe
        self.stderr_task = Some(tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                trace!("browser: {}", line);
            }
        }));

        self.child = Some(child);
        Ok(ws_url)
    }

    /// Send a command on the browser connection and await its response
    async fn command(&mut self, method: &str, params: Value) -> Result<Value> {
        let cmd_tx = self
            .cmd_tx
            .clone()
            .ok_or(RelayError::NoActiveSession)?;

        self.next_id += 1;
        let id = self.next_id;

        let mut msg = json!({ "id": id, "method": method, "params": params });
        if let Some(ref session) = self.page_session {
            msg["sessionId"] = json!(session);
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        cmd_tx
            .send(msg.to_string())
            .await
            .map_err(|_| RelayError::session("DevTools connection closed"))?;

        let response = tokio::time::timeout(COMMAND_TIMEOUT, rx)
            .await
            .map_err(|_| RelayError::session(format!("{} timed out", method)))?
            .map_err(|_| RelayError::session("DevTools connection closed"))?;

        if let Some(error) = response.get("error") {
            return Err(RelayError::session(format!("{} failed: {}", method, error)));
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Attach to the browser's first page target in flat mode
    async fn attach_to_page(&mut self) -> Result<()> {
        let targets = self.command("Target.getTargets", json!({})).await?;
        let target_id = targets["targetInfos"]
            .as_array()
            .and_then(|infos| {
                infos
                    .iter()
                    .find(|t| t["type"] == "page")
                    .and_then(|t| t["targetId"].as_str())
                    .map(str::to_string)
            });

        let target_id = match target_id {
            Some(id) => id,
            None => {
                let created = self
                    .command("Target.createTarget", json!({ "url": "about:blank" }))
                    .await?;
                created["targetId"]
                    .as_str()
                    .ok_or_else(|| RelayError::session("Target.createTarget returned no id"))?
                    .to_string()
            }
        };

        let attached = self
            .command(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
            )
            .await?;
        let session = attached["sessionId"]
            .as_str()
            .ok_or_else(|| RelayError::session("Target.attachToTarget returned no session"))?
            .to_string();

        self.page_session = Some(session);
        self.command("Page.enable", json!({})).await?;
        Ok(())
    }
}

#[async_trait]
impl Renderer for CdpRenderer {
    async fn open(&mut self) -> Result<()> {
        if self.child.is_some() {
            return Ok(());
        }

        let ws_url = self.launch().await?;
        debug!("Connecting to DevTools at {}", ws_url);

        let (stream, _) = connect_async(ws_url.as_str()).await?;
        let (mut ws_sink, mut ws_stream) = stream.split();

        let (cmd_tx, mut cmd_rx) = mpsc::channel::<String>(16);
        tokio::spawn(async move {
            while let Some(text) = cmd_rx.recv().await {
                if ws_sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        });

        let (load_tx, load_rx) = watch::channel(0u64);
        let pending = self.pending.clone();
        let screencast_slot = self.screencast_slot.clone();

        self.reader_task = Some(tokio::spawn(async move {
            while let Some(message) = ws_stream.next().await {
                let text = match message {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                };
                let value: Value = match serde_json::from_str(&text) {
                    Ok(value) => value,
                    Err(e) => {
                        warn!("Unparseable DevTools message: {}", e);
                        continue;
                    }
                };

                if let Some(id) = value.get("id").and_then(Value::as_u64) {
                    if let Some(tx) = pending.lock().await.remove(&id) {
                        let _ = tx.send(value);
                    }
                    continue;
                }

                match value.get("method").and_then(Value::as_str) {
                    Some("Page.loadEventFired") => {
                        load_tx.send_modify(|n| *n += 1);
                    }
                    Some("Page.screencastFrame") => {
                        let params = &value["params"];
                        let ack_id = params["sessionId"].as_u64().unwrap_or(0);
                        let data = params["data"]
                            .as_str()
                            .and_then(|b64| BASE64.decode(b64).ok());
                        let Some(data) = data else {
                            warn!("Screencast frame with undecodable payload");
                            continue;
                        };
                        let frame = ScreencastFrame {
                            data: Bytes::from(data),
                            ack_id,
                        };
                        let slot = screencast_slot.lock().await.clone();
                        if let Some(tx) = slot {
                            // The browser withholds the next frame until the
                            // ack, so this send never backs up far.
                            let _ = tx.send(frame).await;
                        }
                    }
                    _ => {}
                }
            }
            debug!("DevTools reader finished");
        }));

        self.cmd_tx = Some(cmd_tx);
        self.load_rx = Some(load_rx);
        self.attach_to_page().await?;
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<()> {
        if let Some(ref mut load_rx) = self.load_rx {
            load_rx.borrow_and_update();
        }
        let result = self.command("Page.navigate", json!({ "url": url })).await?;
        if let Some(error_text) = result.get("errorText").and_then(Value::as_str) {
            if !error_text.is_empty() {
                return Err(RelayError::session(format!(
                    "Navigation to {} failed: {}",
                    url, error_text
                )));
            }
        }
        Ok(())
    }

    async fn wait_settled(&mut self, timeout: Duration) -> Result<()> {
        let load_rx = self.load_rx.as_mut().ok_or(RelayError::NoActiveSession)?;
        tokio::time::timeout(timeout, load_rx.changed())
            .await
            .map_err(|_| RelayError::session("Timed out waiting for page load"))?
            .map_err(|_| RelayError::session("DevTools connection closed"))?;
        Ok(())
    }

    async fn capture(&mut self) -> Result<Bytes> {
        let quality = self.jpeg_quality;
        let result = self
            .command(
                "Page.captureScreenshot",
                json!({ "format": "jpeg", "quality": quality }),
            )
            .await
            .map_err(|e| RelayError::acquisition(e.to_string()))?;
        let b64 = result["data"]
            .as_str()
            .ok_or_else(|| RelayError::acquisition("Screenshot response carried no data"))?;
        let data = BASE64
            .decode(b64)
            .map_err(|e| RelayError::acquisition(format!("Screenshot decode failed: {}", e)))?;
        Ok(Bytes::from(data))
    }

    async fn start_screencast(
        &mut self,
        max_width: u32,
        max_height: u32,
        quality: u32,
    ) -> Result<mpsc::Receiver<ScreencastFrame>> {
        let (tx, rx) = mpsc::channel(4);
        *self.screencast_slot.lock().await = Some(tx);
        self.command(
            "Page.startScreencast",
            json!({
                "format": "jpeg",
                "quality": quality,
                "maxWidth": max_width,
                "maxHeight": max_height,
                "everyNthFrame": 1,
            }),
        )
        .await?;
        Ok(rx)
    }

    async fn ack_screencast(&mut self, ack_id: u64) -> Result<()> {
        self.command("Page.screencastFrameAck", json!({ "sessionId": ack_id }))
            .await?;
        Ok(())
    }

    async fn stop_screencast(&mut self) -> Result<()> {
        *self.screencast_slot.lock().await = None;
        self.command("Page.stopScreencast", json!({})).await?;
        Ok(())
    }

    async fn reload(&mut self) -> Result<()> {
        if let Some(ref mut load_rx) = self.load_rx {
            load_rx.borrow_and_update();
        }
        self.command("Page.reload", json!({})).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        // Ask nicely first; ignore failures since the kill path follows.
        self.page_session = None;
        if self.cmd_tx.is_some() {
            let _ = self.command("Browser.close", json!({})).await;
        }
        self.cmd_tx = None;
        self.load_rx = None;
        *self.screencast_slot.lock().await = None;

        match tokio::time::timeout(self.grace_timeout, child.wait()).await {
            Ok(Ok(status)) => debug!("Browser exited: {}", status),
            Ok(Err(e)) => {
                warn!("Error waiting for browser exit: {}", e);
                child.kill().await.ok();
            }
            Err(_) => {
                warn!("Browser ignored close request, killing");
                child.kill().await.ok();
            }
        }

        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        self.pending.lock().await.clear();
        Ok(())
    }
}

impl Drop for CdpRenderer {
    fn drop(&mut self) {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        // kill_on_drop(true) reaps the browser if close() was never called
    }
}
