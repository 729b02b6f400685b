//! Mock infrastructure for testing
//!
//! A scriptable renderer double plus helpers for building stand-in
//! encoder commands, so tests never need a real browser or ffmpeg.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use pagecast_core::error::{RelayError, Result};
use pagecast_core::renderer::{Renderer, ScreencastFrame};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Minimal JPEG-looking payload (SOI + EOI markers)
pub fn jpeg_stub() -> Bytes {
    Bytes::from_static(&[0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, 0xff, 0xd9])
}

/// Shared observable state for a [`MockRenderer`]
#[derive(Default)]
pub struct MockState {
    pub opens: AtomicU64,
    pub closes: AtomicU64,
    pub navigations: AtomicU64,
    pub reloads: AtomicU64,
    pub captures: AtomicU64,
    pub acks: AtomicU64,
    pub screencast_stops: AtomicU64,
    /// Fail this many upcoming captures before succeeding again
    pub fail_next_captures: AtomicU64,
    pub fail_open: AtomicBool,
    /// Serve each capture as an ASCII line carrying its ordinal, so a
    /// recording encoder can reconstruct the delivery order
    pub stamped_captures: AtomicBool,
}

impl MockState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

/// Renderer double that counts calls and serves stub frames
pub struct MockRenderer {
    state: Arc<MockState>,
    screencast: Option<mpsc::Sender<ScreencastFrame>>,
    next_ack_id: u64,
}

impl MockRenderer {
    pub fn new(state: Arc<MockState>) -> Self {
        Self {
            state,
            screencast: None,
            next_ack_id: 0,
        }
    }

    fn push_screencast_frame(&mut self) {
        self.next_ack_id += 1;
        if let Some(tx) = &self.screencast {
            let _ = tx.try_send(ScreencastFrame {
                data: jpeg_stub(),
                ack_id: self.next_ack_id,
            });
        }
    }
}

#[async_trait]
impl Renderer for MockRenderer {
    async fn open(&mut self) -> Result<()> {
        if self.state.fail_open.load(Ordering::Relaxed) {
            return Err(RelayError::session("mock renderer refused to open"));
        }
        self.state.opens.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn navigate(&mut self, _url: &str) -> Result<()> {
        self.state.navigations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn wait_settled(&mut self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn capture(&mut self) -> Result<Bytes> {
        let remaining = self.state.fail_next_captures.load(Ordering::Relaxed);
        if remaining > 0 {
            self.state
                .fail_next_captures
                .store(remaining - 1, Ordering::Relaxed);
            return Err(RelayError::acquisition("mock capture failure"));
        }
        let n = self.state.captures.fetch_add(1, Ordering::Relaxed) + 1;
        if self.state.stamped_captures.load(Ordering::Relaxed) {
            return Ok(Bytes::from(format!("{:08}\n", n)));
        }
        Ok(jpeg_stub())
    }

    async fn start_screencast(
        &mut self,
        _max_width: u32,
        _max_height: u32,
        _quality: u32,
    ) -> Result<mpsc::Receiver<ScreencastFrame>> {
        let (tx, rx) = mpsc::channel(4);
        self.screencast = Some(tx);
        // First frame arrives unprompted; the rest only after acks
        self.push_screencast_frame();
        Ok(rx)
    }

    async fn ack_screencast(&mut self, _ack_id: u64) -> Result<()> {
        self.state.acks.fetch_add(1, Ordering::Relaxed);
        self.push_screencast_frame();
        Ok(())
    }

    async fn stop_screencast(&mut self) -> Result<()> {
        self.state.screencast_stops.fetch_add(1, Ordering::Relaxed);
        self.screencast = None;
        Ok(())
    }

    async fn reload(&mut self) -> Result<()> {
        self.state.reloads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.state.closes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

fn write_script(dir: &std::path::Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("encoder.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write script");
    let mut perms = std::fs::metadata(&path).expect("stat script").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod script");
    path
}

/// Write an executable shell script into a temp dir and return both
/// (drop the guard last, or the script disappears).
pub fn stand_in_encoder(body: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_script(dir.path(), body);
    (dir, path)
}

/// Encoder stand-in that drains stdin until EOF
pub fn draining_encoder() -> (tempfile::TempDir, PathBuf) {
    stand_in_encoder("exec cat > /dev/null")
}

/// Encoder stand-in that never reads stdin, so the pipe fills
pub fn stalled_encoder() -> (tempfile::TempDir, PathBuf) {
    stand_in_encoder("exec sleep 600")
}

/// Encoder stand-in that copies stdin into a file, so tests can
/// inspect exactly what reached the encoder and in what order
pub fn recording_encoder() -> (tempfile::TempDir, PathBuf, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("frames.out");
    let path = write_script(dir.path(), &format!("exec cat > \"{}\"", out.display()));
    (dir, path, out)
}
