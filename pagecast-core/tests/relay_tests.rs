//! Relay state machine and supervisor tests

mod mocks;

use mocks::{MockRenderer, MockState};
use pagecast_core::relay::RendererFactory;
use pagecast_core::renderer::Renderer;
use pagecast_core::{ProcessSupervisor, Relay, RelayConfig, RunState};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn relay_config(encoder_bin: &str) -> RelayConfig {
    RelayConfig::new("https://page.example", "rtmp://ingest.example/live")
        .with_stream_key("test-key")
        .with_encoder_bin(encoder_bin)
        .with_fps(50)
        .with_settle_delay(Duration::ZERO)
        .with_sink_relaunch_delay(Duration::from_millis(20))
        .with_restart_delay(Duration::from_millis(50))
}

fn mock_factory(state: Arc<MockState>) -> RendererFactory {
    Box::new(move |_| Box::new(MockRenderer::new(state.clone())) as Box<dyn Renderer>)
}

#[tokio::test]
async fn relay_start_run_stop_lifecycle() {
    let (_dir, script) = mocks::draining_encoder();
    let config = relay_config(&script.to_string_lossy());
    let state = MockState::new();
    let mut relay = Relay::with_renderer_factory(config, mock_factory(state.clone()));

    assert_eq!(relay.state(), RunState::Stopped);
    relay.start().await.expect("relay start");
    assert_eq!(relay.state(), RunState::Running);
    assert_eq!(state.opens.load(Ordering::Relaxed), 1);

    // Let some frames flow before tearing down
    tokio::time::sleep(Duration::from_millis(200)).await;

    relay.stop().await;
    assert_eq!(relay.state(), RunState::Stopped);
    assert_eq!(state.closes.load(Ordering::Relaxed), 1);
    assert!(state.captures.load(Ordering::Relaxed) >= 1);

    // Idempotent
    relay.stop().await;
    assert_eq!(relay.state(), RunState::Stopped);
}

#[tokio::test]
async fn double_start_is_rejected() {
    let (_dir, script) = mocks::draining_encoder();
    let config = relay_config(&script.to_string_lossy());
    let state = MockState::new();
    let mut relay = Relay::with_renderer_factory(config, mock_factory(state));

    relay.start().await.expect("relay start");
    assert!(relay.start().await.is_err());
    relay.stop().await;
}

#[tokio::test]
async fn failed_renderer_open_leaves_relay_stopped() {
    let (_dir, script) = mocks::draining_encoder();
    let config = relay_config(&script.to_string_lossy());
    let state = MockState::new();
    state.fail_open.store(true, Ordering::Relaxed);
    let mut relay = Relay::with_renderer_factory(config, mock_factory(state.clone()));

    assert!(relay.start().await.is_err());
    assert_eq!(relay.state(), RunState::Stopped);
    // Nothing later in the chain ever came up
    assert_eq!(state.closes.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn failed_encoder_spawn_tears_down_session() {
    let config = relay_config("/nonexistent/encoder-binary");
    let state = MockState::new();
    let mut relay = Relay::with_renderer_factory(config, mock_factory(state.clone()));

    assert!(relay.start().await.is_err());
    assert_eq!(relay.state(), RunState::Stopped);
    // Session was up, so teardown must have closed it
    assert_eq!(state.opens.load(Ordering::Relaxed), 1);
    assert_eq!(state.closes.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn rejuvenation_fires_while_running() {
    let (_dir, script) = mocks::draining_encoder();
    let config = relay_config(&script.to_string_lossy())
        .with_rejuvenate_interval(Duration::from_millis(200));
    let state = MockState::new();
    let mut relay = Relay::with_renderer_factory(config, mock_factory(state.clone()));

    relay.start().await.expect("relay start");
    tokio::select! {
        fatal = relay.run() => panic!("relay failed: {}", fatal),
        _ = tokio::time::sleep(Duration::from_millis(700)) => {}
    }
    relay.stop().await;

    let reloads = state.reloads.load(Ordering::Relaxed);
    assert!(reloads >= 2, "only {} reloads in 700ms at 200ms interval", reloads);
    // Frames kept flowing across rejuvenations
    assert!(state.captures.load(Ordering::Relaxed) > reloads);
}

#[tokio::test]
async fn frame_order_continues_across_rejuvenation() {
    let (_dir, script, recorded) = mocks::recording_encoder();
    let config = relay_config(&script.to_string_lossy())
        .with_rejuvenate_interval(Duration::from_millis(200));
    let state = MockState::new();
    state.stamped_captures.store(true, Ordering::Relaxed);
    let mut relay = Relay::with_renderer_factory(config, mock_factory(state.clone()));

    relay.start().await.expect("relay start");
    tokio::select! {
        fatal = relay.run() => panic!("relay failed: {}", fatal),
        _ = tokio::time::sleep(Duration::from_millis(700)) => {}
    }
    relay.stop().await;

    assert!(
        state.reloads.load(Ordering::Relaxed) >= 1,
        "no rejuvenation observed"
    );
    let written = std::fs::read_to_string(&recorded).expect("read recorded frames");
    let stamps: Vec<u64> = written
        .lines()
        .map(|line| line.trim().parse().expect("numeric stamp"))
        .collect();
    assert!(stamps.len() >= 5, "only {} frames recorded", stamps.len());
    // The stream delivered to the encoder keeps increasing through
    // the reload; it never restarts from the beginning.
    for pair in stamps.windows(2) {
        assert!(
            pair[1] > pair[0],
            "delivery order regressed: {} then {}",
            pair[0],
            pair[1]
        );
    }
}

#[tokio::test]
async fn crash_looping_encoder_fails_the_run() {
    let config = relay_config("/bin/false");
    let state = MockState::new();
    let mut relay = Relay::with_renderer_factory(config, mock_factory(state));

    relay.start().await.expect("relay start");
    let fatal = tokio::time::timeout(Duration::from_secs(10), relay.run())
        .await
        .expect("fatal within the window");
    assert!(fatal.is_fatal());
    relay.stop().await;
    assert_eq!(relay.state(), RunState::Stopped);
}

#[tokio::test]
async fn supervisor_restarts_after_fatal_and_honors_shutdown() {
    let config = relay_config("/bin/false");
    let state = MockState::new();
    let relay = Relay::with_renderer_factory(config, mock_factory(state.clone()));
    let mut supervisor = ProcessSupervisor::new(relay);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        let _ = shutdown_tx.send(true);
    });

    supervisor.run(shutdown_rx).await.expect("supervisor run");

    assert!(supervisor.restarts() >= 1, "no restart observed");
    // Each restart builds a fresh renderer
    assert!(state.opens.load(Ordering::Relaxed) >= 2);
    assert_eq!(supervisor.relay().state(), RunState::Stopped);
}

#[tokio::test]
async fn supervisor_exits_promptly_when_already_shut_down() {
    let (_dir, script) = mocks::draining_encoder();
    let config = relay_config(&script.to_string_lossy());
    let state = MockState::new();
    let relay = Relay::with_renderer_factory(config, mock_factory(state.clone()));
    let mut supervisor = ProcessSupervisor::new(relay);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    shutdown_tx.send(true).expect("send shutdown");

    tokio::time::timeout(Duration::from_secs(5), supervisor.run(shutdown_rx))
        .await
        .expect("prompt exit")
        .expect("clean exit");
    assert_eq!(state.opens.load(Ordering::Relaxed), 0);
}
