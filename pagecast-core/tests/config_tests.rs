//! Configuration loading and validation tests

use pagecast_core::config::ConfigFile;
use pagecast_core::types::CaptureStrategy;
use pagecast_core::RelayConfig;
use std::time::Duration;

fn valid_config() -> RelayConfig {
    RelayConfig::new("https://overlay.example/scene", "rtmp://live.example/app")
        .with_stream_key("sk_live_abc123")
}

#[test]
fn defaults_are_streamable() {
    let config = valid_config();
    assert_eq!(config.width, 1280);
    assert_eq!(config.height, 720);
    assert_eq!(config.fps, 30);
    assert_eq!(config.strategy, CaptureStrategy::Polled);
    assert!(config.validate_strict().is_ok());
}

#[test]
fn stream_target_joins_url_and_key() {
    let config = valid_config();
    assert_eq!(
        config.stream_target(),
        "rtmp://live.example/app/sk_live_abc123"
    );
}

#[test]
fn safe_target_masks_the_key() {
    let config = valid_config();
    let safe = config.safe_stream_target();
    assert!(!safe.contains("sk_live_abc123"));
    assert!(safe.contains("****"));
    assert!(safe.starts_with("rtmp://live.example/app"));
}

#[test]
fn frame_period_matches_fps() {
    let config = valid_config().with_fps(25);
    assert_eq!(config.frame_period(), Duration::from_millis(40));
}

#[test]
fn strict_validation_rejects_bad_settings() {
    assert!(RelayConfig::new("", "rtmp://x/app").validate_strict().is_err());
    assert!(RelayConfig::new("https://p.example", "https://not-rtmp.example")
        .validate_strict()
        .is_err());
    assert!(valid_config().with_fps(0).validate_strict().is_err());
    assert!(valid_config().with_fps(120).validate_strict().is_err());
    assert!(valid_config()
        .with_resolution(7680, 4320)
        .validate_strict()
        .is_err());
    assert!(valid_config()
        .with_audio_path("/nonexistent/audio.mp3")
        .validate_strict()
        .is_err());
}

#[test]
fn rtmps_is_accepted() {
    let config = RelayConfig::new("https://p.example", "rtmps://secure.example/app");
    assert!(config.validate_strict().is_ok());
}

#[test]
fn strategy_parses_with_aliases() {
    assert_eq!("polled".parse::<CaptureStrategy>().unwrap(), CaptureStrategy::Polled);
    assert_eq!("screenshot".parse::<CaptureStrategy>().unwrap(), CaptureStrategy::Polled);
    assert_eq!("push".parse::<CaptureStrategy>().unwrap(), CaptureStrategy::Pushed);
    assert_eq!("x11grab".parse::<CaptureStrategy>().unwrap(), CaptureStrategy::Delegated);
    assert!("webcam".parse::<CaptureStrategy>().is_err());
}

#[test]
fn missing_file_yields_defaults() {
    let file =
        ConfigFile::load_from("/nonexistent/pagecast/config.toml".into()).expect("defaults");
    assert_eq!(file.capture.fps, 30);
    assert_eq!(file.process.browser_bin, "chromium");
}

#[test]
fn file_values_flow_into_relay_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[stream]
page_url = "https://scoreboard.example"
url = "rtmp://ingest.example/live"
video_bitrate = 4500

[capture]
strategy = "pushed"
width = 1920
height = 1080
fps = 24

[timing]
rejuvenate_secs = 600
"#,
    )
    .expect("write config");

    let config = ConfigFile::load_from(path).expect("load").into_relay_config();
    assert_eq!(config.page_url, "https://scoreboard.example");
    assert_eq!(config.stream_url, "rtmp://ingest.example/live");
    assert_eq!(config.video_bitrate, 4500);
    assert_eq!(config.strategy, CaptureStrategy::Pushed);
    assert_eq!((config.width, config.height), (1920, 1080));
    assert_eq!(config.fps, 24);
    assert_eq!(config.rejuvenate_interval, Duration::from_secs(600));
    // Untouched sections keep their defaults
    assert_eq!(config.restart_delay, Duration::from_secs(10));
    assert_eq!(config.encoder_bin, "ffmpeg");
}

#[test]
fn malformed_file_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[stream\npage_url = broken").expect("write config");
    assert!(ConfigFile::load_from(path).is_err());
}

#[test]
fn validation_warns_without_failing() {
    // Valid but questionable: tiny bitrate for the resolution
    let config = valid_config()
        .with_resolution(1920, 1080)
        .with_video_bitrate(300);
    assert!(config.validate_strict().is_ok());
    assert!(!config.validate().is_empty());
}
