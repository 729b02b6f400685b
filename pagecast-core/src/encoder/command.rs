//! ffmpeg argument construction
//!
//! Pure functions from configuration to argv, kept separate from the
//! process plumbing so they unit-test without spawning anything.

use crate::config::RelayConfig;

/// Arguments for the stdin-fed encoder: JPEG frames on a pipe in,
/// FLV to the RTMP ingest out.
pub fn build_encoder_args(config: &RelayConfig) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "warning".into(),
        // Video input: JPEG images arriving on stdin at the target rate
        "-f".into(),
        "image2pipe".into(),
        "-framerate".into(),
        config.fps.to_string(),
        "-i".into(),
        "pipe:0".into(),
    ];

    args.extend(audio_input_args(config));
    args.extend(output_args(config));
    args
}

/// Arguments for delegated capture: grab an X display directly instead
/// of reading frames from a pipe.
pub fn build_grab_args(config: &RelayConfig) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "warning".into(),
        "-f".into(),
        "x11grab".into(),
        "-framerate".into(),
        config.fps.to_string(),
        "-video_size".into(),
        format!("{}x{}", config.width, config.height),
        "-i".into(),
        config.display.clone(),
    ];

    args.extend(audio_input_args(config));
    args.extend(output_args(config));
    args
}

/// Second input: looped audio file when configured, silence otherwise
fn audio_input_args(config: &RelayConfig) -> Vec<String> {
    match &config.audio_path {
        Some(path) => vec![
            "-stream_loop".into(),
            "-1".into(),
            "-i".into(),
            path.display().to_string(),
        ],
        None => vec![
            "-f".into(),
            "lavfi".into(),
            "-i".into(),
            "anullsrc=channel_layout=stereo:sample_rate=44100".into(),
        ],
    }
}

/// Encoding and muxing flags shared by both input modes
fn output_args(config: &RelayConfig) -> Vec<String> {
    vec![
        "-map".into(),
        "0:v".into(),
        "-map".into(),
        "1:a".into(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "veryfast".into(),
        "-tune".into(),
        "zerolatency".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-s".into(),
        format!("{}x{}", config.width, config.height),
        "-b:v".into(),
        format!("{}k", config.video_bitrate),
        "-maxrate".into(),
        format!("{}k", config.video_bitrate),
        "-bufsize".into(),
        format!("{}k", config.video_bitrate * 2),
        "-g".into(),
        (config.fps * 2).to_string(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        format!("{}k", config.audio_bitrate),
        "-ar".into(),
        "44100".into(),
        "-shortest".into(),
        "-f".into(),
        "flv".into(),
        config.stream_target(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> RelayConfig {
        RelayConfig::new("https://overlay.example/scene", "rtmp://live.example/app")
            .with_stream_key("sk_secret")
            .with_resolution(1920, 1080)
            .with_fps(25)
            .with_video_bitrate(4500)
    }

    #[test]
    fn stdin_encoder_reads_jpeg_pipe() {
        let args = build_encoder_args(&base_config());
        let joined = args.join(" ");
        assert!(joined.contains("-f image2pipe"));
        assert!(joined.contains("-framerate 25"));
        assert!(joined.contains("-i pipe:0"));
        assert!(joined.contains("-c:v libx264"));
        assert!(joined.contains("-b:v 4500k"));
        assert!(joined.contains("-s 1920x1080"));
        assert!(args.last().map(String::as_str) == Some("rtmp://live.example/app/sk_secret"));
    }

    #[test]
    fn silence_audio_by_default() {
        let joined = build_encoder_args(&base_config()).join(" ");
        assert!(joined.contains("anullsrc"));
        assert!(!joined.contains("-stream_loop"));
    }

    #[test]
    fn audio_file_is_looped() {
        let config = base_config().with_audio_path("/srv/music/loop.mp3");
        let joined = build_encoder_args(&config).join(" ");
        assert!(joined.contains("-stream_loop -1 -i /srv/music/loop.mp3"));
        assert!(!joined.contains("anullsrc"));
    }

    #[test]
    fn grab_args_target_the_display() {
        let joined = build_grab_args(&base_config()).join(" ");
        assert!(joined.contains("-f x11grab"));
        assert!(joined.contains("-video_size 1920x1080"));
        assert!(joined.contains("-i :99"));
        assert!(joined.contains("-f flv"));
    }

    #[test]
    fn keyframe_interval_tracks_fps() {
        let joined = build_encoder_args(&base_config()).join(" ");
        assert!(joined.contains("-g 50"));
    }
}
