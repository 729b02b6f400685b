//! Error classification and context tests

use pagecast_core::error::{RelayError, Result, ResultExt};

#[test]
fn acquisition_errors_are_transient() {
    assert!(!RelayError::acquisition("one dropped frame").is_fatal());
    assert!(RelayError::session("browser gone").is_fatal());
    assert!(RelayError::sink("pipe closed").is_fatal());
    assert!(RelayError::SinkCrashLoop {
        relaunches: 4,
        window_secs: 60
    }
    .is_fatal());
}

#[test]
fn context_wraps_and_displays() {
    let result: Result<()> = Err(RelayError::sink("broken pipe"));
    let err = result.context("Writing frame 42").unwrap_err();
    let text = err.to_string();
    assert!(text.contains("Writing frame 42"));
    assert!(text.contains("broken pipe"));
}

#[test]
fn context_preserves_fatality() {
    let transient = RelayError::acquisition("blip").with_context("Capturing");
    // Context wrapping itself is always treated as fatal at the relay;
    // transient errors never leave the source in wrapped form.
    assert!(transient.is_fatal());
}

#[test]
fn io_errors_convert() {
    let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
    let err: RelayError = io.into();
    assert!(matches!(err, RelayError::Io(_)));
}

#[test]
fn exhaustion_reports_counts() {
    let err = RelayError::SourceExhausted {
        failures: 3,
        last: "timeout".to_string(),
    };
    let text = err.to_string();
    assert!(text.contains('3'));
    assert!(text.contains("timeout"));
}
