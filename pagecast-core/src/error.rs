//! Error types for Pagecast

use thiserror::Error;

/// Result type alias using RelayError
pub type Result<T> = std::result::Result<T, RelayError>;

/// Main error type for Pagecast operations
#[derive(Debug, Error)]
pub enum RelayError {
    /// Renderer/session error (navigation, settle wait, DevTools protocol)
    #[error("Session error: {0}")]
    Session(String),

    /// Transient frame acquisition failure (single capture dropped)
    #[error("Acquisition error: {0}")]
    Acquisition(String),

    /// Frame source gave up after repeated acquisition failures
    #[error("Frame source failed: {failures} consecutive acquisition errors (last: {last})")]
    SourceExhausted { failures: u32, last: String },

    /// Encoder sink error
    #[error("Sink error: {0}")]
    Sink(String),

    /// Encoder subprocess is crash-looping
    #[error("Encoder crash loop: {relaunches} relaunches within {window_secs}s")]
    SinkCrashLoop { relaunches: u32, window_secs: u64 },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Relay already running
    #[error("Relay already running")]
    AlreadyRunning,

    /// Component used before start or after stop
    #[error("No active session")]
    NoActiveSession,

    /// Unsupported operation for the selected capture strategy
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<RelayError>,
    },
}

impl RelayError {
    /// Create a session error
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// Create a transient acquisition error
    pub fn acquisition(msg: impl Into<String>) -> Self {
        Self::Acquisition(msg.into())
    }

    /// Create a sink error
    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error tears down the whole pipeline run
    ///
    /// Transient acquisition errors are absorbed inside the frame source;
    /// everything else that reaches the relay is fatal to the current run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Acquisition(_))
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RelayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Session(format!("DevTools websocket error: {}", err))
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Session(format!("DevTools message error: {}", err))
    }
}
