//! Error types for the vtalk conversation backend.
//!
//! Each variant carries a stable error code (SCREAMING_SNAKE_CASE) that is
//! included in the Display output and accessible via [`ChatError::code()`].

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// Invalid or missing configuration.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// The generation request could not be opened.
    pub const TRANSPORT_FAILED: &str = "TRANSPORT_FAILED";

    /// The generation stream broke after it was accepted.
    pub const STREAM_FAILED: &str = "STREAM_FAILED";

    /// The emotion classification call failed.
    pub const CLASSIFICATION_FAILED: &str = "CLASSIFICATION_FAILED";

    /// Speech synthesis failed.
    pub const TTS_FAILED: &str = "TTS_FAILED";

    /// Malformed inbound message or a prompt while a turn is in flight.
    pub const PROTOCOL_ERROR: &str = "PROTOCOL_ERROR";

    /// The WebSocket server could not start or serve.
    pub const SERVER_ERROR: &str = "SERVER_ERROR";

    /// Filesystem I/O failed.
    pub const IO_ERROR: &str = "IO_ERROR";
}

/// Top-level error type for the conversation backend.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Configuration error.
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    Config(String),

    /// Generation request could not be opened (connect failure, HTTP status).
    #[error("[{}] {}", error_codes::TRANSPORT_FAILED, .0)]
    Transport(String),

    /// Generation stream failed mid-flight or ended without completing.
    #[error("[{}] {}", error_codes::STREAM_FAILED, .0)]
    Stream(String),

    /// Emotion classification error.
    #[error("[{}] {}", error_codes::CLASSIFICATION_FAILED, .0)]
    Classification(String),

    /// Text-to-speech synthesis error.
    #[error("[{}] {}", error_codes::TTS_FAILED, .0)]
    Tts(String),

    /// Client protocol violation.
    #[error("[{}] {}", error_codes::PROTOCOL_ERROR, .0)]
    Protocol(String),

    /// Server bind / serve error.
    #[error("[{}] {}", error_codes::SERVER_ERROR, .0)]
    Server(String),

    /// I/O error.
    #[error("[{}] {}", error_codes::IO_ERROR, .0)]
    Io(#[from] std::io::Error),
}

impl ChatError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => error_codes::CONFIG_INVALID,
            Self::Transport(_) => error_codes::TRANSPORT_FAILED,
            Self::Stream(_) => error_codes::STREAM_FAILED,
            Self::Classification(_) => error_codes::CLASSIFICATION_FAILED,
            Self::Tts(_) => error_codes::TTS_FAILED,
            Self::Protocol(_) => error_codes::PROTOCOL_ERROR,
            Self::Server(_) => error_codes::SERVER_ERROR,
            Self::Io(_) => error_codes::IO_ERROR,
        }
    }

    /// Returns the inner message without the code prefix.
    ///
    /// This is the text sent to clients in `error` events.
    pub fn message(&self) -> String {
        match self {
            Self::Config(m)
            | Self::Transport(m)
            | Self::Stream(m)
            | Self::Classification(m)
            | Self::Tts(m)
            | Self::Protocol(m)
            | Self::Server(m) => m.clone(),
            Self::Io(e) => e.to_string(),
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ChatError>;
