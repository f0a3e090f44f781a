//! Error types for the hearth daemon

use thiserror::Error;

/// Result type alias for hearth operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the hearth daemon
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio capture/playback error
    #[error("audio error: {0}")]
    Audio(String),

    /// Recording session error
    #[error("recording error: {0}")]
    Recording(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Chat backend error
    #[error("chat error: {0}")]
    Chat(String),

    /// Hotword detection error
    #[error("hotword error: {0}")]
    Hotword(String),

    /// Weather lookup error
    #[error("weather error: {0}")]
    Weather(String),

    /// Music service error
    #[error("music error: {0}")]
    Music(String),

    /// Hardware/peripheral error
    #[error("hardware error: {0}")]
    Hardware(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
