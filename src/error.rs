//! Error types for the Vigil gateway

use thiserror::Error;

/// Result type alias for Vigil operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Vigil gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio buffer error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error (model load, request failure)
    #[error("STT error: {0}")]
    Stt(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
