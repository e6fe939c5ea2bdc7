//! Error types for the brief gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the brief gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Backend retries exhausted (or a permanent failure); terminal for the turn
    #[error("backend unavailable after {attempts} attempt(s): {last_error}")]
    BackendUnavailable {
        /// Attempts made before giving up
        attempts: u32,
        /// Last underlying failure, for diagnostics
        last_error: String,
    },

    /// A session with this id is already open
    #[error("session already exists: {0}")]
    SessionExists(String),

    /// No open session with this id
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Session has ended and accepts no further events
    #[error("session terminated: {0}")]
    SessionTerminated(String),

    /// Utterance text was blank
    #[error("utterance is empty")]
    EmptyUtterance,

    /// Speech synthesis error
    #[error("speech error: {0}")]
    Speech(String),

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
