//! Error types for the avatar engine

use std::time::Duration;

use thiserror::Error;

/// Result type alias for avatar operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the avatar engine
///
/// Malformed control payloads and analysis unavailability have no variant:
/// both are recovered locally.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device or analysis error
    #[error("audio error: {0}")]
    Audio(String),

    /// Session failed to establish
    #[error("connection error: {0}")]
    Connection(String),

    /// Session did not establish within the configured bound
    #[error("connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Outbound payload could not be delivered
    #[error("transport error: {0}")]
    Transport(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
