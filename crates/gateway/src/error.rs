//! Gateway error types.

use thiserror::Error;

/// Gateway error type.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Tile38 command failed (transport or protocol).
    #[error("Backend error: {0}")]
    Backend(#[from] tile38_client::Error),

    /// A step of recipient resolution failed; no partial result is returned.
    #[error("Resolve failed during {step}: {source}")]
    Resolve {
        step: &'static str,
        #[source]
        source: tile38_client::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error (place fixtures).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Client message that is not valid for its type.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Channel send error.
    #[error("Channel send error")]
    ChannelSend,
}

impl From<tokio::sync::mpsc::error::TrySendError<axum::extract::ws::Message>> for GatewayError {
    fn from(_: tokio::sync::mpsc::error::TrySendError<axum::extract::ws::Message>) -> Self {
        GatewayError::ChannelSend
    }
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
