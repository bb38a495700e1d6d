//! Error types for the Tile38 client.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Tile38 error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Blocking command task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid reply: {0}")]
    InvalidReply(String),
}

pub type Result<T> = std::result::Result<T, Error>;
