//! Protocol error types.

use std::io;

/// Errors raised while exchanging messages with the engine.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("engine closed the connection")]
    Disconnected,

    #[error("invalid payload encoding: {0}")]
    Encoding(String),
}
