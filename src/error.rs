//! Error types for the streaming client

use std::time::Duration;

use thiserror::Error;

/// Streaming client errors
///
/// Cloneable so that a single connect outcome can be handed to every caller
/// waiting on the same attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Transport message error: {0}")]
    Message(String),

    #[error("Failed to parse frame: {0}")]
    Parse(String),

    #[error("Service error {code}: {message}")]
    Service { code: String, message: String },

    #[error("Request {req_id} timed out after {after:?}")]
    Timeout { req_id: u64, after: Duration },

    #[error("Connection lost")]
    ConnectionLost,

    #[error("Client disconnected")]
    Disconnected,

    #[error("Connection timeout")]
    ConnectTimeout,

    #[error("Gave up reconnecting after {attempts} failed attempts")]
    ReconnectCeiling { attempts: u32 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("Client task has shut down")]
    ClientClosed,
}

impl From<tokio_tungstenite::tungstenite::Error> for StreamError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        StreamError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Parse(err.to_string())
    }
}

impl From<prometheus::Error> for StreamError {
    fn from(err: prometheus::Error) -> Self {
        StreamError::Metrics(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
