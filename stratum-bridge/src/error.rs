//! Error types for the bridge.

use thiserror::Error;

/// Bridge errors.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Network I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Requested path is not a `host:port` pool target
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Client message is valid JSON but not usable (e.g. submit without params)
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    /// No live upstream connection to write to
    #[error("No active pool connection")]
    NotConnected,

    /// Post-admission setup hook refused the client
    #[error("Session setup failed: {0}")]
    Setup(String),

    /// Connection lost
    #[error("Connection lost")]
    Disconnected,
}

/// Convenient Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
