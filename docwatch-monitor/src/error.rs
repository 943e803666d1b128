//! Error types for docwatch-monitor
//!
//! `NotFound` and `Rejected` are shown to the operator on the scope that
//! triggered them. `Transport` on the push channel only degrades the monitor
//! to polling. Nothing here is process-fatal.

use thiserror::Error;

/// Monitor error type
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The job service has no such task (or no tree for it yet)
    #[error("Not found: {0}")]
    NotFound(String),

    /// A request or the push channel could not complete
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The job service returned a structured failure (invalid path, not cancellable, ...)
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The job service answered with a body we could not decode
    #[error("Malformed response: {0}")]
    Decode(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// docwatch-common error
    #[error("Common error: {0}")]
    Common(#[from] docwatch_common::Error),
}

impl MonitorError {
    /// True for errors the operator should see as a message
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, MonitorError::Transport(_) | MonitorError::Decode(_))
    }
}

impl From<reqwest::Error> for MonitorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            MonitorError::Decode(err.to_string())
        } else {
            MonitorError::Transport(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for MonitorError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        MonitorError::Transport(err.to_string())
    }
}

/// Result type for monitor operations
pub type MonitorResult<T> = Result<T, MonitorError>;
