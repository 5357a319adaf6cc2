use std::io;
use thiserror::Error;

/// Custom error type for the Vigil application
#[derive(Error, Debug)]
pub enum VigilError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Target not found: {0}")]
    TargetNotFound(String),

    #[error("Notification error: {0}")]
    Notify(String),

    #[error("Screenshot error: {0}")]
    Screenshot(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for the Vigil application
pub type Result<T> = std::result::Result<T, VigilError>;

impl VigilError {
    /// Create a notification error
    pub fn notify<S: Into<String>>(msg: S) -> Self {
        VigilError::Notify(msg.into())
    }

    /// Create a screenshot error
    pub fn screenshot<S: Into<String>>(msg: S) -> Self {
        VigilError::Screenshot(msg.into())
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        VigilError::Other(msg.into())
    }
}
