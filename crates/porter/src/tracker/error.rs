//! Error types for the Tracker API.

use thiserror::Error;

use crate::platform::RemoteError;

/// Errors that can occur when interacting with the Tracker API.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON parsing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<TrackerError> for RemoteError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::Http(message) => RemoteError::network(message),
            TrackerError::Json(e) => RemoteError::decode(e.to_string()),
            TrackerError::Api { status, message } => RemoteError::api(status, message),
            TrackerError::Config(message) => RemoteError::decode(message),
        }
    }
}
