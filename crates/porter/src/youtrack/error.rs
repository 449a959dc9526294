//! Error types for the YouTrack API.

use thiserror::Error;

use crate::platform::RemoteError;

/// Errors that can occur when interacting with the YouTrack REST API.
#[derive(Debug, Error)]
pub enum YouTrackError {
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

impl YouTrackError {
    pub fn status(&self) -> Option<u16> {
        match self {
            YouTrackError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<YouTrackError> for RemoteError {
    fn from(err: YouTrackError) -> Self {
        match err {
            YouTrackError::Http(message) => RemoteError::network(message),
            YouTrackError::Json(e) => RemoteError::decode(e.to_string()),
            YouTrackError::Api { status, message } => RemoteError::api(status, message),
            YouTrackError::Config(message) => RemoteError::decode(message),
        }
    }
}
