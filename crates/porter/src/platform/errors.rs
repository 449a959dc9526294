use thiserror::Error;

use crate::http::HttpError;

/// Status code both remote systems use to signal "already exists".
pub const CONFLICT_STATUS: u16 = 409;

/// Errors that can occur when talking to the source or target system.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Network or connection error (includes transport timeouts).
    #[error("Network error: {message}")]
    Network { message: String },

    /// The remote answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("Unexpected response: {message}")]
    Decode { message: String },
}

/// How the synchronizer reacts to a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The natural key already exists on the target; triggers locate-fallback.
    Conflict,
    /// Network failure, 429 or 5xx; retried with bounded backoff.
    Transient,
    /// Any other 4xx or an undecodable body; recorded without retry.
    Permanent,
}

impl RemoteError {
    /// Create a network error.
    #[inline]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create an API error.
    #[inline]
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a decode error.
    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// HTTP status carried by this error, if any.
    #[inline]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Network { .. } => ErrorClass::Transient,
            Self::Api { status, .. } if *status == CONFLICT_STATUS => ErrorClass::Conflict,
            Self::Api { status, .. } if *status == 429 || *status >= 500 => ErrorClass::Transient,
            Self::Api { .. } | Self::Decode { .. } => ErrorClass::Permanent,
        }
    }

    #[inline]
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    #[inline]
    pub fn is_conflict(&self) -> bool {
        self.class() == ErrorClass::Conflict
    }
}

impl From<HttpError> for RemoteError {
    fn from(err: HttpError) -> Self {
        Self::network(err.to_string())
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(err: serde_json::Error) -> Self {
        Self::decode(err.to_string())
    }
}

/// Result type for remote operations.
pub type Result<T> = std::result::Result<T, RemoteError>;
