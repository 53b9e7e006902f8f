//! Error types for modindex.

use thiserror::Error;

/// Default result type for modindex.
pub type ModIndexResult<T> = Result<T, ModIndexError>;

/// Result type carried by server requests.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors produced by a single server request.
///
/// Cloneable because one request handle is shared by the cache and every
/// caller that asked for it, and each of them receives the same outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// Connection failure (code 0) or a non-2xx response from the server.
    #[error("Server error ({code}): {message}")]
    Transport { code: u16, message: String },

    /// The response body was not the structured payload we expected.
    #[error("Invalid payload ({code}): {message}")]
    Payload { code: u16, message: String },

    /// The request was cancelled before it completed.
    #[error("Request was cancelled")]
    Cancelled,
}

impl ServerError {
    /// Creates a transport error.
    pub fn transport<S: Into<String>>(code: u16, message: S) -> Self {
        Self::Transport {
            code,
            message: message.into(),
        }
    }

    /// Creates a payload error.
    pub fn payload<S: Into<String>>(code: u16, message: S) -> Self {
        Self::Payload {
            code,
            message: message.into(),
        }
    }

    /// HTTP status code associated with the error (0 when there is none).
    pub fn code(&self) -> u16 {
        match self {
            Self::Transport { code, .. } | Self::Payload { code, .. } => *code,
            Self::Cancelled => 0,
        }
    }

    /// Whether this error represents a cancelled request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors possible in modindex.
#[derive(Error, Debug)]
pub enum ModIndexError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Other(String),
}

impl ModIndexError {
    /// Creates a generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }

    /// Creates a configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_code() {
        assert_eq!(ServerError::transport(503, "down").code(), 503);
        assert_eq!(ServerError::payload(200, "bad").code(), 200);
        assert_eq!(ServerError::Cancelled.code(), 0);
        assert!(ServerError::Cancelled.is_cancelled());
    }

    #[test]
    fn test_server_error_converts_into_crate_error() {
        let err: ModIndexError = ServerError::transport(404, "Mod not found").into();
        assert_eq!(err.to_string(), "Server error (404): Mod not found");
    }
}
