//! Error types for the triage pipeline.

use thiserror::Error;

/// Errors that can occur while collecting and analyzing CI logs.
#[derive(Debug, Error)]
pub enum TriageError {
    /// HTTP request failed before a response was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider returned a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Requested resource does not exist (or its logs have expired).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Credential was rejected.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Log archive could not be decoded.
    #[error("Malformed log archive: {0}")]
    MalformedArchive(String),

    /// Invalid or missing configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Local I/O error (temporary archive storage).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Response body could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A worker task panicked or was cancelled.
    #[error("Worker task failed: {0}")]
    Worker(String),
}

impl From<zip::result::ZipError> for TriageError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::MalformedArchive(err.to_string())
    }
}

impl From<toml::de::Error> for TriageError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Coarse classification used to decide how an error is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network or provider hiccup; worth retrying.
    TransientNetwork,
    /// Resource absent; the caller treats it as a skip.
    NotFound,
    /// Archive content is unusable.
    MalformedArchive,
    /// Missing input, bad credential or unknown workflow.
    Configuration,
    /// Local failure that retrying will not fix.
    Internal,
}

impl TriageError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Http(_) | Self::Api { .. } => ErrorKind::TransientNetwork,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::MalformedArchive(_) => ErrorKind::MalformedArchive,
            Self::Config(_) | Self::Unauthorized(_) => ErrorKind::Configuration,
            Self::Io(_) | Self::Serialization(_) | Self::Worker(_) => ErrorKind::Internal,
        }
    }

    /// Whether another attempt of the same operation could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransientNetwork
    }
}
