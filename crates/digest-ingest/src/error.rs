//! Error types for the ingestion queue

use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ingestion errors
#[derive(Debug, Error)]
pub enum Error {
    /// Upload stage failed (transport, authorization or validation)
    #[error("Upload failed: {reason}")]
    Upload { reason: String },

    /// Remote extraction stage failed
    #[error("Processing failed: {reason}")]
    Process { reason: String },

    /// Illegal queue mutation (e.g. removing an in-flight job)
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Bearer token could not be obtained
    #[error("Authorization error: {0}")]
    Auth(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML config parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Create an upload error
    pub fn upload(reason: impl Into<String>) -> Self {
        Self::Upload {
            reason: reason.into(),
        }
    }

    /// Create a processing error
    pub fn process(reason: impl Into<String>) -> Self {
        Self::Process {
            reason: reason.into(),
        }
    }

    /// Create an invalid operation error
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }

    /// Create an authorization error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// Human-readable reason without the variant prefix for stage and
    /// authorization errors.
    ///
    /// Stage errors are stored on the job record, where the stage is already
    /// implied by the event that reports them.
    pub fn reason(&self) -> String {
        match self {
            Error::Upload { reason } | Error::Process { reason } => reason.clone(),
            Error::Auth(message) => message.clone(),
            other => other.to_string(),
        }
    }
}
