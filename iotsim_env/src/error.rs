//! Error types for the iotsim environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// A sink failed to accept or flush a message
    #[error("Sink error: {0}")]
    SinkError(String),

    /// No destination is registered under the type tag
    #[error("Unsupported destination type: {0}")]
    UnsupportedDestination(String),

    /// Destination parameters are missing or malformed
    #[error("Invalid destination parameters: {0}")]
    InvalidParameters(String),

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EnvError {
    /// Creates a sink error.
    pub fn sink(msg: impl Into<String>) -> Self {
        Self::SinkError(msg.into())
    }

    /// Creates an unsupported-destination error.
    pub fn unsupported(kind: impl std::fmt::Display) -> Self {
        Self::UnsupportedDestination(kind.to_string())
    }

    /// Creates an invalid-parameters error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameters(msg.into())
    }
}
