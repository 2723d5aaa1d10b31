//! Error types for the iotsim runner.

use iotsim_core::SimError;
use iotsim_env::EnvError;
use thiserror::Error;

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum RunError {
    /// Configuration file could not be read
    #[error("failed to read config: {0}")]
    ReadError(String),

    /// Configuration document is not valid YAML for its schema
    #[error("failed to parse config: {0}")]
    ParseError(String),

    /// Configuration parsed but holds an invalid value
    #[error("invalid config: {0}")]
    ValidationError(String),

    /// Engine error (wiring, parameters, numeric domains)
    #[error(transparent)]
    Sim(#[from] SimError),

    /// Environment error (destinations)
    #[error(transparent)]
    Env(#[from] EnvError),

    /// Message could not be encoded
    #[error("failed to encode message: {0}")]
    Encode(String),

    /// A deadline or timestamp left the representable range
    #[error("tick {tick}: {what} out of range")]
    OutOfRange { tick: u64, what: &'static str },

    /// The consumer side cannot keep up with the configured pace
    #[error("system fell behind the schedule at tick {tick}: {late_secs:.3}s late")]
    Overrun { tick: u64, late_secs: f64 },
}

impl RunError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }
}

pub type RunResult<T> = Result<T, RunError>;
