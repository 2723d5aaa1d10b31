//! Error types for the iotsim engine.

use thiserror::Error;

/// Errors raised while building or running an assembly.
///
/// None of these are recoverable inside the engine: each one means the
/// assembly was wired or configured incorrectly and the run must stop.
/// Packet loss is not an error; it is reported as data on a `Reading`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    /// Malformed component definition (empty name, bad weights, unknown behavior...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Two components under one owner share a name
    #[error("Non-unique names in namespace for {owner_kind} '{owner}': {duplicates:?}")]
    DuplicateName {
        owner_kind: &'static str,
        owner: String,
        duplicates: Vec<String>,
    },

    /// Name outside the context store's namespace
    #[error("Name '{0}' not in namespace")]
    UnknownName(String),

    /// Counter incremented before it was ever reset
    #[error("Counter '{counter}' of '{component}' was never set")]
    UnknownCounter { component: String, counter: String },

    /// Parameter with no value in the context store nor in the component defaults
    #[error("Parameter '{parameter}' undefined for {kind} '{component}'")]
    UndefinedParameter {
        kind: &'static str,
        component: String,
        parameter: String,
    },

    /// Numeric parameter outside its allowed domain
    #[error("Invalid value for '{parameter}' of '{component}': {reason}")]
    InvalidDomain {
        component: String,
        parameter: String,
        reason: String,
    },

    /// Value of the wrong type for the requested operation
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: &'static str, got: String },
}

impl SimError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an invalid-domain error.
    pub fn invalid(
        component: impl std::fmt::Display,
        parameter: &str,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidDomain {
            component: component.to_string(),
            parameter: parameter.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a type-mismatch error.
    pub fn type_mismatch(expected: &'static str, got: impl std::fmt::Debug) -> Self {
        Self::TypeMismatch {
            expected,
            got: format!("{:?}", got),
        }
    }
}

/// Convenience alias used across the engine.
pub type SimResult<T> = Result<T, SimError>;
