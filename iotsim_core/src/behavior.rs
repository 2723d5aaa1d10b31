//! Behaviors - the value-producing states of a feature.
//!
//! A behavior resolves its parameters when the feature activates it and
//! returns a fresh [`BehaviorStream`]. Re-activating a behavior always
//! starts a new stream, so any progression restarts from the beginning
//! with whatever parameters the context store holds at that moment.

use crate::context::ContextStore;
use crate::error::SimResult;
use crate::naming::{require_name, Named};
use crate::params::ParameterSet;
use crate::value::Value;
use std::fmt::Debug;

/// An unbounded stream of true values.
pub trait BehaviorStream: Send {
    fn next_value(&mut self) -> SimResult<Value>;
}

/// A named producer of true values.
pub trait Behavior: Named + Debug + Send + Sync {
    /// Declared parameters and their defaults.
    fn parameters(&self) -> &ParameterSet;

    /// Resolves parameters and starts a new value stream.
    fn activate(&self, ctx: Option<&ContextStore>) -> SimResult<Box<dyn BehaviorStream>>;
}

/// Constant value equal to `level`, forever.
#[derive(Debug, Clone)]
pub struct Flatline {
    name: String,
    parameters: ParameterSet,
}

impl Flatline {
    pub fn new(name: impl Into<String>, level: Option<Value>) -> SimResult<Self> {
        Ok(Self {
            name: require_name(name, "Behavior")?,
            parameters: ParameterSet::new().with("level", level),
        })
    }
}

impl Named for Flatline {
    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }
}

impl Behavior for Flatline {
    fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    fn activate(&self, ctx: Option<&ContextStore>) -> SimResult<Box<dyn BehaviorStream>> {
        let params = self.parameters.resolve("Flatline", Some(&self.name), ctx)?;
        Ok(Box::new(FlatlineStream {
            level: params.require("level")?.clone(),
        }))
    }
}

struct FlatlineStream {
    level: Value,
}

impl BehaviorStream for FlatlineStream {
    fn next_value(&mut self) -> SimResult<Value> {
        Ok(self.level.clone())
    }
}

/// `bias + increment * i` for the i-th value since activation (1-based).
#[derive(Debug, Clone)]
pub struct Linear {
    name: String,
    parameters: ParameterSet,
}

impl Linear {
    pub fn new(
        name: impl Into<String>,
        bias: Option<Value>,
        increment: Option<Value>,
    ) -> SimResult<Self> {
        Ok(Self {
            name: require_name(name, "Behavior")?,
            parameters: ParameterSet::new()
                .with("bias", bias)
                .with("increment", increment),
        })
    }
}

impl Named for Linear {
    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }
}

impl Behavior for Linear {
    fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    fn activate(&self, ctx: Option<&ContextStore>) -> SimResult<Box<dyn BehaviorStream>> {
        let params = self.parameters.resolve("Linear", Some(&self.name), ctx)?;
        let bias = params.require("bias")?.clone();
        let increment = params.require("increment")?.clone();
        // Fail on activation rather than on the first pull
        Value::affine(&bias, &increment, 1)?;
        Ok(Box::new(LinearStream {
            bias,
            increment,
            step: 0,
        }))
    }
}

struct LinearStream {
    bias: Value,
    increment: Value,
    step: i64,
}

impl BehaviorStream for LinearStream {
    fn next_value(&mut self) -> SimResult<Value> {
        self.step += 1;
        Value::affine(&self.bias, &self.increment, self.step)
    }
}
