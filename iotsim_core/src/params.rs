//! Parameter resolution.
//!
//! A component declares its parameters with optional defaults. The
//! effective value of a parameter is the context store's value for
//! (component, parameter) when set, otherwise the component's default.
//! Anonymous components, or resolution without a store, use defaults only.

use crate::context::ContextStore;
use crate::error::{SimError, SimResult};
use crate::value::Value;
use std::collections::HashMap;

/// Declared parameters of a component, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    defaults: Vec<(String, Option<Value>)>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a parameter with an optional default (builder style).
    pub fn with(mut self, key: &str, default: Option<Value>) -> Self {
        self.declare(key, default);
        self
    }

    /// Declares a parameter, replacing any earlier declaration of the same key.
    pub fn declare(&mut self, key: &str, default: Option<Value>) {
        match self.defaults.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = default,
            None => self.defaults.push((key.to_string(), default)),
        }
    }

    pub fn default_of(&self, key: &str) -> Option<&Value> {
        self.defaults
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_ref())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.defaults.iter().map(|(k, _)| k.as_str())
    }

    /// Resolves every declared parameter; a parameter with no value anywhere is an error.
    pub fn resolve(
        &self,
        kind: &'static str,
        owner: Option<&str>,
        ctx: Option<&ContextStore>,
    ) -> SimResult<Parameters> {
        self.resolve_with(kind, owner, ctx, false)
    }

    /// Resolves every declared parameter, leaving unresolvable ones absent.
    pub fn resolve_tolerant(
        &self,
        kind: &'static str,
        owner: Option<&str>,
        ctx: Option<&ContextStore>,
    ) -> SimResult<Parameters> {
        self.resolve_with(kind, owner, ctx, true)
    }

    fn resolve_with(
        &self,
        kind: &'static str,
        owner: Option<&str>,
        ctx: Option<&ContextStore>,
        tolerant: bool,
    ) -> SimResult<Parameters> {
        let mut values = HashMap::with_capacity(self.defaults.len());

        for (key, default) in &self.defaults {
            let value = match (ctx, owner) {
                (Some(ctx), Some(name)) => ctx.parameter_or(name, key, default.clone())?,
                _ => default.clone(),
            };

            match value {
                Some(v) => {
                    values.insert(key.clone(), v);
                }
                None if tolerant => {}
                None => {
                    return Err(SimError::UndefinedParameter {
                        kind,
                        component: owner.unwrap_or("<anonymous>").to_string(),
                        parameter: key.clone(),
                    })
                }
            }
        }

        Ok(Parameters {
            kind,
            owner: owner.unwrap_or("<anonymous>").to_string(),
            values,
        })
    }
}

/// Resolved parameter values of one component.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    kind: &'static str,
    owner: String,
    values: HashMap<String, Value>,
}

impl Parameters {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// The value of `key`, or an undefined-parameter error.
    pub fn require(&self, key: &str) -> SimResult<&Value> {
        self.values.get(key).ok_or_else(|| SimError::UndefinedParameter {
            kind: self.kind,
            component: self.owner.clone(),
            parameter: key.to_string(),
        })
    }

    pub fn f64(&self, key: &str) -> SimResult<f64> {
        self.require(key)?.to_f64()
    }

    pub fn i64(&self, key: &str) -> SimResult<i64> {
        self.require(key)?.to_i64()
    }

    pub fn bool(&self, key: &str) -> SimResult<bool> {
        let value = self.require(key)?;
        value
            .as_bool()
            .ok_or_else(|| SimError::type_mismatch("bool", value))
    }

    pub fn text(&self, key: &str) -> SimResult<&str> {
        let value = self.require(key)?;
        value
            .as_str()
            .ok_or_else(|| SimError::type_mismatch("text", value))
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }
}
