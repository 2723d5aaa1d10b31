//! Dynamically typed values carried by parameters, history and truths.

use crate::error::{SimError, SimResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A parameter, history entry or signal value.
///
/// Behaviors may produce numbers as well as discrete labels, so the
/// engine carries values untyped and checks numeric-ness where it matters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
}

impl Value {
    /// Returns the value as a float if it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the value as an integer; floats are accepted only if integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Numeric value or a type-mismatch error.
    pub fn to_f64(&self) -> SimResult<f64> {
        self.as_f64()
            .ok_or_else(|| SimError::type_mismatch("number", self))
    }

    /// Integer value or a type-mismatch error.
    pub fn to_i64(&self) -> SimResult<i64> {
        self.as_i64()
            .ok_or_else(|| SimError::type_mismatch("integer", self))
    }

    /// Compares two values numerically when both are numbers, structurally otherwise.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }

    /// Computes `bias + increment * step`, staying integer when both operands are.
    ///
    /// Integer results outside the `i64` range are an invalid-domain error.
    pub fn affine(bias: &Value, increment: &Value, step: i64) -> SimResult<Value> {
        match (bias, increment) {
            (Value::Int(b), Value::Int(i)) => i
                .checked_mul(step)
                .and_then(|d| b.checked_add(d))
                .map(Value::Int)
                .ok_or_else(|| {
                    SimError::invalid(
                        "affine",
                        "increment",
                        format!("{} + {} * {} overflows a 64-bit integer", b, i, step),
                    )
                }),
            _ => Ok(Value::Float(bias.to_f64()? + increment.to_f64()? * step as f64)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affine_keeps_integers() {
        let v = Value::affine(&Value::Int(10), &Value::Int(2), 3).unwrap();
        assert_eq!(v, Value::Int(16));
    }

    #[test]
    fn test_affine_promotes_to_float() {
        let v = Value::affine(&Value::Float(10.5), &Value::Int(2), 2).unwrap();
        assert_eq!(v, Value::Float(14.5));
    }

    #[test]
    fn test_affine_overflow_is_an_error() {
        let err = Value::affine(&Value::Int(i64::MAX - 1), &Value::Int(1), 2).unwrap_err();
        assert!(matches!(err, SimError::InvalidDomain { .. }));
        assert!(Value::affine(&Value::Int(0), &Value::Int(i64::MIN), -1).is_err());
        assert_eq!(
            Value::affine(&Value::Int(i64::MAX - 1), &Value::Int(1), 1).unwrap(),
            Value::Int(i64::MAX)
        );
    }

    #[test]
    fn test_affine_rejects_text() {
        let err = Value::affine(&Value::from("a"), &Value::Int(1), 1).unwrap_err();
        assert!(matches!(err, SimError::TypeMismatch { .. }));
    }

    #[test]
    fn test_same_as_mixes_int_and_float() {
        assert!(Value::Int(1).same_as(&Value::Float(1.0)));
        assert!(!Value::Int(1).same_as(&Value::from("1")));
        assert!(Value::from("on").same_as(&Value::from("on")));
    }

    #[test]
    fn test_untagged_json() {
        let v: Value = serde_json::from_str("5").unwrap();
        assert_eq!(v, Value::Int(5));
        let v: Value = serde_json::from_str("[1, 2.5]").unwrap();
        assert_eq!(v, Value::List(vec![Value::Int(1), Value::Float(2.5)]));
        assert_eq!(serde_json::to_string(&Value::from("on")).unwrap(), "\"on\"");
    }
}
