//! Triggers - predicates over context store state.
//!
//! A trigger evaluates to `Some(true)`, `Some(false)` or `None` when the
//! data it needs is not available yet (no history at the requested lag,
//! counter never set). An inactive trigger is never evaluated and counts
//! as not fired.

use crate::context::ContextStore;
use crate::error::{SimError, SimResult};
use crate::naming::{to_name, Named};
use crate::params::{ParameterSet, Parameters};
use crate::value::Value;
use rand::distributions::{Distribution, WeightedIndex};
use std::fmt;
use std::sync::Arc;

/// Caller-supplied test applied to a history value.
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Where a range test takes its value from.
#[derive(Debug, Clone, PartialEq)]
pub enum RangeSource {
    /// History of `component` at the `lag` parameter
    History { component: String },
    /// Current value of `parameter` on `component`
    Parameter { component: String, parameter: String },
}

/// The condition a trigger tests.
#[derive(Clone)]
pub enum Condition {
    /// Applies a predicate to the lagged history value.
    History { component: String, predicate: Predicate },

    /// Tests membership in `[min(v0, v1), max(v0, v1)]`; `inside = false` negates.
    Range { source: RangeSource, inside: bool },

    /// Compares a counter to the `threshold` parameter (a value or a list).
    CounterThreshold {
        component: String,
        counter: String,
        weights: Option<Vec<f64>>,
    },

    /// Always fires.
    Always,
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::History { component, .. } => f
                .debug_struct("History")
                .field("component", component)
                .finish_non_exhaustive(),
            Condition::Range { source, inside } => f
                .debug_struct("Range")
                .field("source", source)
                .field("inside", inside)
                .finish(),
            Condition::CounterThreshold { component, counter, weights } => f
                .debug_struct("CounterThreshold")
                .field("component", component)
                .field("counter", counter)
                .field("weights", weights)
                .finish(),
            Condition::Always => write!(f, "Always"),
        }
    }
}

/// A named, parameterized condition over the context store.
#[derive(Debug, Clone)]
pub struct Trigger {
    name: Option<String>,
    condition: Condition,
    parameters: ParameterSet,
}

impl Trigger {
    fn new(name: impl Into<String>, condition: Condition, parameters: ParameterSet) -> Self {
        Self {
            name: to_name(name),
            condition,
            parameters: parameters.with("active", Some(Value::Bool(true))),
        }
    }

    /// Fires when `predicate` holds for the history of `component` at `lag`.
    pub fn history_condition<F>(
        name: impl Into<String>,
        component: impl Into<String>,
        lag: usize,
        predicate: F,
    ) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self::new(
            name,
            Condition::History {
                component: component.into(),
                predicate: Arc::new(predicate),
            },
            ParameterSet::new().with("lag", Some(Value::from(lag))),
        )
    }

    /// Fires when the history of `component` at `lag` lies within `[v0, v1]`.
    pub fn history_in_range(
        name: impl Into<String>,
        component: impl Into<String>,
        lag: usize,
        v0: impl Into<Value>,
        v1: impl Into<Value>,
    ) -> Self {
        Self::history_range(name, component.into(), lag, v0.into(), v1.into(), true)
    }

    /// Fires when the history of `component` at `lag` lies outside `[v0, v1]`.
    pub fn history_out_of_range(
        name: impl Into<String>,
        component: impl Into<String>,
        lag: usize,
        v0: impl Into<Value>,
        v1: impl Into<Value>,
    ) -> Self {
        Self::history_range(name, component.into(), lag, v0.into(), v1.into(), false)
    }

    fn history_range(
        name: impl Into<String>,
        component: String,
        lag: usize,
        v0: Value,
        v1: Value,
        inside: bool,
    ) -> Self {
        Self::new(
            name,
            Condition::Range {
                source: RangeSource::History { component },
                inside,
            },
            ParameterSet::new()
                .with("lag", Some(Value::from(lag)))
                .with("v0", Some(v0))
                .with("v1", Some(v1)),
        )
    }

    /// Fires when `parameter` of `component` lies within `[v0, v1]`.
    pub fn parameter_in_range(
        name: impl Into<String>,
        component: impl Into<String>,
        parameter: impl Into<String>,
        v0: impl Into<Value>,
        v1: impl Into<Value>,
    ) -> Self {
        Self::parameter_range(name, component.into(), parameter.into(), v0.into(), v1.into(), true)
    }

    /// Fires when `parameter` of `component` lies outside `[v0, v1]`.
    pub fn parameter_out_of_range(
        name: impl Into<String>,
        component: impl Into<String>,
        parameter: impl Into<String>,
        v0: impl Into<Value>,
        v1: impl Into<Value>,
    ) -> Self {
        Self::parameter_range(name, component.into(), parameter.into(), v0.into(), v1.into(), false)
    }

    fn parameter_range(
        name: impl Into<String>,
        component: String,
        parameter: String,
        v0: Value,
        v1: Value,
        inside: bool,
    ) -> Self {
        Self::new(
            name,
            Condition::Range {
                source: RangeSource::Parameter { component, parameter },
                inside,
            },
            ParameterSet::new().with("v0", Some(v0)).with("v1", Some(v1)),
        )
    }

    /// Fires when `counter` of `component` reaches `threshold`.
    ///
    /// `threshold` may be a list, in which case a firing point is drawn
    /// from it on every evaluation (see [`Trigger::with_weights`]).
    pub fn counter_threshold(
        name: impl Into<String>,
        component: impl Into<String>,
        counter: impl Into<String>,
        threshold: impl Into<Value>,
    ) -> Self {
        Self::new(
            name,
            Condition::CounterThreshold {
                component: component.into(),
                counter: counter.into(),
                weights: None,
            },
            ParameterSet::new().with("threshold", Some(threshold.into())),
        )
    }

    /// Sets the draw weights for a list threshold.
    pub fn with_weights(mut self, weights: Vec<f64>) -> SimResult<Self> {
        let label = self.label().to_string();
        match &mut self.condition {
            Condition::CounterThreshold { weights: slot, .. } => {
                if let Some(Value::List(levels)) = self.parameters.default_of("threshold") {
                    if levels.len() != weights.len() {
                        return Err(SimError::config(format!(
                            "Trigger '{}' has {} thresholds but {} weights",
                            label,
                            levels.len(),
                            weights.len()
                        )));
                    }
                }
                WeightedIndex::new(&weights).map_err(|e| {
                    SimError::config(format!("Trigger '{}' weights: {}", label, e))
                })?;
                *slot = Some(weights);
                Ok(self)
            }
            _ => Err(SimError::config(format!(
                "Trigger '{}' is not a counter threshold and takes no weights",
                label
            ))),
        }
    }

    /// A trigger that always fires; used for unconditional bookkeeping controls.
    pub fn always() -> Self {
        Self::new("", Condition::Always, ParameterSet::new())
    }

    /// Disarms (or re-arms) the trigger by default.
    pub fn with_active(mut self, active: bool) -> Self {
        self.parameters.declare("active", Some(Value::Bool(active)));
        self
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }

    /// Evaluates the trigger against the store.
    pub fn evaluate(&self, ctx: &mut ContextStore) -> SimResult<Option<bool>> {
        let params = self
            .parameters
            .resolve("Trigger", self.name.as_deref(), Some(&*ctx))?;

        if !params.bool("active")? {
            return Ok(Some(false));
        }

        match &self.condition {
            Condition::Always => Ok(Some(true)),

            Condition::History { component, predicate } => {
                let lag = self.lag(&params)?;
                Ok(ctx.query(component, lag)?.map(|x| predicate(x)))
            }

            Condition::Range { source, inside } => {
                let observed = match source {
                    RangeSource::History { component } => {
                        ctx.query(component, self.lag(&params)?)?.cloned()
                    }
                    RangeSource::Parameter { component, parameter } => {
                        ctx.get_parameter(component, parameter)?.cloned()
                    }
                };
                let Some(x) = observed else {
                    return Ok(None);
                };
                let (v0, v1) = (params.f64("v0")?, params.f64("v1")?);
                let x = x.to_f64()?;
                let within = v0.min(v1) <= x && x <= v0.max(v1);
                Ok(Some(within == *inside))
            }

            Condition::CounterThreshold { component, counter, weights } => {
                let Some(count) = ctx.read_counter(component, counter)? else {
                    return Ok(None);
                };
                let threshold = params.require("threshold")?.clone();
                self.threshold_reached(ctx, count, &threshold, weights.as_deref())
                    .map(Some)
            }
        }
    }

    fn lag(&self, params: &Parameters) -> SimResult<usize> {
        let lag = params.i64("lag")?;
        usize::try_from(lag)
            .map_err(|_| SimError::invalid(self.label(), "lag", format!("must be non-negative, got {}", lag)))
    }

    /// With a single threshold: fires on equality. With a list: the levels
    /// are sorted, an index is drawn, and the trigger fires when the counter
    /// sits at or beyond the drawn level. A count not in the list never fires.
    ///
    /// Weights are positional over the *sorted* levels: the first weight
    /// belongs to the lowest level, whatever order the list was given in.
    fn threshold_reached(
        &self,
        ctx: &mut ContextStore,
        count: i64,
        threshold: &Value,
        weights: Option<&[f64]>,
    ) -> SimResult<bool> {
        let levels = match threshold {
            Value::List(levels) => levels,
            single => return Ok(single.to_f64()? == count as f64),
        };
        if levels.is_empty() {
            return Err(SimError::config(format!(
                "Trigger '{}' has an empty threshold list",
                self.label()
            )));
        }

        let mut sorted = levels.iter().map(Value::to_f64).collect::<SimResult<Vec<_>>>()?;
        sorted.sort_by(|a, b| a.total_cmp(b));
        let weights = match weights {
            Some(w) if w.len() != sorted.len() => {
                return Err(SimError::config(format!(
                    "Trigger '{}' has {} thresholds but {} weights",
                    self.label(),
                    sorted.len(),
                    w.len()
                )))
            }
            Some(w) => w.to_vec(),
            None => vec![1.0; sorted.len()],
        };

        let Some(position) = sorted.iter().position(|level| *level == count as f64) else {
            return Ok(false);
        };

        let dist = WeightedIndex::new(&weights)
            .map_err(|e| SimError::config(format!("Trigger '{}' weights: {}", self.label(), e)))?;
        let drawn = dist.sample(ctx.rng());
        Ok(drawn <= position)
    }
}

impl Named for Trigger {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ContextStore {
        ContextStore::with_seed(["f", "t", "c"], 3, 42).unwrap()
    }

    #[test]
    fn test_always() {
        let mut ctx = ctx();
        assert_eq!(Trigger::always().evaluate(&mut ctx).unwrap(), Some(true));
        assert!(Trigger::always().name().is_none());
    }

    #[test]
    fn test_history_condition_unknown_then_true() {
        let mut ctx = ctx();
        let trg = Trigger::history_condition("t", "f", 1, |x| x.same_as(&Value::Int(1)));
        assert_eq!(trg.evaluate(&mut ctx).unwrap(), None);

        ctx.record("f", Value::Int(1)).unwrap();
        assert_eq!(trg.evaluate(&mut ctx).unwrap(), None);

        ctx.record("f", Value::Int(0)).unwrap();
        assert_eq!(trg.evaluate(&mut ctx).unwrap(), Some(true));

        ctx.record("f", Value::Int(0)).unwrap();
        assert_eq!(trg.evaluate(&mut ctx).unwrap(), Some(false));
    }

    #[test]
    fn test_history_range_either_order() {
        let mut ctx = ctx();
        let inside = Trigger::history_in_range("", "f", 0, 10, 0);
        let outside = Trigger::history_out_of_range("", "f", 0, 0, 10);
        assert_eq!(inside.evaluate(&mut ctx).unwrap(), None);
        assert_eq!(outside.evaluate(&mut ctx).unwrap(), None);

        for (x, within) in [(0, true), (10, true), (5, true), (11, false), (-1, false)] {
            ctx.record("f", Value::Int(x)).unwrap();
            assert_eq!(inside.evaluate(&mut ctx).unwrap(), Some(within));
            assert_eq!(outside.evaluate(&mut ctx).unwrap(), Some(!within));
        }
    }

    #[test]
    fn test_parameter_range() {
        let mut ctx = ctx();
        let trg = Trigger::parameter_in_range("", "c", "level", 1.0, 2.0);
        assert_eq!(trg.evaluate(&mut ctx).unwrap(), None);
        ctx.set_parameter("c", "level", 1.5).unwrap();
        assert_eq!(trg.evaluate(&mut ctx).unwrap(), Some(true));

        let out = Trigger::parameter_out_of_range("", "c", "level", 1.0, 2.0);
        assert_eq!(out.evaluate(&mut ctx).unwrap(), Some(false));
    }

    #[test]
    fn test_inactive_never_fires() {
        let mut ctx = ctx();
        let trg = Trigger::always().with_active(false);
        assert_eq!(trg.evaluate(&mut ctx).unwrap(), Some(false));
    }

    #[test]
    fn test_named_trigger_disarmed_from_context() {
        let mut ctx = ctx();
        let trg = Trigger::counter_threshold("t", "c", "n", 1);
        ctx.reset_counter("c", "n").unwrap();
        ctx.increment_counter("c", "n", 1).unwrap();
        assert_eq!(trg.evaluate(&mut ctx).unwrap(), Some(true));

        ctx.set_parameter("t", "active", false).unwrap();
        assert_eq!(trg.evaluate(&mut ctx).unwrap(), Some(false));
    }

    #[test]
    fn test_single_threshold_fires_on_equality() {
        let mut ctx = ctx();
        let trg = Trigger::counter_threshold("", "c", "n", 3);
        assert_eq!(trg.evaluate(&mut ctx).unwrap(), None);

        ctx.reset_counter("c", "n").unwrap();
        let mut fired = Vec::new();
        for _ in 0..5 {
            fired.push(trg.evaluate(&mut ctx).unwrap().unwrap());
            ctx.increment_counter("c", "n", 1).unwrap();
        }
        assert_eq!(fired, vec![false, false, false, true, false]);
    }

    #[test]
    fn test_threshold_list_equal_weights() {
        let mut ctx = ctx();
        let trg = Trigger::counter_threshold("", "c", "n", vec![1, 2]);
        ctx.reset_counter("c", "n").unwrap();

        let n = 2000;
        let mut at = [0usize; 4];
        for count in 0..4 {
            for _ in 0..n {
                if trg.evaluate(&mut ctx).unwrap() == Some(true) {
                    at[count] += 1;
                }
            }
            ctx.increment_counter("c", "n", 1).unwrap();
        }

        assert_eq!(at[0], 0);
        assert!((800..=1200).contains(&at[1]), "fired at 1: {}", at[1]);
        // Every draw has been reached by the last level
        assert_eq!(at[2], n);
        assert_eq!(at[3], 0);
    }

    #[test]
    fn test_threshold_list_weighted_firing_point() {
        let mut ctx = ctx();
        let trg = Trigger::counter_threshold("", "c", "n", vec![1, 3])
            .with_weights(vec![0.7, 0.3])
            .unwrap();

        // Simulate the usual pattern: count up from 1 and stop at the first firing.
        let trials = 2000;
        let mut first_at_1 = 0;
        let mut first_at_3 = 0;
        for _ in 0..trials {
            ctx.reset_counter("c", "n").unwrap();
            loop {
                ctx.increment_counter("c", "n", 1).unwrap();
                if trg.evaluate(&mut ctx).unwrap() == Some(true) {
                    match ctx.read_counter("c", "n").unwrap() {
                        Some(1) => first_at_1 += 1,
                        Some(3) => first_at_3 += 1,
                        other => panic!("fired at {:?}", other),
                    }
                    break;
                }
            }
        }
        let share = first_at_1 as f64 / trials as f64;
        assert!((0.64..=0.76).contains(&share), "share at 1: {}", share);
        assert_eq!(first_at_1 + first_at_3, trials);
    }

    #[test]
    fn test_weights_follow_sorted_levels() {
        let mut ctx = ctx();
        // 0.7 belongs to the lowest level even though 3 is listed first
        let trg = Trigger::counter_threshold("", "c", "n", vec![3, 1])
            .with_weights(vec![0.7, 0.3])
            .unwrap();

        let trials = 2000;
        let mut fired_at_1 = 0;
        for _ in 0..trials {
            ctx.reset_counter("c", "n").unwrap();
            ctx.increment_counter("c", "n", 1).unwrap();
            if trg.evaluate(&mut ctx).unwrap() == Some(true) {
                fired_at_1 += 1;
            }
        }
        let share = fired_at_1 as f64 / trials as f64;
        assert!((0.64..=0.76).contains(&share), "share at 1: {}", share);
    }

    #[test]
    fn test_weights_validation() {
        assert!(Trigger::counter_threshold("", "c", "n", vec![1, 2])
            .with_weights(vec![1.0])
            .is_err());
        assert!(Trigger::counter_threshold("", "c", "n", vec![1, 2])
            .with_weights(vec![0.0, 0.0])
            .is_err());
        assert!(Trigger::always().with_weights(vec![1.0]).is_err());
    }

    #[test]
    fn test_unknown_component_is_lookup_error() {
        let mut ctx = ctx();
        let trg = Trigger::history_in_range("", "nope", 0, 0, 1);
        assert_eq!(
            trg.evaluate(&mut ctx).unwrap_err(),
            SimError::UnknownName("nope".into())
        );
    }
}
