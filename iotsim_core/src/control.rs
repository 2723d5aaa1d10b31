//! Controls - trigger-gated actions on the context store.
//!
//! A control is bound to one behavior of a feature and fires at a fixed
//! point of that behavior's lifecycle: when it is activated, or after each
//! value it yields. When its trigger evaluates to true the action runs;
//! false or unknown leaves the store untouched.

use crate::context::ContextStore;
use crate::error::{SimError, SimResult};
use crate::naming::{to_name, Named};
use crate::params::ParameterSet;
use crate::trigger::Trigger;
use crate::value::Value;
use rand::distributions::{Distribution, WeightedIndex};
use tracing::trace;

/// Lifecycle point at which a control is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Right after the feature switches to the behavior, before its first value
    OnActivation,
    /// After every value the behavior yields
    OnYield,
}

/// Optional post-processing applied to a retrieved value.
pub type Transform = fn(Value) -> SimResult<Value>;

/// Where a deferred value is read from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Parameter(String),
    History(usize),
    Counter(String),
}

/// A value read from the store at the moment the action runs.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub component: String,
    pub source: Source,
    pub transform: Option<Transform>,
}

impl Retrieval {
    /// Copies the current value of `parameter` on `component`.
    pub fn parameter(component: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            source: Source::Parameter(parameter.into()),
            transform: None,
        }
    }

    /// Copies the history of `component` at `lag`.
    pub fn history(component: impl Into<String>, lag: usize) -> Self {
        Self {
            component: component.into(),
            source: Source::History(lag),
            transform: None,
        }
    }

    /// Copies counter `counter` of `component`.
    pub fn counter(component: impl Into<String>, counter: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            source: Source::Counter(counter.into()),
            transform: None,
        }
    }

    pub fn then(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Reads the value; a retrieval that finds nothing is an error.
    pub fn retrieve(&self, ctx: &ContextStore) -> SimResult<Value> {
        let (found, key) = match &self.source {
            Source::Parameter(p) => (ctx.get_parameter(&self.component, p)?.cloned(), p.clone()),
            Source::History(lag) => (ctx.query(&self.component, *lag)?.cloned(), format!("history[{}]", lag)),
            Source::Counter(c) => (ctx.read_counter(&self.component, c)?.map(Value::Int), c.clone()),
        };
        let value = found.ok_or_else(|| SimError::UndefinedParameter {
            kind: "Retrieval",
            component: self.component.clone(),
            parameter: key,
        })?;
        match self.transform {
            Some(f) => f(value),
            None => Ok(value),
        }
    }
}

/// The value written by one parameter update.
#[derive(Debug, Clone)]
pub enum UpdateValue {
    Literal(Value),
    Deferred(Retrieval),
}

macro_rules! literal_update {
    ($($t:ty),*) => {
        $(impl From<$t> for UpdateValue {
            fn from(v: $t) -> Self {
                UpdateValue::Literal(v.into())
            }
        })*
    };
}

literal_update!(Value, bool, i32, i64, f64, &str, String);

impl From<Retrieval> for UpdateValue {
    fn from(r: Retrieval) -> Self {
        UpdateValue::Deferred(r)
    }
}

/// One `(component, parameter, value)` triple.
#[derive(Debug, Clone)]
pub struct ParameterUpdate {
    pub component: String,
    pub parameter: String,
    pub value: UpdateValue,
}

impl ParameterUpdate {
    pub fn new(
        component: impl Into<String>,
        parameter: impl Into<String>,
        value: impl Into<UpdateValue>,
    ) -> Self {
        Self {
            component: component.into(),
            parameter: parameter.into(),
            value: value.into(),
        }
    }
}

/// What a control does when its trigger fires.
#[derive(Debug, Clone)]
pub enum Action {
    /// Applies one update set, chosen at random when there are several.
    UpdateParameters {
        choices: Vec<Vec<ParameterUpdate>>,
        weights: Option<WeightedIndex<f64>>,
    },
    /// Sets a counter to zero.
    ResetCounter { component: String, counter: String },
    /// Adds the `increment` parameter to a counter.
    IncrementCounter { component: String, counter: String },
}

/// A trigger-gated action bound to one behavior of a feature.
#[derive(Debug, Clone)]
pub struct Control {
    name: Option<String>,
    behavior: String,
    phase: Phase,
    trigger: Trigger,
    action: Action,
    priority: i32,
    parameters: ParameterSet,
}

impl Control {
    fn new(
        name: impl Into<String>,
        behavior: impl Into<String>,
        phase: Phase,
        trigger: Trigger,
        action: Action,
    ) -> Self {
        Self {
            name: to_name(name),
            behavior: behavior.into(),
            phase,
            trigger,
            action,
            priority: 0,
            parameters: ParameterSet::new(),
        }
    }

    /// Applies a single update set when `trigger` fires.
    pub fn update(
        name: impl Into<String>,
        behavior: impl Into<String>,
        phase: Phase,
        trigger: Trigger,
        updates: Vec<ParameterUpdate>,
    ) -> Self {
        Self::new(
            name,
            behavior,
            phase,
            trigger,
            Action::UpdateParameters {
                choices: vec![updates],
                weights: None,
            },
        )
    }

    /// Applies one of `choices` when `trigger` fires, drawn with `weights`
    /// (uniform when `None`). An empty update set is a valid no-op branch.
    pub fn update_choices(
        name: impl Into<String>,
        behavior: impl Into<String>,
        phase: Phase,
        trigger: Trigger,
        choices: Vec<Vec<ParameterUpdate>>,
        weights: Option<Vec<f64>>,
    ) -> SimResult<Self> {
        let name = name.into();
        if choices.is_empty() {
            return Err(SimError::config(format!(
                "Control '{}' has no update choices",
                name
            )));
        }
        let weights = match weights {
            Some(w) if w.len() != choices.len() => {
                return Err(SimError::config(format!(
                    "Control '{}' has {} choices but {} weights",
                    name,
                    choices.len(),
                    w.len()
                )))
            }
            Some(w) => Some(
                WeightedIndex::new(&w)
                    .map_err(|e| SimError::config(format!("Control '{}' weights: {}", name, e)))?,
            ),
            None if choices.len() > 1 => Some(
                WeightedIndex::new(vec![1.0; choices.len()])
                    .map_err(|e| SimError::config(format!("Control '{}': {}", name, e)))?,
            ),
            None => None,
        };
        Ok(Self::new(
            name,
            behavior,
            phase,
            trigger,
            Action::UpdateParameters { choices, weights },
        ))
    }

    /// Resets `counter` of `component` when `trigger` fires.
    pub fn reset_counter(
        name: impl Into<String>,
        behavior: impl Into<String>,
        phase: Phase,
        trigger: Trigger,
        component: impl Into<String>,
        counter: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            behavior,
            phase,
            trigger,
            Action::ResetCounter {
                component: component.into(),
                counter: counter.into(),
            },
        )
    }

    /// Increments `counter` of `component` by `increment` when `trigger` fires.
    pub fn increment_counter(
        name: impl Into<String>,
        behavior: impl Into<String>,
        phase: Phase,
        trigger: Trigger,
        component: impl Into<String>,
        counter: impl Into<String>,
        increment: i64,
    ) -> Self {
        let mut control = Self::new(
            name,
            behavior,
            phase,
            trigger,
            Action::IncrementCounter {
                component: component.into(),
                counter: counter.into(),
            },
        );
        control
            .parameters
            .declare("increment", Some(Value::Int(increment)));
        control
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn behavior(&self) -> &str {
        &self.behavior
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    /// Resolves parameters, evaluates the trigger and runs the action if it fired.
    ///
    /// Returns whether the action ran.
    pub fn apply(&self, ctx: &mut ContextStore) -> SimResult<bool> {
        let params = self
            .parameters
            .resolve("Control", self.name.as_deref(), Some(&*ctx))?;

        if self.trigger.evaluate(ctx)? != Some(true) {
            return Ok(false);
        }

        trace!(
            control = self.name.as_deref().unwrap_or("<anonymous>"),
            behavior = %self.behavior,
            "control fired"
        );

        match &self.action {
            Action::UpdateParameters { choices, weights } => {
                let index = match weights {
                    Some(dist) => dist.sample(ctx.rng()),
                    None => 0,
                };
                // Resolve every deferred value before writing any of them
                let mut resolved = Vec::with_capacity(choices[index].len());
                for update in &choices[index] {
                    let value = match &update.value {
                        UpdateValue::Literal(v) => v.clone(),
                        UpdateValue::Deferred(r) => r.retrieve(ctx)?,
                    };
                    resolved.push((update, value));
                }
                for (update, value) in resolved {
                    ctx.set_parameter(&update.component, &update.parameter, value)?;
                }
            }
            Action::ResetCounter { component, counter } => {
                ctx.reset_counter(component, counter)?;
            }
            Action::IncrementCounter { component, counter } => {
                ctx.increment_counter(component, counter, params.i64("increment")?)?;
            }
        }
        Ok(true)
    }
}

impl Named for Control {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn namespace(&self) -> Vec<String> {
        let mut names: Vec<String> = self.name.iter().cloned().collect();
        names.extend(self.trigger.namespace());
        names
    }
}
