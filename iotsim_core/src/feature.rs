//! Features - behavior state machines.
//!
//! A feature owns a set of named behaviors and the controls bound to each.
//! The active behavior is selected by the feature's `running_behavior`
//! parameter; behaviors never switch themselves. A switch happens when a
//! control writes a different behavior name into that parameter.
//!
//! Per produced value the runner:
//! 1. On a switch (or the very first pull) fires the new behavior's
//!    `OnActivation` controls, then activates the behavior.
//! 2. Pulls the next value from the active behavior.
//! 3. Records it in the feature's history.
//! 4. Fires the active behavior's `OnYield` controls.
//! 5. Emits the value.

use crate::behavior::{Behavior, BehaviorStream, Flatline};
use crate::context::ContextStore;
use crate::control::{Control, ParameterUpdate, Phase};
use crate::error::{SimError, SimResult};
use crate::naming::{build_namespace, require_name, Named};
use crate::params::ParameterSet;
use crate::trigger::Trigger;
use crate::value::Value;
use std::fmt;
use tracing::debug;

/// Parameter holding the name of the active behavior.
pub const RUNNING_BEHAVIOR: &str = "running_behavior";

/// A named behavior state machine.
pub struct Feature {
    name: String,
    behaviors: Vec<Box<dyn Behavior>>,
    behavior_names: Vec<String>,

    /// Controls per behavior (same order as `behaviors`), sorted by priority
    controls: Vec<Vec<Control>>,

    start_with: String,
    parameters: ParameterSet,
    namespace: Vec<String>,
}

impl fmt::Debug for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feature")
            .field("name", &self.name)
            .field("behaviors", &self.behavior_names)
            .field("start_with", &self.start_with)
            .finish_non_exhaustive()
    }
}

impl Feature {
    /// Creates a feature that starts with its first behavior.
    pub fn new(
        name: impl Into<String>,
        behaviors: Vec<Box<dyn Behavior>>,
        controls: Vec<Control>,
    ) -> SimResult<Self> {
        let name = require_name(name, "Feature")?;
        if behaviors.is_empty() {
            return Err(SimError::config(format!("Feature '{}' has no behaviors", name)));
        }

        let behavior_names = behaviors
            .iter()
            .map(|b| {
                b.name()
                    .map(str::to_string)
                    .ok_or_else(|| SimError::config(format!("Unnamed behavior in feature '{}'", name)))
            })
            .collect::<SimResult<Vec<_>>>()?;

        let mut parts: Vec<Vec<String>> = behaviors.iter().map(|b| b.namespace()).collect();
        parts.extend(controls.iter().map(|c| c.namespace()));
        let namespace = build_namespace("Feature", &name, parts, true)?;

        let mut bound: Vec<Vec<Control>> = behavior_names.iter().map(|_| Vec::new()).collect();
        for control in controls {
            let index = behavior_names
                .iter()
                .position(|b| b == control.behavior())
                .ok_or_else(|| {
                    SimError::config(format!(
                        "Behavior '{}' of control '{}' is not in feature '{}'",
                        control.behavior(),
                        control.name().unwrap_or("<anonymous>"),
                        name
                    ))
                })?;
            bound[index].push(control);
        }
        // Stable: equal priorities keep declaration order
        for list in &mut bound {
            list.sort_by_key(|c| c.priority());
        }

        let start_with = behavior_names[0].clone();
        Ok(Self {
            parameters: ParameterSet::new()
                .with(RUNNING_BEHAVIOR, Some(Value::from(start_with.as_str()))),
            name,
            behaviors,
            behavior_names,
            controls: bound,
            start_with,
            namespace,
        })
    }

    /// Selects the initial behavior.
    pub fn start_with(mut self, behavior: &str) -> SimResult<Self> {
        if !self.behavior_names.iter().any(|b| b == behavior) {
            return Err(SimError::config(format!(
                "`start_with` behavior '{}' is not in feature '{}' behaviors: {:?}",
                behavior, self.name, self.behavior_names
            )));
        }
        self.start_with = behavior.to_string();
        self.parameters
            .declare(RUNNING_BEHAVIOR, Some(Value::from(behavior)));
        Ok(self)
    }

    pub fn initial_behavior(&self) -> &str {
        &self.start_with
    }

    pub fn behavior_names(&self) -> &[String] {
        &self.behavior_names
    }

    fn behavior_index(&self, name: &str) -> SimResult<usize> {
        self.behavior_names.iter().position(|b| b == name).ok_or_else(|| {
            SimError::config(format!(
                "Feature '{}' has no behavior '{}'",
                self.name, name
            ))
        })
    }

    fn fire(&self, index: usize, phase: Phase, ctx: &mut ContextStore) -> SimResult<()> {
        for control in self.controls[index].iter().filter(|c| c.phase() == phase) {
            control.apply(ctx)?;
        }
        Ok(())
    }

    /// Starts the state machine; the initial behavior is published in the store.
    pub fn activate(&self, ctx: &mut ContextStore) -> SimResult<FeatureRunner<'_>> {
        ctx.set_parameter(&self.name, RUNNING_BEHAVIOR, self.start_with.as_str())?;
        Ok(FeatureRunner {
            feature: self,
            running: self.start_with.clone(),
            current: None,
        })
    }
}

impl Named for Feature {
    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn namespace(&self) -> Vec<String> {
        self.namespace.clone()
    }
}

struct ActiveBehavior {
    index: usize,
    stream: Box<dyn BehaviorStream>,
}

/// A running feature: the currently active behavior and its value stream.
pub struct FeatureRunner<'a> {
    feature: &'a Feature,
    running: String,
    current: Option<ActiveBehavior>,
}

impl<'a> FeatureRunner<'a> {
    /// Re-resolves `running_behavior`; takes effect on the next pull.
    pub fn update_parameters(&mut self, ctx: &ContextStore) -> SimResult<()> {
        let params = self
            .feature
            .parameters
            .resolve("Feature", Some(&self.feature.name), Some(ctx))?;
        self.running = params.text(RUNNING_BEHAVIOR)?.to_string();
        Ok(())
    }

    /// Name of the behavior producing values, if one has been activated.
    pub fn active_behavior(&self) -> Option<&str> {
        self.current
            .as_ref()
            .map(|a| self.feature.behavior_names[a.index].as_str())
    }

    fn switch_to_running(&mut self, ctx: &mut ContextStore) -> SimResult<()> {
        let index = self.feature.behavior_index(&self.running)?;
        debug!(
            feature = %self.feature.name,
            from = self.active_behavior().unwrap_or("-"),
            to = %self.running,
            "behavior switch"
        );
        self.feature.fire(index, Phase::OnActivation, ctx)?;
        let stream = self.feature.behaviors[index].activate(Some(&*ctx))?;
        self.current = Some(ActiveBehavior { index, stream });
        Ok(())
    }

    /// Produces the next true value of the feature.
    pub fn next_value(&mut self, ctx: &mut ContextStore) -> SimResult<Value> {
        if self.active_behavior() != Some(self.running.as_str()) {
            self.switch_to_running(ctx)?;
        }
        let active = self.current.as_mut().ok_or_else(|| {
            SimError::config(format!("Feature '{}' has no active behavior", self.feature.name))
        })?;

        let value = active.stream.next_value()?;
        let index = active.index;
        ctx.record(&self.feature.name, value.clone())?;
        self.feature.fire(index, Phase::OnYield, ctx)?;
        Ok(value)
    }
}

/// Two-state feature: `level1` for `duration1` values, then `level2` for
/// `duration2` values, repeating.
pub fn pulser(
    name: impl Into<String>,
    level1: impl Into<Value>,
    duration1: i64,
    level2: impl Into<Value>,
    duration2: i64,
) -> SimResult<Feature> {
    let name = require_name(name, "Feature")?;
    for (key, duration) in [("duration1", duration1), ("duration2", duration2)] {
        if duration < 1 {
            return Err(SimError::invalid(&name, key, format!("must be positive, got {}", duration)));
        }
    }

    let b1 = format!("{}.b.1", name);
    let b2 = format!("{}.b.2", name);
    let c1 = format!("{}.duration", b1);
    let c2 = format!("{}.duration", b2);

    let behaviors: Vec<Box<dyn Behavior>> = vec![
        Box::new(Flatline::new(b1.as_str(), Some(level1.into()))?),
        Box::new(Flatline::new(b2.as_str(), Some(level2.into()))?),
    ];

    let mut controls = Vec::with_capacity(6);
    for (this, other, counter, duration) in [(&b1, &b2, &c1, duration1), (&b2, &b1, &c2, duration2)] {
        controls.push(Control::reset_counter(
            "",
            this.as_str(),
            Phase::OnActivation,
            Trigger::always(),
            name.as_str(),
            counter.as_str(),
        ));
        controls.push(Control::increment_counter(
            "",
            this.as_str(),
            Phase::OnYield,
            Trigger::always(),
            name.as_str(),
            counter.as_str(),
            1,
        ));
        controls.push(
            Control::update(
                "",
                this.as_str(),
                Phase::OnYield,
                Trigger::counter_threshold("", name.as_str(), counter.as_str(), duration),
                vec![ParameterUpdate::new(name.as_str(), RUNNING_BEHAVIOR, other.as_str())],
            )
            .with_priority(1),
        );
    }

    Feature::new(name, behaviors, controls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::Linear;
    use crate::control::Retrieval;

    fn run(feature: &Feature, ctx: &mut ContextStore, n: usize) -> Vec<Value> {
        let mut runner = feature.activate(ctx).unwrap();
        (0..n)
            .map(|_| {
                runner.update_parameters(ctx).unwrap();
                runner.next_value(ctx).unwrap()
            })
            .collect()
    }

    fn store_for(feature: &Feature) -> ContextStore {
        ContextStore::with_seed(feature.namespace(), 2, 1).unwrap()
    }

    #[test]
    fn test_single_flatline_feature() {
        let feature = Feature::new(
            "f",
            vec![Box::new(Flatline::new("b", Some(Value::Int(5))).unwrap())],
            vec![],
        )
        .unwrap();
        let mut ctx = store_for(&feature);
        assert_eq!(run(&feature, &mut ctx, 4), vec![Value::Int(5); 4]);
        assert_eq!(ctx.query("f", 0).unwrap(), Some(&Value::Int(5)));
        assert_eq!(
            ctx.get_parameter("f", RUNNING_BEHAVIOR).unwrap(),
            Some(&Value::from("b"))
        );
    }

    #[test]
    fn test_pulser_period() {
        let feature = pulser("f", 0, 3, 2, 2).unwrap();
        let mut ctx = store_for(&feature);
        let trace: Vec<i64> = run(&feature, &mut ctx, 10)
            .iter()
            .map(|v| v.as_i64().unwrap())
            .collect();
        assert_eq!(trace, vec![0, 0, 0, 2, 2, 0, 0, 0, 2, 2]);
    }

    #[test]
    fn test_pulser_rejects_zero_duration() {
        assert!(pulser("f", 0, 0, 1, 1).is_err());
    }

    fn seesaw() -> Feature {
        let forward = Linear::new("b.forward", Some(Value::Int(0)), Some(Value::Int(1))).unwrap();
        let back = Linear::new("b.return", Some(Value::Int(4)), Some(Value::Int(-2))).unwrap();
        Feature::new(
            "f",
            vec![Box::new(forward), Box::new(back)],
            vec![
                Control::update(
                    "c.to_return",
                    "b.forward",
                    Phase::OnYield,
                    Trigger::history_out_of_range("t.to_return", "f", 0, 0, 3),
                    vec![ParameterUpdate::new("f", RUNNING_BEHAVIOR, "b.return")],
                ),
                Control::update(
                    "c.to_forward",
                    "b.return",
                    Phase::OnYield,
                    Trigger::history_out_of_range("t.to_forward", "f", 0, 4, 0),
                    vec![ParameterUpdate::new("f", RUNNING_BEHAVIOR, "b.forward")],
                ),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_seesaw_restarts_linear_on_reactivation() {
        let feature = seesaw();
        let mut ctx = store_for(&feature);
        let trace: Vec<i64> = run(&feature, &mut ctx, 10)
            .iter()
            .map(|v| v.as_i64().unwrap())
            .collect();
        // forward 1,2,3,4 (4 is out of [0,3]) then return 2,0,-2 (out of [0,4]) then forward again
        assert_eq!(trace, vec![1, 2, 3, 4, 2, 0, -2, 1, 2, 3]);
    }

    #[test]
    fn test_priority_order_and_ties() {
        // All three controls fire on every yield and write the same parameter:
        // the last one applied wins.
        let bhv = Flatline::new("b", Some(Value::Int(0))).unwrap();
        let write = |label: &str| vec![ParameterUpdate::new("f", "last", label)];
        let feature = Feature::new(
            "f",
            vec![Box::new(bhv)],
            vec![
                Control::update("", "b", Phase::OnYield, Trigger::always(), write("late")).with_priority(5),
                Control::update("", "b", Phase::OnYield, Trigger::always(), write("tie-1")),
                Control::update("", "b", Phase::OnYield, Trigger::always(), write("tie-2")),
            ],
        )
        .unwrap();
        let mut ctx = store_for(&feature);
        run(&feature, &mut ctx, 1);
        assert_eq!(ctx.get_parameter("f", "last").unwrap(), Some(&Value::from("late")));

        let feature = Feature::new(
            "f",
            vec![Box::new(Flatline::new("b", Some(Value::Int(0))).unwrap())],
            vec![
                Control::update("", "b", Phase::OnYield, Trigger::always(), write("tie-1")),
                Control::update("", "b", Phase::OnYield, Trigger::always(), write("tie-2")),
            ],
        )
        .unwrap();
        let mut ctx = store_for(&feature);
        run(&feature, &mut ctx, 1);
        assert_eq!(ctx.get_parameter("f", "last").unwrap(), Some(&Value::from("tie-2")));
    }

    #[test]
    fn test_activation_control_runs_before_first_value() {
        // Rebinding bias on activation from the feature's own history keeps continuity
        let up = Linear::new("b.up", Some(Value::Int(0)), Some(Value::Int(1))).unwrap();
        let up_again = Linear::new("b.up2", None, Some(Value::Int(10))).unwrap();
        let feature = Feature::new(
            "f",
            vec![Box::new(up), Box::new(up_again)],
            vec![
                Control::update(
                    "",
                    "b.up",
                    Phase::OnYield,
                    Trigger::history_in_range("", "f", 0, 2, 2),
                    vec![ParameterUpdate::new("f", RUNNING_BEHAVIOR, "b.up2")],
                ),
                Control::update(
                    "",
                    "b.up2",
                    Phase::OnActivation,
                    Trigger::always(),
                    vec![ParameterUpdate::new("b.up2", "bias", Retrieval::history("f", 0))],
                ),
            ],
        )
        .unwrap();
        let mut ctx = store_for(&feature);
        let trace: Vec<i64> = run(&feature, &mut ctx, 4)
            .iter()
            .map(|v| v.as_i64().unwrap())
            .collect();
        assert_eq!(trace, vec![1, 2, 12, 22]);
    }

    #[test]
    fn test_start_with() {
        let feature = seesaw().start_with("b.return").unwrap();
        let mut ctx = store_for(&feature);
        assert_eq!(run(&feature, &mut ctx, 1), vec![Value::Int(2)]);
        assert!(seesaw().start_with("b.nope").is_err());
    }

    #[test]
    fn test_unbound_control_rejected() {
        let err = Feature::new(
            "f",
            vec![Box::new(Flatline::new("b", Some(Value::Int(0))).unwrap())],
            vec![Control::reset_counter("", "zzz", Phase::OnYield, Trigger::always(), "f", "n")],
        )
        .unwrap_err();
        assert!(matches!(err, SimError::Config(_)));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = Feature::new(
            "f",
            vec![
                Box::new(Flatline::new("b", Some(Value::Int(0))).unwrap()),
                Box::new(Flatline::new("b", Some(Value::Int(1))).unwrap()),
            ],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, SimError::DuplicateName { .. }));

        let err = Feature::new(
            "f",
            vec![Box::new(Flatline::new("f", Some(Value::Int(0))).unwrap())],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, SimError::DuplicateName { .. }));
    }

    #[test]
    fn test_switch_to_unknown_behavior_fails() {
        let feature = Feature::new(
            "f",
            vec![Box::new(Flatline::new("b", Some(Value::Int(0))).unwrap())],
            vec![Control::update(
                "",
                "b",
                Phase::OnYield,
                Trigger::always(),
                vec![ParameterUpdate::new("f", RUNNING_BEHAVIOR, "ghost")],
            )],
        )
        .unwrap();
        let mut ctx = store_for(&feature);
        let mut runner = feature.activate(&mut ctx).unwrap();
        runner.update_parameters(&ctx).unwrap();
        runner.next_value(&mut ctx).unwrap();
        runner.update_parameters(&ctx).unwrap();
        assert!(runner.next_value(&mut ctx).is_err());
    }
}
